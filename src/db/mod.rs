mod file;
mod store;

pub use file::{load, save};
pub use store::{DailyRecord, MemberAttributes, MemberRecord, WasteDatabase};
