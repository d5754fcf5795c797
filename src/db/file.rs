use anyhow::{anyhow, Context as _, Result};
use std::path::Path;

use super::store::WasteDatabase;

/// Returns Ok(None) if the database file doesn't exist yet
pub async fn load(path: &Path) -> Result<Option<WasteDatabase>> {
    log::info!("Loading database...");
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }

    let content = tokio::fs::read(path).await?;
    let database =
        serde_json::from_slice(&content).context("Failed to parse database file")?;

    log::info!("Loading database...done");

    Ok(Some(database))
}

pub async fn save(db: &WasteDatabase, path: &Path) -> Result<()> {
    log::info!("Saving database...");

    let content = serde_json::to_vec_pretty(db)?;

    // First write to temporary file so we don't lose data if writing fails halfway
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow!("Path has no filename"))?
        .to_str()
        .ok_or_else(|| anyhow!("Filename isn't valid utf-8"))?;
    let tmppath = path.with_file_name(format!("{}.temp", filename));
    tokio::fs::write(&tmppath, content).await?;

    // Ok, writing succeeded, let's now replace the real file with the tmpfile
    tokio::fs::rename(&tmppath, path).await?;

    log::info!("Saving database...done");

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::store::DailyRecord;
    use crate::translator::CardId;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn some_db_1() -> WasteDatabase {
        let mut db = WasteDatabase::new();
        let member = db.member_mut(&CardId::new("001"));
        member.name = Some("Alex Doe".to_string());
        member.house = Some("Fire".to_string());
        *member.day_mut(day("2024-05-13")) = DailyRecord {
            stations: vec!["A".to_string()],
            weights: vec![50.0, 30.0],
        };
        db.member_mut(&CardId::new("002"))
            .day_mut(day("2024-05-14"))
            .weights
            .push(100.0);
        db
    }

    fn some_db_2() -> WasteDatabase {
        let mut db = WasteDatabase::new();
        db.member_mut(&CardId::new("100"))
            .day_mut(day("2024-06-01"))
            .stations
            .push("B".to_string());
        db
    }

    #[tokio::test]
    async fn load_nonexisting() {
        let tempdir = tempfile::tempdir().unwrap();
        let tempfile = tempdir.path().join("database");

        let loaded = load(&tempfile).await.unwrap();
        assert_eq!(None, loaded);
    }

    #[tokio::test]
    async fn save_new_file_and_load() {
        let tempdir = tempfile::tempdir().unwrap();
        let tempfile = tempdir.path().join("database");

        let db = some_db_1();

        save(&db, &tempfile).await.unwrap();
        let loaded = load(&tempfile).await.unwrap();
        assert_eq!(Some(db), loaded);
    }

    #[tokio::test]
    async fn overwrite_existing_file_and_load() {
        let tempdir = tempfile::tempdir().unwrap();
        let tempfile = tempdir.path().join("database");

        let db1 = some_db_1();
        let db2 = some_db_2();

        save(&db1, &tempfile).await.unwrap();
        save(&db2, &tempfile).await.unwrap();
        let loaded = load(&tempfile).await.unwrap().unwrap();
        assert_ne!(db1, loaded);
        assert_eq!(db2, loaded);
    }
}
