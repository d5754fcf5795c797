use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Merge station visits with weighing-scale records and report wastage
/// statistics.
#[derive(Parser, Debug)]
pub struct Args {
    /// Path to the configuration file
    #[clap(long, default_value = "fwat.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a configuration file in the local directory
    Init,

    /// Fetch both sources for a date range and rebuild the merged database
    Merge {
        /// First day of the range (YYYY-MM-DD)
        #[clap(long)]
        from: NaiveDate,
        /// Last day of the range, inclusive (YYYY-MM-DD)
        #[clap(long)]
        to: NaiveDate,
    },

    /// Print per-counter wastage rankings
    Report {
        #[clap(long)]
        from: NaiveDate,
        #[clap(long)]
        to: NaiveDate,
    },

    /// Print how member-days split into record shapes
    Categories {
        #[clap(long)]
        from: NaiveDate,
        #[clap(long)]
        to: NaiveDate,
    },

    /// Print a per-category wastage time series
    Series {
        #[clap(long)]
        from: NaiveDate,
        #[clap(long)]
        to: NaiveDate,
        /// Member attribute to group by
        #[clap(long, value_enum, default_value = "house")]
        group_by: GroupBy,
        /// Year groups a form-class series is restricted to
        #[clap(long, value_delimiter = ',')]
        year_groups: Vec<String>,
        /// Print running totals instead of per-member daily averages
        #[clap(long)]
        cumulative: bool,
    },

    /// Rewrite a station export whose id column carries scale ids
    Rewrite {
        /// CSV file to rewrite
        file: PathBuf,
    },

    /// Write the chart-layer JSON for a date range
    Export {
        #[clap(long)]
        from: NaiveDate,
        #[clap(long)]
        to: NaiveDate,
        /// Output file
        #[clap(long, default_value = "chart_data.json")]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    House,
    YearGroup,
    FormClass,
    Role,
}

pub fn parse() -> Args {
    Args::parse()
}
