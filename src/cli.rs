use anyhow::{anyhow, bail, ensure, Context as _, Result};
use chrono::NaiveDate;
use console::{pad_str, style, Alignment, StyledObject};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args::{Args, Command, GroupBy};
use crate::config::{self, Config};
use crate::db::{self, WasteDatabase};
use crate::export;
use crate::merge::{self, MergeStats};
use crate::sources::scale::ScaleClient;
use crate::sources::station::{self, CsvStationLedger};
use crate::stats::categories::{self, CategoryCounts};
use crate::stats::counters;
use crate::stats::series::{self, Grouping};
use crate::terminal::BulletPointPrinter;
use crate::translator::IdTranslator;

const COUNTER_PAD: usize = 20;

pub async fn main(args: Args) -> Result<()> {
    if let Command::Init = args.command {
        return main_init(&args.config);
    }
    let cli = Cli::new(&args.config)?;
    match args.command {
        Command::Init => unreachable!(),
        Command::Merge { from, to } => cli.main_merge(from, to).await,
        Command::Report { from, to } => cli.main_report(from, to).await,
        Command::Categories { from, to } => cli.main_categories(from, to).await,
        Command::Series {
            from,
            to,
            group_by,
            year_groups,
            cumulative,
        } => cli.main_series(from, to, group_by, year_groups, cumulative).await,
        Command::Rewrite { file } => cli.main_rewrite(&file),
        Command::Export { from, to, out } => cli.main_export(from, to, &out).await,
    }
}

fn main_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("Config file {} already exists", config_path.display());
    }
    config::prompt_create_config(config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

pub struct Cli {
    config: Config,
}

impl Cli {
    fn new(config_path: &Path) -> Result<Self> {
        let config = Config::load(config_path)?;
        Ok(Self { config })
    }

    fn translator(&self) -> IdTranslator {
        match IdTranslator::load_or_build(&self.config.roster_path, &self.config.roster_cache_path)
        {
            Ok(translator) => translator,
            Err(err) => {
                log::error!("Failed to load the id roster, every lookup will miss: {err:#}");
                IdTranslator::empty()
            }
        }
    }

    async fn load_database(&self) -> Result<WasteDatabase> {
        db::load(&self.config.database_path)
            .await
            .context("Failed to load database")?
            .ok_or_else(|| anyhow!("Database file not found, run `fwat merge` first"))
    }

    async fn main_merge(&self, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let translator = self.translator();
        let ledger = CsvStationLedger::new(
            self.config.data_dir.clone(),
            self.config.station_file_prefix.clone(),
        );
        let scale = ScaleClient::new(self.config.scale_service_url.clone())?;

        let spinner = ProgressBar::new_spinner().with_message("Fetching weight records...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        let weights = scale.fetch_batch(from, to).await;
        spinner.finish_and_clear();

        let (database, stats) = merge::merge_range(&translator, &ledger, &weights, from, to)?;
        db::save(&database, &self.config.database_path)
            .await
            .context("Failed to save database")?;

        println!("{}", style_header("Merge summary:"));
        print_merge_stats(&stats, weights.skipped_records());
        Ok(())
    }

    async fn main_report(&self, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let database = self.load_database().await?;
        let report = counters::counter_report(&database, from, to);
        if report.tally.is_empty() {
            println!("{}", style("(no member-day with both visits and weighings in range)").italic());
            return Ok(());
        }

        print_grams_ranking("Average wastage per visit:", &report.average_wastage);
        println!();
        print_grams_ranking("Total wastage:", &report.total_wastage);
        println!();
        print_tally_ranking("Visits with weighed waste:", &report.tally);
        Ok(())
    }

    async fn main_categories(&self, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let database = self.load_database().await?;
        let counts = categories::categorize(&database, from, to);

        println!("{}", style_header("Record shapes:"));
        print_category_counts(&counts);
        println!();
        println!("{}", style_header("Days with complete records:"));
        let printer = BulletPointPrinter::new_stdout();
        if counts.both_per_day.is_empty() {
            printer.print_item(style("(none)").italic());
        }
        for (day, count) in &counts.both_per_day {
            printer.print_item(format!("{}: {count}", style_date(day)));
        }
        Ok(())
    }

    async fn main_series(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        group_by: GroupBy,
        year_groups: Vec<String>,
        cumulative: bool,
    ) -> Result<()> {
        let grouping = match group_by {
            GroupBy::House => Grouping::House,
            GroupBy::YearGroup => Grouping::YearGroup,
            GroupBy::FormClass => {
                ensure!(
                    !year_groups.is_empty(),
                    "a form-class series needs --year-groups to disambiguate class names"
                );
                Grouping::FormClass { year_groups }
            }
            GroupBy::Role => Grouping::Role,
        };

        let database = self.load_database().await?;
        let series = series::category_series(&database, &grouping, from, to);
        let table = if cumulative {
            series.cumulative_totals(from, to)
        } else {
            series.daily_average_per_member()
        };

        if table.is_empty() {
            println!("{}", style("(no weighings for this grouping in range)").italic());
            return Ok(());
        }
        print_series(&table);
        Ok(())
    }

    fn main_rewrite(&self, file: &Path) -> Result<()> {
        let translator = self.translator();
        let output = rewritten_path(file);
        let outcome = station::rewrite_export(file, &output, &translator)?;
        println!(
            "Wrote {} ({} of {} ids had no match)",
            output.display(),
            outcome.no_match,
            outcome.total
        );
        Ok(())
    }

    async fn main_export(&self, from: NaiveDate, to: NaiveDate, out: &Path) -> Result<()> {
        let database = self.load_database().await?;
        export::write_chart_data(&database, from, to, out).await?;
        println!("Wrote {}", out.display());
        Ok(())
    }
}

fn rewritten_path(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("export");
    file.with_file_name(format!("{stem}_rewritten.csv"))
}

fn print_merge_stats(stats: &MergeStats, skipped_weight_records: u64) {
    let printer = BulletPointPrinter::new_stdout();
    printer.print_item(format!(
        "days with data: {} station, {} weight",
        stats.days_with_station_data, stats.days_with_weight_data
    ));
    printer.print_item(format!("station visits merged: {}", stats.station_visits_merged));
    {
        let printer = printer.indent();
        printer.print_item(format!("without roster entry: {}", stats.station_unmatched));
        printer.print_item(format!("\"No Match\" rows: {}", stats.station_sentinel));
    }
    printer.print_item(format!(
        "weight measurements merged: {}",
        stats.weight_measurements_merged
    ));
    {
        let printer = printer.indent();
        printer.print_item(format!("members without roster entry: {}", stats.weight_unmatched));
        printer.print_item(format!("unparseable records: {skipped_weight_records}"));
    }
    printer.print_item(format!(
        "members: {} ({} with attributes)",
        stats.members, stats.members_with_attributes
    ));
}

fn print_category_counts(counts: &CategoryCounts) {
    let printer = BulletPointPrinter::new_stdout();
    printer.print_item(format!("weights, no counters: {}", counts.weights_no_counters));
    printer.print_item(format!("counters, no weights: {}", counts.counters_no_weights));
    printer.print_item(format!("both: {}", counts.both));
    printer.print_item(format!(
        "multiple weights, no counters: {}",
        counts.multiple_weights_no_counters
    ));
    printer.print_item(format!(
        "multiple counters, no weights: {}",
        counts.multiple_counters_no_weights
    ));
    printer.print_item(format!("multiple of both: {}", counts.multiple_both));
}

fn print_grams_ranking(title: &str, values: &HashMap<String, f64>) {
    println!("{}", style_header(title));
    let mut ranked: Vec<(&String, f64)> = values.iter().map(|(c, v)| (c, *v)).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (counter, grams) in ranked {
        println!(
            "{} {}",
            pad_str(&style_counter(counter).to_string(), COUNTER_PAD, Alignment::Left, None),
            style_grams(grams),
        );
    }
}

fn print_tally_ranking(title: &str, values: &HashMap<String, u64>) {
    println!("{}", style_header(title));
    let mut ranked: Vec<(&String, u64)> = values.iter().map(|(c, v)| (c, *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    for (counter, count) in ranked {
        println!(
            "{} {}",
            pad_str(&style_counter(counter).to_string(), COUNTER_PAD, Alignment::Left, None),
            style(count).bold(),
        );
    }
}

fn print_series(table: &BTreeMap<String, BTreeMap<NaiveDate, f64>>) {
    let printer = BulletPointPrinter::new_stdout();
    for (category, days) in table {
        printer.print_item(style_counter(category));
        let printer = printer.indent();
        for (day, grams) in days {
            printer.print_item(format!("{} {}", style_date(day), style_grams(*grams)));
        }
    }
}

fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

fn style_counter(counter: &str) -> StyledObject<&str> {
    style(counter).cyan()
}

fn style_date(date: &NaiveDate) -> StyledObject<String> {
    style(date.format("%Y-%m-%d").to_string())
}

fn style_grams(grams: f64) -> StyledObject<String> {
    style(format!("{grams:.1} g")).bold()
}
