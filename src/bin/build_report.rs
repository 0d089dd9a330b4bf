use std::path::PathBuf;

use clap::Parser;
use log::info;
use luogu_scraping::{config::Config, report::build, reporter::LogReporter, uid_map::load_uid_map};

#[derive(Parser)]
struct Opts {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of `<uid>.json` record sets; overrides the config.
    #[arg(long)]
    json_dir: Option<PathBuf>,
    /// Spreadsheet to write; overrides the config.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let config = Config::load_or_default(opts.config)?;
    let json_dir = opts.json_dir.unwrap_or(config.json_dir);
    let output = opts.output.unwrap_or(config.output_file);

    let lookup = load_uid_map(&config.uids_file, &LogReporter);
    info!("Saving to {output:?}...");
    let report = build(&json_dir, &lookup, &output, &LogReporter)?;
    info!(
        "Done: {} detail rows, {} users in the summary.",
        report.details.len(),
        report.summary.len()
    );
    Ok(())
}
