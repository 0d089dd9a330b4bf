use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use inquire::{Password, PasswordDisplayMode, Text};
use log::{error, info, warn};
use luogu_scraping::{
    api::LuoguClient,
    chrono_util::parse_date,
    config::{Config, MIN_DATE_ENV},
    cookie_store::Credentials,
    data_collector::{fetch_records, FetchOptions},
    reporter::LogReporter,
    schema::UserId,
    uid_map::load_uid_map,
};
use luogu_scraping_utils::fs_json_util::write_json_pretty;

#[derive(Parser)]
struct Opts {
    /// Users to fetch.  Defaults to every uid of the uid map.
    user_ids: Vec<UserId>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON file with `client_id` and `uid` cookies.
    #[arg(long)]
    credentials_path: Option<PathBuf>,
    /// Only keep submissions made on or after this date (YYYY-MM-DD).
    #[arg(long)]
    min_date: Option<NaiveDate>,
    /// Never ask interactively; missing inputs are left empty.
    #[arg(long)]
    no_prompt: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let config = Config::load_or_default(opts.config.clone())?;

    let users = if opts.user_ids.is_empty() {
        load_uid_map(&config.uids_file, &LogReporter)
            .into_keys()
            .collect::<Vec<_>>()
    } else {
        opts.user_ids.clone()
    };
    if users.is_empty() {
        info!("No users to scrape. Exiting.");
        return Ok(());
    }

    let credentials = resolve_credentials(&opts)?;
    let options = FetchOptions::builder()
        .min_date(resolve_min_date(&opts)?)
        .utc_offset(config.utc_offset()?)
        .page_delay(config.request_delay)
        .build();
    let client = LuoguClient::new(&config, credentials)?;
    if !client.is_authenticated() {
        warn!("No cookies were provided; only public records are visible.");
    }

    for user in &users {
        let report = fetch_records(&client, user, &options, &LogReporter).await;
        info!(
            "Total AC records collected for {user}: {} ({:?})",
            report.records.len(),
            report.stop
        );
        if report.records.is_empty() {
            continue;
        }
        let path = config.json_dir.join(format!("{user}.json"));
        match write_json_pretty(&path, &report.records) {
            Ok(()) => info!("Saved to {path:?}"),
            Err(e) => error!("Failed to save records of {user}: {e:#}"),
        }
    }
    info!("Scraping completed.");
    Ok(())
}

fn resolve_credentials(opts: &Opts) -> anyhow::Result<Option<Credentials>> {
    if let Some(credentials) = Credentials::from_env() {
        info!("Using cookies from the environment.");
        return Ok(Some(credentials));
    }
    if let Some(path) = &opts.credentials_path {
        let credentials = Credentials::load(path)
            .with_context(|| format!("While loading credentials from {path:?}"))?;
        info!("Using cookies from {path:?}.");
        return Ok(Some(credentials));
    }
    if opts.no_prompt {
        return Ok(None);
    }

    println!("Please enter your Luogu cookies (current session only).");
    println!("You can find them in your browser developer tools (F12) -> Application -> Cookies.");
    let client_id = Password::new("__client_id:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?;
    let uid = Text::new("_uid:").prompt()?;
    Ok(Credentials::from_parts(&client_id, &uid))
}

fn resolve_min_date(opts: &Opts) -> anyhow::Result<Option<NaiveDate>> {
    if opts.min_date.is_some() {
        return Ok(opts.min_date);
    }
    let text = match std::env::var(MIN_DATE_ENV) {
        Ok(text) => text,
        Err(_) if opts.no_prompt => return Ok(None),
        Err(_) => Text::new("Earliest date (YYYY-MM-DD), or press Enter for all:").prompt()?,
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    match parse_date(&text) {
        Ok(date) => Ok(Some(date)),
        Err(e) => {
            warn!("Invalid date {text:?} ({e}); fetching all records.");
            Ok(None)
        }
    }
}
