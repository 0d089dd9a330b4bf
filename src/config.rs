use std::{path::PathBuf, time::Duration};

use anyhow::anyhow;
use chrono::FixedOffset;
use log::info;
use luogu_scraping_utils::fs_json_util::read_toml;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use url::Url;

use crate::chrono_util::offset_from_hours;

pub const DEFAULT_CONFIG_PATH: &str = "luogu-scraping.toml";
pub const MIN_DATE_ENV: &str = "LUOGU_MIN_DATE";

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Record list page of the judge.
    pub base_url: Url,
    /// Directory holding one `<uid>.json` per user.
    pub json_dir: PathBuf,
    /// Spreadsheet with `uid` and `name` columns.
    pub uids_file: PathBuf,
    pub output_file: PathBuf,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_delay: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    pub user_agent: String,
    /// Time zone the judge reports times in, as hours east of UTC.
    pub utc_offset_hours: i32,
    /// Ask the judge for the bare JSON payload (`_contentOnly=1`).
    pub content_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://www.luogu.com.cn/record/list")
                .expect("the default url is valid"),
            json_dir: "json".into(),
            uids_file: "uids.xlsx".into(),
            output_file: PathBuf::from("opt").join("luogu_analysis.xlsx"),
            request_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            )
            .to_owned(),
            utc_offset_hours: 8,
            content_only: false,
        }
    }
}

impl Config {
    /// Reads the config file, or falls back to the defaults if there is none.
    pub fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !explicit && !path.exists() {
            info!("No config file at {path:?}; using the defaults.");
            return Ok(Self::default());
        }
        let config = read_toml(&path)?;
        info!("Loaded config from {path:?}.");
        Ok(config)
    }

    pub fn utc_offset(&self) -> anyhow::Result<FixedOffset> {
        offset_from_hours(self.utc_offset_hours)
            .ok_or_else(|| anyhow!("Invalid utc_offset_hours: {}", self.utc_offset_hours))
    }
}
