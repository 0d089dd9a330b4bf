use derive_more::{AsRef, Display, From};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};

/// Status code the judge assigns to an accepted submission.
pub const ACCEPTED_STATUS: i64 = 12;

/// Page size assumed when the judge omits `perPage`.
pub const DEFAULT_PER_PAGE: u64 = 20;

/// Luogu user identifier, kept as text (`"123456"`).
#[derive(
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Debug,
    From,
    AsRef,
    Display,
    Serialize,
    Deserialize,
)]
#[as_ref(forward)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Accepted,
}

/// One accepted submission, as stored in `<uid>.json`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub problem_id: String,
    pub problem_title: String,
    pub status: SubmissionStatus,
    /// `YYYY-MM-DD HH:MM:SS` in the judge's time zone.
    pub time: String,
}

/// `records` object of a record list page.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordList {
    #[serde(default)]
    pub result: Vec<serde_json::Value>,
    /// Total number of records; `0` when missing or not a count.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub per_page: Option<u64>,
}

impl RecordList {
    pub fn per_page(&self) -> u64 {
        match self.per_page {
            Some(0) | None => DEFAULT_PER_PAGE,
            Some(n) => n,
        }
    }
}

/// One entry of `records.result`. Only the fields we read are modelled.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default)]
    pub problem: Option<RawProblem>,
    #[serde(default)]
    pub status: Option<i64>,
    pub submit_time: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProblem {
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}
