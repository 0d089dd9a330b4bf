//! Event sink shared by the fetcher, the uid map loader and the report builder.
//!
//! The library code never talks to a global logger; it hands every noteworthy
//! event to a [`Reporter`].  Binaries plug in [`LogReporter`], tests use
//! [`MemoryReporter`] and assert on what was reported.

use std::{cell::RefCell, fmt, path::PathBuf};

use chrono::NaiveDate;
use log::Level;

use crate::{record_page::DecodeFailure, schema::UserId};

pub trait Reporter {
    fn report(&self, event: Event);
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    FetchStarted {
        user: UserId,
    },
    CutoffApplied {
        min_date: NaiveDate,
    },
    PageRequested {
        page: u32,
    },
    TransportFailed {
        page: u32,
        message: String,
    },
    DecodeFailed {
        page: u32,
        failure: DecodeFailure,
    },
    /// `currentData` was missing, so the whole object was searched for records.
    FallbackContainer {
        page: u32,
    },
    EmptyPage {
        page: u32,
    },
    MalformedEntry {
        page: u32,
        message: String,
    },
    /// An entry was newer than the one before it on the same page.
    OrderViolation {
        page: u32,
        previous: i64,
        current: i64,
    },
    CutoffReached {
        page: u32,
    },
    Accepted {
        time: String,
        problem_id: String,
        problem_title: String,
    },
    EndOfRecords {
        page: u32,
    },
    UidMapMissing {
        path: PathBuf,
    },
    UidMapUnreadable {
        reason: String,
    },
    UidMapLoaded {
        path: PathBuf,
        users: usize,
    },
    RecordDirUnreadable {
        path: PathBuf,
        reason: String,
    },
    /// A directory entry that could not be turned into a record set.
    RecordFileSkipped {
        path: PathBuf,
        reason: String,
    },
    NoRecordSets,
    RecordSetSkipped {
        user: UserId,
        reason: String,
    },
    ReportAssembled {
        detail_rows: usize,
        users: usize,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        use Event::*;
        match self {
            TransportFailed { .. } | DecodeFailed { .. } => Level::Error,
            FallbackContainer { .. }
            | MalformedEntry { .. }
            | OrderViolation { .. }
            | UidMapMissing { .. }
            | UidMapUnreadable { .. }
            | RecordDirUnreadable { .. }
            | RecordFileSkipped { .. }
            | NoRecordSets
            | RecordSetSkipped { .. } => Level::Warn,
            PageRequested { .. } => Level::Debug,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Event::*;
        match self {
            FetchStarted { user } => write!(f, "Starting to fetch records of user {user}."),
            CutoffApplied { min_date } => write!(f, "Filtering records on or after {min_date}."),
            PageRequested { page } => write!(f, "Fetching page {page}..."),
            TransportFailed { page, message } => {
                write!(f, "Failed to retrieve page {page}: {message}")
            }
            DecodeFailed { page, failure } => write!(f, "Could not decode page {page}: {failure}"),
            FallbackContainer { page } => write!(
                f,
                "Page {page} has no `currentData`; searching the top-level object instead."
            ),
            EmptyPage { page } => write!(f, "No records found on page {page}."),
            MalformedEntry { page, message } => {
                write!(f, "Skipped a malformed entry on page {page}: {message}")
            }
            OrderViolation {
                page,
                previous,
                current,
            } => write!(
                f,
                "Records on page {page} are not sorted newest first ({current} follows {previous}); the cutoff may stop early."
            ),
            CutoffReached { page } => {
                write!(f, "Found a record older than the cutoff on page {page}. Stopping.")
            }
            Accepted {
                time,
                problem_id,
                problem_title,
            } => write!(f, "Found AC: {time} - {problem_id} - {problem_title}"),
            EndOfRecords { page } => write!(f, "Reached the end of records at page {page}."),
            UidMapMissing { path } => write!(f, "UID map file not found at {path:?}"),
            UidMapUnreadable { reason } => write!(f, "{reason}"),
            UidMapLoaded { path, users } => write!(f, "Loaded {users} users from {path:?}"),
            RecordDirUnreadable { path, reason } => {
                write!(f, "Cannot read record directory {path:?}: {reason}")
            }
            RecordFileSkipped { path, reason } => write!(f, "Skipped {path:?}: {reason}"),
            NoRecordSets => write!(f, "No record sets found. Generating an empty report."),
            RecordSetSkipped { user, reason } => {
                write!(f, "Skipped records of user {user}: {reason}")
            }
            ReportAssembled { detail_rows, users } => write!(
                f,
                "Assembled {detail_rows} detail rows from {users} users."
            ),
        }
    }
}

/// Forwards every event to the `log` facade at the event's level.
#[derive(Clone, Copy, Default, Debug)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: Event) {
        log::log!(event.level(), "{event}");
    }
}

/// Keeps every event in memory.
#[derive(Default, Debug)]
pub struct MemoryReporter {
    events: RefCell<Vec<Event>>,
}

impl MemoryReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn contains(&self, pred: impl Fn(&Event) -> bool) -> bool {
        self.events.borrow().iter().any(pred)
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, event: Event) {
        (**self).report(event)
    }
}
