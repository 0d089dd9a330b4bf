use std::{ops::ControlFlow, time::Duration};

use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use typed_builder::TypedBuilder;

use crate::{
    api::TransportFailure,
    chrono_util::{format_submit_time, start_of_day},
    record_page::{DecodeFailure, RecordPageDecoder},
    reporter::{Event, Reporter},
    schema::{RawRecord, Submission, SubmissionStatus, UserId, ACCEPTED_STATUS},
};

/// Something that can hand out record list pages, e.g. the judge over HTTP.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Raw body of page `page` (1-based) of `user`'s record list.
    async fn fetch_page(&self, user: &UserId, page: u32) -> Result<String, TransportFailure>;
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct FetchOptions {
    /// Inclusive lower bound on the submission date.
    #[builder(default)]
    pub min_date: Option<NaiveDate>,
    pub utc_offset: FixedOffset,
    #[builder(default = Duration::from_secs(1))]
    pub page_delay: Duration,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StopReason {
    /// `page * perPage` reached the reported total.
    EndOfRecords,
    EmptyPage,
    CutoffReached,
    TransportFailure,
    DecodeFailure(DecodeFailure),
}

#[derive(Debug)]
pub struct FetchReport {
    /// Accepted submissions, newest first.
    pub records: Vec<Submission>,
    pub stop: StopReason,
}

/// Walks `user`'s record list page by page and collects accepted submissions.
///
/// The judge lists records newest first, and the cutoff relies on it: the first
/// record older than `options.min_date` ends the whole run, including the rest of
/// its page.  Entries that break the order are reported as
/// [`Event::OrderViolation`].
///
/// This never fails; transport and decode errors end the run and whatever was
/// collected so far is returned.
pub async fn fetch_records<S, R>(
    source: &S,
    user: &UserId,
    options: &FetchOptions,
    reporter: &R,
) -> FetchReport
where
    S: RecordSource,
    R: Reporter,
{
    let decoder = RecordPageDecoder::default();
    reporter.report(Event::FetchStarted { user: user.clone() });
    let cutoff = options.min_date.map(|min_date| {
        reporter.report(Event::CutoffApplied { min_date });
        start_of_day(min_date, options.utc_offset)
    });

    let mut records = vec![];
    let mut page = 1;
    let stop = loop {
        reporter.report(Event::PageRequested { page });
        let body = match source.fetch_page(user, page).await {
            Ok(body) => body,
            Err(e) => {
                reporter.report(Event::TransportFailed {
                    page,
                    message: e.to_string(),
                });
                break StopReason::TransportFailure;
            }
        };
        let record_page = match decoder.decode(&body) {
            Ok(record_page) => record_page,
            Err(failure) => {
                reporter.report(Event::DecodeFailed {
                    page,
                    failure: failure.clone(),
                });
                break StopReason::DecodeFailure(failure);
            }
        };
        if record_page.used_fallback_container {
            reporter.report(Event::FallbackContainer { page });
        }
        if let Some(message) = record_page.malformed {
            reporter.report(Event::MalformedEntry { page, message });
        }

        let list = record_page.records;
        if list.result.is_empty() {
            reporter.report(Event::EmptyPage { page });
            break StopReason::EmptyPage;
        }
        let flow = collect_page(
            page,
            &list.result,
            cutoff,
            options.utc_offset,
            &mut records,
            reporter,
        );
        if flow.is_break() {
            reporter.report(Event::CutoffReached { page });
            break StopReason::CutoffReached;
        }
        if u64::from(page) * list.per_page() >= list.count {
            reporter.report(Event::EndOfRecords { page });
            break StopReason::EndOfRecords;
        }

        page += 1;
        sleep(options.page_delay).await;
    };
    FetchReport { records, stop }
}

/// Appends the accepted entries of one page; breaks at the first entry before `cutoff`.
fn collect_page<R: Reporter>(
    page: u32,
    entries: &[Value],
    cutoff: Option<i64>,
    utc_offset: FixedOffset,
    records: &mut Vec<Submission>,
    reporter: &R,
) -> ControlFlow<()> {
    let mut previous = None;
    for entry in entries {
        let record = match RawRecord::deserialize(entry) {
            Ok(record) => record,
            Err(e) => {
                reporter.report(Event::MalformedEntry {
                    page,
                    message: e.to_string(),
                });
                continue;
            }
        };
        let submit_time = record.submit_time;
        if let Some(previous) = previous.filter(|&previous| submit_time > previous) {
            reporter.report(Event::OrderViolation {
                page,
                previous,
                current: submit_time,
            });
        }
        previous = Some(submit_time);

        if cutoff.is_some_and(|cutoff| submit_time < cutoff) {
            return ControlFlow::Break(());
        }
        if record.status != Some(ACCEPTED_STATUS) {
            continue;
        }
        let Some(time) = format_submit_time(submit_time, utc_offset) else {
            reporter.report(Event::MalformedEntry {
                page,
                message: format!("submitTime {submit_time} is out of range"),
            });
            continue;
        };
        let problem = record.problem.unwrap_or_default();
        let submission = Submission {
            problem_id: problem.pid.unwrap_or_default(),
            problem_title: problem.title.unwrap_or_default(),
            status: SubmissionStatus::Accepted,
            time,
        };
        reporter.report(Event::Accepted {
            time: submission.time.clone(),
            problem_id: submission.problem_id.clone(),
            problem_title: submission.problem_title.clone(),
        });
        records.push(submission);
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, time::Duration};

    use chrono::NaiveDate;
    use itertools::Itertools;
    use reqwest::StatusCode;

    use super::{fetch_records, FetchOptions, RecordSource, StopReason};
    use crate::{
        api::TransportFailure,
        chrono_util::offset_from_hours,
        record_page::{
            test_pages::{html_page, json_page, Entry},
            DecodeFailure,
        },
        reporter::{Event, MemoryReporter},
        schema::UserId,
    };

    /// Serves canned bodies; pages past the end answer 404.
    struct FakeJudge {
        pages: Vec<String>,
        requested: RefCell<Vec<u32>>,
    }

    impl FakeJudge {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages,
                requested: RefCell::new(vec![]),
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.borrow().clone()
        }
    }

    impl RecordSource for FakeJudge {
        async fn fetch_page(&self, user: &UserId, page: u32) -> Result<String, TransportFailure> {
            assert_eq!(user.as_str(), "42");
            self.requested.borrow_mut().push(page);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .ok_or_else(|| TransportFailure::Status {
                    status: StatusCode::NOT_FOUND,
                    body: "not found".to_owned(),
                })
        }
    }

    fn options(min_date: Option<NaiveDate>) -> FetchOptions {
        FetchOptions::builder()
            .min_date(min_date)
            .utc_offset(offset_from_hours(8).unwrap())
            .page_delay(Duration::ZERO)
            .build()
    }

    // 2024-01-10 12:00:00 +08:00
    const BASE: i64 = 1_704_859_200;
    const DAY: i64 = 24 * 60 * 60;

    /// Five pages of two entries, newest first, one entry per day.
    fn five_pages() -> Vec<Vec<Entry<'static>>> {
        let entries = [
            ("P1005", "E", 12),
            ("P1004", "D", 14),
            ("P1004", "D", 12),
            ("P1003", "C", 12),
            ("P1003", "C", 12),
            ("P1002", "B", 7),
            ("P1002", "B", 12),
            ("P1001", "A", 12),
            ("P1000", "Z", 12),
            ("P0999", "Y", 12),
        ];
        entries
            .iter()
            .enumerate()
            .map(|(i, &(pid, title, status))| (pid, title, status, BASE - i as i64 * DAY))
            .chunks(2)
            .into_iter()
            .map(|chunk| chunk.collect())
            .collect()
    }

    fn json_pages(pages: &[Vec<Entry>]) -> Vec<String> {
        pages.iter().map(|entries| json_page(entries, 10, 2)).collect()
    }

    fn user() -> UserId {
        "42".into()
    }

    #[tokio::test]
    async fn test_paginates_until_count() {
        let judge = FakeJudge::new(json_pages(&five_pages()));
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        assert_eq!(report.stop, StopReason::EndOfRecords);
        assert_eq!(judge.requested(), vec![1, 2, 3, 4, 5]);
        assert_eq!(report.records.len(), 8);
        assert_eq!(report.records[0].problem_id, "P1005");
        assert_eq!(report.records[0].time, "2024-01-10 12:00:00");
        assert_eq!(report.records[7].problem_id, "P0999");
        assert!(reporter.contains(|e| matches!(e, Event::EndOfRecords { page: 5 })));
    }

    #[tokio::test]
    async fn test_only_accepted_records_are_kept() {
        let judge = FakeJudge::new(json_pages(&five_pages()));
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        let ids = report.records.iter().map(|r| r.problem_id.as_str()).collect_vec();
        assert_eq!(
            ids,
            ["P1005", "P1004", "P1003", "P1003", "P1002", "P1001", "P1000", "P0999"]
        );
        assert!(report
            .records
            .iter()
            .all(|r| r.status == crate::schema::SubmissionStatus::Accepted));
    }

    #[tokio::test]
    async fn test_cutoff_stops_without_fetching_more() {
        let judge = FakeJudge::new(json_pages(&five_pages()));
        let reporter = MemoryReporter::default();
        // Entries 0..=5 are on or after 2024-01-05; entry 6 (2024-01-04) is older.
        let min_date = NaiveDate::from_ymd_opt(2024, 1, 5);
        let report = fetch_records(&judge, &user(), &options(min_date), &reporter).await;
        assert_eq!(report.stop, StopReason::CutoffReached);
        assert_eq!(judge.requested(), vec![1, 2, 3, 4]);
        let times = report.records.iter().map(|r| r.time.as_str()).collect_vec();
        assert_eq!(
            times,
            [
                "2024-01-10 12:00:00",
                "2024-01-08 12:00:00",
                "2024-01-07 12:00:00",
                "2024-01-06 12:00:00",
            ]
        );
        assert!(times.iter().all(|t| *t >= "2024-01-05"));
        assert!(reporter.contains(|e| matches!(e, Event::CutoffReached { page: 4 })));
    }

    #[tokio::test]
    async fn test_cutoff_is_inclusive() {
        let midnight = BASE - 12 * 60 * 60; // 2024-01-10 00:00:00 +08:00
        let page = json_page(
            &[
                ("P2", "B", 12, midnight),
                ("P1", "A", 12, midnight - 1),
            ],
            2,
            20,
        );
        let judge = FakeJudge::new(vec![page]);
        let min_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        let report =
            fetch_records(&judge, &user(), &options(min_date), &MemoryReporter::default()).await;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].time, "2024-01-10 00:00:00");
    }

    #[tokio::test]
    async fn test_injected_pages_give_same_records() {
        let pages = five_pages();
        let json = fetch_records(
            &FakeJudge::new(json_pages(&pages)),
            &user(),
            &options(None),
            &MemoryReporter::default(),
        )
        .await;
        let html = fetch_records(
            &FakeJudge::new(json_pages(&pages).iter().map(|p| html_page(p)).collect()),
            &user(),
            &options(None),
            &MemoryReporter::default(),
        )
        .await;
        assert_eq!(json.records, html.records);
        assert_eq!(html.stop, StopReason::EndOfRecords);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_results() {
        let mut pages = json_pages(&five_pages());
        pages.truncate(2);
        let judge = FakeJudge::new(pages);
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        assert_eq!(report.stop, StopReason::TransportFailure);
        assert_eq!(report.records.len(), 3);
        assert!(reporter.contains(|e| matches!(e, Event::TransportFailed { page: 3, .. })));
    }

    #[tokio::test]
    async fn test_login_page_ends_run() {
        let mut pages = json_pages(&five_pages());
        pages[1] = "<html><title>登录</title></html>".to_owned();
        let report = fetch_records(
            &FakeJudge::new(pages),
            &user(),
            &options(None),
            &MemoryReporter::default(),
        )
        .await;
        assert_eq!(
            report.stop,
            StopReason::DecodeFailure(DecodeFailure::LoginRequired)
        );
        assert_eq!(report.records.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_ends_run() {
        let judge = FakeJudge::new(vec![json_page(&[], 0, 20)]);
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        assert_eq!(report.stop, StopReason::EmptyPage);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_and_order_violation_are_reported() {
        let mut page: serde_json::Value = serde_json::from_str(&json_page(
            &[("P1", "A", 12, BASE), ("P2", "B", 12, BASE + DAY)],
            3,
            20,
        ))
        .unwrap();
        page["currentData"]["records"]["result"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"status": 12}));
        let judge = FakeJudge::new(vec![page.to_string()]);
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        assert_eq!(report.records.len(), 2);
        assert!(reporter.contains(|e| matches!(e, Event::OrderViolation { .. })));
        assert!(reporter.contains(|e| matches!(e, Event::MalformedEntry { .. })));
        assert_eq!(report.stop, StopReason::EndOfRecords);
    }

    #[tokio::test]
    async fn test_null_count_keeps_page_entries() {
        let mut page: serde_json::Value =
            serde_json::from_str(&json_page(&[("P1", "A", 12, BASE)], 1, 20)).unwrap();
        page["currentData"]["records"]["count"] = serde_json::Value::Null;
        let judge = FakeJudge::new(vec![page.to_string()]);
        let reporter = MemoryReporter::default();
        let report = fetch_records(&judge, &user(), &options(None), &reporter).await;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].problem_id, "P1");
        assert_eq!(report.stop, StopReason::EndOfRecords);
        assert_eq!(judge.requested(), vec![1]);
        assert!(!reporter.contains(|e| matches!(e, Event::MalformedEntry { .. })));
    }
}
