use std::{
    io,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use luogu_scraping_utils::fs_json_util::{ensure_parent_dir, read_json};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde_json::{Map, Value};

use crate::{
    reporter::{Event, Reporter},
    schema::UserId,
    style::{write_table, Cell, Table},
    uid_map::UidMap,
};

pub const DETAIL_SHEET: &str = "详细记录";
pub const SUMMARY_SHEET: &str = "做题统计";
pub const DETAIL_HEADERS: [&str; 7] = ["序号", "UID", "姓名", "题号", "题目名称", "AC日期", "AC时间"];
pub const SUMMARY_HEADERS: [&str; 4] = ["序号", "UID", "姓名", "AC数量"];

/// A stored submission reduced to the four columns we use; absent fields are empty.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct StoredRecord {
    pub problem_id: String,
    pub problem_title: String,
    pub status: String,
    pub time: String,
}

impl StoredRecord {
    fn from_object(object: &Map<String, Value>) -> Self {
        let field = |key: &str| object.get(key).map(value_text).unwrap_or_default();
        Self {
            problem_id: field("problem_id"),
            problem_title: field("problem_title"),
            status: field("status"),
            time: field("time"),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DetailRow {
    /// 1-based, restarting for every user.
    pub seq: usize,
    pub user: UserId,
    pub name: String,
    pub problem_id: String,
    pub problem_title: String,
    pub ac_date: String,
    pub ac_time: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SummaryRow {
    pub seq: usize,
    pub user: UserId,
    pub name: String,
    pub ac_count: usize,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Report {
    pub details: Vec<DetailRow>,
    pub summary: Vec<SummaryRow>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("Permission denied: please close {0:?} if it is open.")]
    Locked(PathBuf),
    #[error("Error saving the spreadsheet to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error building the spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

/// `<uid>.json` files of `dir`, sorted by file name.
pub fn discover_record_sets(dir: &Path, reporter: &impl Reporter) -> Vec<(UserId, PathBuf)> {
    let entries = match fs_err::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            reporter.report(Event::RecordDirUnreadable {
                path: dir.to_owned(),
                reason: e.to_string(),
            });
            return vec![];
        }
    };
    let mut record_sets = vec![];
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                reporter.report(Event::RecordFileSkipped {
                    path: dir.to_owned(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        let user = path.file_stem().and_then(|stem| stem.to_str()).map(UserId::from);
        match user {
            Some(user) => record_sets.push((user, path)),
            None => reporter.report(Event::RecordFileSkipped {
                path,
                reason: "the file name is not valid UTF-8".to_owned(),
            }),
        }
    }
    record_sets.sort_by(|(_, a), (_, b)| a.file_name().cmp(&b.file_name()));
    record_sets
}

fn read_record_set(path: &Path) -> anyhow::Result<Vec<StoredRecord>> {
    let objects: Vec<Map<String, Value>> = read_json(path)?;
    Ok(objects.iter().map(StoredRecord::from_object).collect())
}

/// Keeps the earliest record of every problem, oldest first, numbered from 1.
pub fn user_detail_rows(user: &UserId, name: &str, records: Vec<StoredRecord>) -> Vec<DetailRow> {
    records
        .into_iter()
        .sorted_by(|a, b| a.time.cmp(&b.time))
        .unique_by(|record| record.problem_id.clone())
        .enumerate()
        .map(|(i, record)| {
            let (ac_date, ac_time) = match record.time.split_once(' ') {
                Some((date, time)) => (date.to_owned(), time.to_owned()),
                None => (record.time.clone(), String::new()),
            };
            DetailRow {
                seq: i + 1,
                user: user.clone(),
                name: name.to_owned(),
                problem_id: record.problem_id,
                problem_title: record.problem_title,
                ac_date,
                ac_time,
            }
        })
        .collect()
}

/// One row per lookup entry, most accepted problems first; ties keep lookup order.
pub fn summarize(details: &[DetailRow], lookup: &UidMap) -> Vec<SummaryRow> {
    let counts = details.iter().map(|row| &row.user).counts();
    lookup
        .iter()
        .map(|(user, name)| (user, name, counts.get(user).copied().unwrap_or(0)))
        .sorted_by(|a, b| b.2.cmp(&a.2))
        .enumerate()
        .map(|(i, (user, name, ac_count))| SummaryRow {
            seq: i + 1,
            user: user.clone(),
            name: name.clone(),
            ac_count,
        })
        .collect()
}

/// Reads every record set under `dir` and builds both tables.
///
/// Users whose file cannot be decoded or is empty are skipped with a report.
pub fn assemble(dir: &Path, lookup: &UidMap, reporter: &impl Reporter) -> Report {
    let record_sets = discover_record_sets(dir, reporter);
    if record_sets.is_empty() {
        reporter.report(Event::NoRecordSets);
    }

    let mut details = vec![];
    let mut users = 0;
    for (user, path) in record_sets {
        let records = match read_record_set(&path) {
            Ok(records) => records,
            Err(e) => {
                reporter.report(Event::RecordSetSkipped {
                    user,
                    reason: format!("{e:#}"),
                });
                continue;
            }
        };
        if records.is_empty() {
            reporter.report(Event::RecordSetSkipped {
                user,
                reason: "the record set is empty".to_owned(),
            });
            continue;
        }
        let name = lookup.get(&user).map_or(user.as_str(), String::as_str);
        details.extend(user_detail_rows(&user, name, records));
        users += 1;
    }

    let summary = summarize(&details, lookup);
    reporter.report(Event::ReportAssembled {
        detail_rows: details.len(),
        users,
    });
    Report { details, summary }
}

/// Assembles the report from `dir` and saves it to `output`.
pub fn build(
    dir: &Path,
    lookup: &UidMap,
    output: &Path,
    reporter: &impl Reporter,
) -> Result<Report, PersistenceFailure> {
    let report = assemble(dir, lookup, reporter);
    report.save(output)?;
    Ok(report)
}

impl Report {
    pub fn detail_table(&self) -> Table<'static> {
        Table {
            sheet_name: DETAIL_SHEET,
            headers: &DETAIL_HEADERS,
            rows: self
                .details
                .iter()
                .map(|row| {
                    vec![
                        Cell::Number(row.seq as u64),
                        Cell::Text(row.user.to_string()),
                        Cell::Text(row.name.clone()),
                        Cell::Text(row.problem_id.clone()),
                        Cell::Text(row.problem_title.clone()),
                        Cell::Text(row.ac_date.clone()),
                        Cell::Text(row.ac_time.clone()),
                    ]
                })
                .collect(),
        }
    }

    pub fn summary_table(&self) -> Table<'static> {
        Table {
            sheet_name: SUMMARY_SHEET,
            headers: &SUMMARY_HEADERS,
            rows: self
                .summary
                .iter()
                .map(|row| {
                    vec![
                        Cell::Number(row.seq as u64),
                        Cell::Text(row.user.to_string()),
                        Cell::Text(row.name.clone()),
                        Cell::Number(row.ac_count as u64),
                    ]
                })
                .collect(),
        }
    }

    /// Writes both sheets, styled, in one go.  The file is only touched once the
    /// whole workbook has been built in memory.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceFailure> {
        let mut workbook = Workbook::new();
        write_table(&mut workbook, &self.detail_table())?;
        write_table(&mut workbook, &self.summary_table())?;
        let buffer = workbook.save_to_buffer()?;

        let io_failure = |source: io::Error| match source.kind() {
            io::ErrorKind::PermissionDenied => PersistenceFailure::Locked(path.to_owned()),
            _ => PersistenceFailure::Io {
                path: path.to_owned(),
                source,
            },
        };
        ensure_parent_dir(path).map_err(io_failure)?;
        fs_err::write(path, buffer).map_err(io_failure)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use calamine::{open_workbook_auto, Reader};
    use itertools::Itertools;
    use serde_json::json;

    use super::{
        assemble, build, discover_record_sets, summarize, user_detail_rows, StoredRecord, DETAIL_HEADERS,
        DETAIL_SHEET, SUMMARY_HEADERS, SUMMARY_SHEET,
    };
    use crate::{
        reporter::{Event, MemoryReporter},
        schema::UserId,
        uid_map::{cell_text, UidMap},
    };

    fn record(problem_id: &str, time: &str) -> StoredRecord {
        StoredRecord {
            problem_id: problem_id.to_owned(),
            problem_title: format!("title of {problem_id}"),
            status: "Accepted".to_owned(),
            time: time.to_owned(),
        }
    }

    fn lookup(entries: &[(&str, &str)]) -> UidMap {
        entries
            .iter()
            .map(|&(uid, name)| (UserId::from(uid), name.to_owned()))
            .collect()
    }

    fn write_set(dir: &Path, uid: &str, value: serde_json::Value) {
        fs_err::write(dir.join(format!("{uid}.json")), value.to_string()).unwrap();
    }

    fn read_sheet(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut workbook = open_workbook_auto(path).unwrap();
        let range = workbook.worksheet_range(sheet).unwrap();
        range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect()
    }

    #[test]
    fn test_dedup_keeps_earliest() {
        let records = vec![
            record("P1001", "2024-03-02 10:00:00"),
            record("P1002", "2024-03-01 09:00:00"),
            record("P1001", "2024-02-28 23:59:59"),
            record("P1001", "2024-03-05 08:00:00"),
        ];
        let rows = user_detail_rows(&"7".into(), "Alice", records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].problem_id, "P1001");
        assert_eq!(rows[0].ac_date, "2024-02-28");
        assert_eq!(rows[0].ac_time, "23:59:59");
        assert_eq!(rows[1].problem_id, "P1002");
        assert_eq!(rows.iter().map(|r| r.seq).collect_vec(), [1, 2]);
        assert!(rows.iter().all(|r| r.name == "Alice"));
    }

    #[test]
    fn test_time_without_space() {
        let rows = user_detail_rows(&"7".into(), "7", vec![record("P1", "2024-03-02")]);
        assert_eq!(rows[0].ac_date, "2024-03-02");
        assert_eq!(rows[0].ac_time, "");
    }

    #[test]
    fn test_summary_is_complete_and_sorted() {
        let mut details = user_detail_rows(
            &"2".into(),
            "Bob",
            vec![record("P1", "2024-01-01 00:00:00")],
        );
        details.extend(user_detail_rows(
            &"3".into(),
            "Carol",
            vec![
                record("P1", "2024-01-01 00:00:00"),
                record("P2", "2024-01-02 00:00:00"),
            ],
        ));
        let lookup = lookup(&[("1", "Alice"), ("2", "Bob"), ("3", "Carol"), ("4", "Dave")]);
        let summary = summarize(&details, &lookup);
        assert_eq!(
            summary
                .iter()
                .map(|r| (r.seq, r.user.as_str(), r.ac_count))
                .collect_vec(),
            [(1, "3", 2), (2, "2", 1), (3, "1", 0), (4, "4", 0)]
        );
    }

    #[test]
    fn test_assemble_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_set(
            dir.path(),
            "200",
            json!([
                {"problem_id": "P1002", "problem_title": "过河卒", "status": "Accepted", "time": "2024-01-03 12:00:00"},
                {"problem_id": "P1002", "problem_title": "过河卒", "status": "Accepted", "time": "2024-01-02 12:00:00"},
            ]),
        );
        write_set(
            dir.path(),
            "100",
            json!([{"problem_id": "P1001", "time": "2024-01-01 08:00:00"}]),
        );
        write_set(dir.path(), "300", json!([]));
        fs_err::write(dir.path().join("400.json"), "{ not json").unwrap();
        fs_err::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let reporter = MemoryReporter::default();
        let lookup = lookup(&[("200", "Bob"), ("500", "Eve")]);
        let report = assemble(dir.path(), &lookup, &reporter);

        assert_eq!(
            report
                .details
                .iter()
                .map(|r| (r.user.as_str(), r.name.as_str(), r.problem_id.as_str()))
                .collect_vec(),
            [("100", "100", "P1001"), ("200", "Bob", "P1002")]
        );
        assert_eq!(report.details[0].problem_title, "");
        assert_eq!(report.details[1].ac_date, "2024-01-02");
        assert_eq!(
            report
                .summary
                .iter()
                .map(|r| (r.user.as_str(), r.ac_count))
                .collect_vec(),
            [("200", 1), ("500", 0)]
        );
        let skipped = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RecordSetSkipped { user, .. } => Some(user.to_string()),
                _ => None,
            })
            .collect_vec();
        assert_eq!(skipped, ["300", "400"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_is_reported() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        write_set(dir.path(), "100", json!([]));
        let odd = dir.path().join(OsStr::from_bytes(b"\xff\xfe.json"));
        fs_err::write(&odd, "[]").unwrap();

        let reporter = MemoryReporter::default();
        let sets = discover_record_sets(dir.path(), &reporter);
        assert_eq!(
            sets.iter().map(|(user, _)| user.as_str()).collect_vec(),
            ["100"]
        );
        assert_eq!(
            reporter.events(),
            [Event::RecordFileSkipped {
                path: odd,
                reason: "the file name is not valid UTF-8".to_owned(),
            }]
        );
    }

    #[test]
    fn test_build_writes_both_sheets() {
        let dir = tempfile::tempdir().unwrap();
        write_set(
            dir.path(),
            "100",
            json!([{"problem_id": "P1001", "problem_title": "A+B Problem", "status": "Accepted", "time": "2024-01-01 08:00:00"}]),
        );
        let output = dir.path().join("opt").join("report.xlsx");
        let lookup = lookup(&[("100", "Alice")]);
        build(dir.path(), &lookup, &output, &MemoryReporter::default()).unwrap();

        let detail = read_sheet(&output, DETAIL_SHEET);
        assert_eq!(detail[0], DETAIL_HEADERS);
        assert_eq!(
            detail[1],
            ["1", "100", "Alice", "P1001", "A+B Problem", "2024-01-01", "08:00:00"]
        );
        let summary = read_sheet(&output, SUMMARY_SHEET);
        assert_eq!(summary[0], SUMMARY_HEADERS);
        assert_eq!(summary[1], ["1", "100", "Alice", "1"]);
    }

    #[test]
    fn test_empty_input_still_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("json");
        let output = dir.path().join("report.xlsx");
        let lookup = lookup(&[("1", "Alice"), ("2", "Bob")]);
        let reporter = MemoryReporter::default();
        let report = build(&missing, &lookup, &output, &reporter).unwrap();

        assert!(report.details.is_empty());
        assert!(report.summary.iter().all(|r| r.ac_count == 0));
        assert!(reporter.contains(|e| matches!(e, Event::RecordDirUnreadable { .. })));
        assert!(reporter.contains(|e| matches!(e, Event::NoRecordSets)));

        assert_eq!(read_sheet(&output, DETAIL_SHEET), [DETAIL_HEADERS]);
        let summary = read_sheet(&output, SUMMARY_SHEET);
        assert_eq!(&summary[1..], [["1", "1", "Alice", "0"], ["2", "2", "Bob", "0"]]);
    }
}
