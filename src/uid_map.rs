use std::path::Path;

use anyhow::{anyhow, bail, Context};
use calamine::{open_workbook_auto, Data, Reader};
use indexmap::IndexMap;
use crate::{
    reporter::{Event, Reporter},
    schema::UserId,
};

/// User id to display name, in spreadsheet order.
pub type UidMap = IndexMap<UserId, String>;

/// Like [`read_uid_map`], but any problem yields an empty map and a warning.
pub fn load_uid_map(path: &Path, reporter: &impl Reporter) -> UidMap {
    if !path.exists() {
        reporter.report(Event::UidMapMissing {
            path: path.to_owned(),
        });
        return UidMap::new();
    }
    match read_uid_map(path) {
        Ok(map) => {
            reporter.report(Event::UidMapLoaded {
                path: path.to_owned(),
                users: map.len(),
            });
            map
        }
        Err(e) => {
            reporter.report(Event::UidMapUnreadable {
                reason: format!("{e:#}"),
            });
            UidMap::new()
        }
    }
}

/// Reads the `uid` and `name` columns (header matched case-insensitively) of the
/// first sheet.  Rows without a uid are ignored; a repeated uid keeps its first
/// position and its last name.
pub fn read_uid_map(path: &Path) -> anyhow::Result<UidMap> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Error reading UID map from {path:?}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("{path:?} has no worksheet"))?
        .with_context(|| format!("Error reading UID map from {path:?}"))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        bail!("Columns 'uid' and 'name' not found in {path:?}");
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|cell| cell_text(cell).to_lowercase() == name)
    };
    let (Some(uid_column), Some(name_column)) = (column("uid"), column("name")) else {
        bail!("Columns 'uid' and 'name' not found in {path:?}");
    };

    let mut map = UidMap::new();
    for row in rows {
        let uid = row.get(uid_column).map(cell_text).unwrap_or_default();
        if uid.is_empty() {
            continue;
        }
        let name = row.get(name_column).map(cell_text).unwrap_or_default();
        map.insert(uid.into(), name);
    }
    Ok(map)
}

/// Text of a cell the way it reads in the sheet; integral numbers lose the `.0`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_owned(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
