// Roster CSV reader: CID, name, key serial, PIN, plus optional acctype and valid until

use std::path::Path;
use tracing::debug;

use crate::core::config::RosterConfig;
use crate::core::error::InputError;
use crate::models::user::{AccessLevel, DesiredUser, UserRecord};
use crate::utils::serial::normalize_key_serial;

const COL_CID: &str = "CID";
const COL_NAME: &str = "name";
const COL_SERIAL: &str = "key serial";
const COL_PIN: &str = "PIN";
const COL_ACCTYPE: &str = "acctype";
const COL_VALID_UNTIL: &str = "valid until";

/// Column positions resolved from the header row
struct Columns {
    cid: usize,
    name: usize,
    serial: usize,
    pin: usize,
    acctype: Option<usize>,
    valid_until: Option<usize>,
    /// Number of header fields
    width: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord, path: &Path) -> Result<Self, InputError> {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };

        let required = [COL_CID, COL_NAME, COL_SERIAL, COL_PIN];
        let missing: Vec<String> = required
            .into_iter()
            .filter(|&col| find(col).is_none())
            .map(|col| col.to_string())
            .collect();

        match (find(COL_CID), find(COL_NAME), find(COL_SERIAL), find(COL_PIN)) {
            (Some(cid), Some(name), Some(serial), Some(pin)) => Ok(Self {
                cid,
                name,
                serial,
                pin,
                acctype: find(COL_ACCTYPE),
                valid_until: find(COL_VALID_UNTIL),
                width: headers.len(),
            }),
            _ => Err(InputError::MissingColumns {
                path: path.to_path_buf(),
                missing,
            }),
        }
    }

    /// Fields a row needs so that every required column is present
    fn required_len(&self) -> usize {
        [self.cid, self.name, self.serial, self.pin]
            .into_iter()
            .max()
            .map_or(0, |last| last + 1)
    }
}

/// Load the desired user list from a roster file, in file order
pub fn load_roster(path: &Path, defaults: &RosterConfig) -> Result<Vec<DesiredUser>, InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile(path.to_path_buf()));
    }

    let unreadable = |source| InputError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;

    let headers = reader.headers().map_err(unreadable)?.clone();
    let columns = Columns::resolve(&headers, path)?;

    let mut users = Vec::new();
    for row in reader.records() {
        let row = row.map_err(unreadable)?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let user = parse_row(&row, &columns, defaults)
            .map_err(|reason| InputError::InvalidRow { line, reason })?;
        debug!(line, uid = %user.external_id, user = %user.display_name, "Roster entry");
        users.push(user);
    }

    Ok(users)
}

fn parse_row(
    row: &csv::StringRecord,
    columns: &Columns,
    defaults: &RosterConfig,
) -> Result<UserRecord, String> {
    if row.len() < columns.required_len() {
        return Err(format!(
            "row has {} fields, header has {}",
            row.len(),
            columns.width
        ));
    }

    let field = |index: usize| row.get(index).unwrap_or_default().trim();
    let optional = |index: Option<usize>| index.map(field).filter(|value| !value.is_empty());

    let external_id = normalize_key_serial(field(columns.serial))?;

    let access_level = match optional(columns.acctype) {
        Some(value) => value.parse::<AccessLevel>()?,
        None => defaults.default_access_level(),
    };

    let valid_until = match optional(columns.valid_until) {
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| format!("invalid valid-until timestamp '{}'", value))?,
        None => defaults.valid_until,
    };

    Ok(UserRecord::new(
        external_id,
        format!("{}: {}", field(columns.cid), field(columns.name)),
        access_level,
        valid_until,
        field(columns.pin),
    ))
}
