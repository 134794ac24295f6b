use crate::core::error::InputError;
use crate::models::user::{is_duplicate_key, is_same_user, ActualUser, DesiredUser, UserRecord};

/// What has to change on a controller to match the roster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Desired records with no identical record on the controller
    pub missing: Vec<DesiredUser>,
    /// Controller records with no identical desired record
    pub extraneous: Vec<ActualUser>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extraneous.is_empty()
    }
}

/// Records of `left` that have no match in `right`, in `left` order
fn only_in_left(left: &[UserRecord], right: &[UserRecord]) -> Vec<UserRecord> {
    left.iter()
        .filter(|l| !right.iter().any(|r| is_same_user(l, r)))
        .cloned()
        .collect()
}

/// Compare the roster with a controller snapshot.
///
/// A record that differs in any field shows up on both sides: the stale
/// copy is extraneous and the roster copy is missing. Quadratic, which is
/// fine for lists of a few hundred users.
pub fn compute_diff(desired: &[DesiredUser], actual: &[ActualUser]) -> Diff {
    Diff {
        missing: only_in_left(desired, actual),
        extraneous: only_in_left(actual, desired),
    }
}

/// Keys that appear more than once, each reported once, in first-seen order
pub fn duplicate_keys(records: &[UserRecord]) -> Vec<String> {
    let mut duplicates: Vec<String> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let first = records.iter().position(|other| is_duplicate_key(record, other));
        if first != Some(index) && !duplicates.contains(&record.external_id) {
            duplicates.push(record.external_id.clone());
        }
    }

    duplicates
}

/// Reject a roster that names the same key twice
pub fn validate_unique_keys(desired: &[DesiredUser]) -> Result<(), InputError> {
    let uids = duplicate_keys(desired);
    if uids.is_empty() {
        Ok(())
    } else {
        Err(InputError::DuplicateKeys { uids })
    }
}
