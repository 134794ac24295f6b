use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::error::MutationKind;
use crate::models::user::{DesiredUser, UserRecord};

/// Frames sent to a controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    /// Request one page of the stored user list
    Userlist { page: u32 },

    /// Delete the credential with this key
    Remove { uid: String },

    /// Create or overwrite a credential
    Userfile {
        uid: String,
        pincode: String,
        user: String,
        acctype: u8,
        acctype2: Option<u8>,
        acctype3: Option<u8>,
        acctype4: Option<u8>,
        validuntil: i64,
    },
}

impl Command {
    pub fn list_page(page: u32) -> Self {
        Command::Userlist { page }
    }

    pub fn remove(user: &UserRecord) -> Self {
        Command::Remove {
            uid: user.external_id.clone(),
        }
    }

    /// Secondary access types are always sent as null
    pub fn add(user: &DesiredUser) -> Self {
        Command::Userfile {
            uid: user.external_id.clone(),
            pincode: user.pin.clone(),
            user: user.display_name.clone(),
            acctype: user.access_level.code(),
            acctype2: None,
            acctype3: None,
            acctype4: None,
            validuntil: user.valid_until,
        }
    }

    /// The mutation kind this command performs, if any
    pub fn mutation_kind(&self) -> Option<MutationKind> {
        match self {
            Command::Userlist { .. } => None,
            Command::Remove { .. } => Some(MutationKind::Remove),
            Command::Userfile { .. } => Some(MutationKind::Add),
        }
    }
}

/// One page of the controller's user list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserListPage {
    pub page: u32,
    #[serde(rename = "haspages")]
    pub total_pages: u32,
    #[serde(default)]
    pub list: Vec<UserRecord>,
}

/// Acknowledgment of a mutation command
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    /// Command kind being acknowledged (`remove` or `userfile`)
    pub result_of: String,
    pub accepted: bool,
}

/// Frames received from a controller
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    UserList(UserListPage),
    Result(MutationResult),
    /// Anything else the controller pushes (status, log lines, ...)
    Other(String),
}

impl Inbound {
    /// Classify one text frame.
    ///
    /// Frames that are not JSON, or carry no `command`, are reported as
    /// `Other` so that each phase can skip them. A `userlist` frame whose
    /// body does not match the listing format is a protocol error.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, frame = %text, "Ignoring non-JSON frame");
                return Ok(Inbound::Other(String::new()));
            }
        };

        let command = match value.get("command").and_then(Value::as_str) {
            Some(command) => command.to_string(),
            None => return Ok(Inbound::Other(String::new())),
        };

        match command.as_str() {
            "userlist" => serde_json::from_value(value)
                .map(Inbound::UserList)
                .map_err(|e| format!("malformed userlist frame: {}", e)),
            "result" => Ok(Inbound::Result(MutationResult {
                result_of: value
                    .get("resultof")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                // Only a literal `true` counts as success
                accepted: value.get("result") == Some(&Value::Bool(true)),
            })),
            _ => Ok(Inbound::Other(command)),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Inbound::UserList(_) => "userlist",
            Inbound::Result(_) => "result",
            Inbound::Other(command) => command,
        }
    }
}
