use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Access level stored on a controller for each credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    Disabled,
    Always,
    Expired,
    Admin,
    Denied,
    /// Any code the controller reports that has no name here
    Other(u8),
}

impl AccessLevel {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AccessLevel::Disabled,
            1 => AccessLevel::Always,
            2 => AccessLevel::Expired,
            99 => AccessLevel::Admin,
            127 => AccessLevel::Denied,
            other => AccessLevel::Other(other),
        }
    }

    /// Numeric code used on the wire (`acctype`)
    pub fn code(&self) -> u8 {
        match self {
            AccessLevel::Disabled => 0,
            AccessLevel::Always => 1,
            AccessLevel::Expired => 2,
            AccessLevel::Admin => 99,
            AccessLevel::Denied => 127,
            AccessLevel::Other(code) => *code,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Disabled => write!(f, "disabled"),
            AccessLevel::Always => write!(f, "always"),
            AccessLevel::Expired => write!(f, "expired"),
            AccessLevel::Admin => write!(f, "admin"),
            AccessLevel::Denied => write!(f, "denied"),
            AccessLevel::Other(code) => write!(f, "{}", code),
        }
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    /// Accepts either the numeric code or the level name (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Ok(AccessLevel::from_code(code));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "disabled" => Ok(AccessLevel::Disabled),
            "always" => Ok(AccessLevel::Always),
            "expired" => Ok(AccessLevel::Expired),
            "admin" => Ok(AccessLevel::Admin),
            "denied" => Ok(AccessLevel::Denied),
            _ => Err(format!("unknown access level '{}'", trimmed)),
        }
    }
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(AccessLevel::Disabled),
            Value::Number(n) => n
                .as_u64()
                .and_then(|code| u8::try_from(code).ok())
                .map(AccessLevel::from_code)
                .ok_or_else(|| de::Error::custom(format!("acctype out of range: {}", n))),
            Value::String(s) => s.parse().map_err(de::Error::custom),
            other => Err(de::Error::custom(format!("unexpected acctype: {}", other))),
        }
    }
}

/// One credential record, either desired (from the roster) or actual
/// (from a controller's user listing).
///
/// Field names follow the controller's listing format so that a listing
/// entry deserializes directly. Every field is read loosely: numbers and
/// strings are both accepted and normalized to the field's representation,
/// so comparisons never fail on a type mismatch.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    /// Controller-side unique key (key serial)
    #[serde(rename = "uid", default, deserialize_with = "loose_string")]
    pub external_id: String,
    #[serde(rename = "username", default, deserialize_with = "loose_string")]
    pub display_name: String,
    #[serde(rename = "acctype", default = "missing_access_level")]
    pub access_level: AccessLevel,
    #[serde(rename = "validuntil", default, deserialize_with = "loose_i64")]
    pub valid_until: i64,
    /// Kept as text so leading zeros survive
    #[serde(rename = "pincode", default, deserialize_with = "loose_string")]
    pub pin: String,
}

/// Record built from the roster file
pub type DesiredUser = UserRecord;

/// Record read back from a controller
pub type ActualUser = UserRecord;

impl UserRecord {
    pub fn new(
        external_id: impl Into<String>,
        display_name: impl Into<String>,
        access_level: AccessLevel,
        valid_until: i64,
        pin: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            access_level,
            valid_until,
            pin: pin.into(),
        }
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} until {}",
            self.display_name, self.external_id, self.access_level, self.valid_until
        )
    }
}

/// Two records describe the same credential iff all five fields agree.
///
/// Wire values are already coerced to one representation per field when a
/// listing entry is deserialized, so fields compare directly.
pub fn is_same_user(a: &UserRecord, b: &UserRecord) -> bool {
    a.external_id == b.external_id
        && a.display_name == b.display_name
        && a.pin == b.pin
        && a.access_level.code() == b.access_level.code()
        && a.valid_until == b.valid_until
}

/// Two records collide iff they share a key, whatever their other fields
pub fn is_duplicate_key(a: &UserRecord, b: &UserRecord) -> bool {
    a.external_id == b.external_id
}

fn missing_access_level() -> AccessLevel {
    AccessLevel::Disabled
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!("expected a scalar, got {}", other))),
    }
}

fn loose_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| de::Error::custom(format!("invalid number: {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid integer: {}", s))),
        other => Err(de::Error::custom(format!("expected an integer, got {}", other))),
    }
}
