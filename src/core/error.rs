// Centralized error handling for doorsync

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Process exit statuses, one per failure class
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const USAGE: u8 = 1;
    pub const MISSING_FILE: u8 = 2;
    pub const INVALID_INPUT: u8 = 3;
    pub const CONFIG: u8 = 4;
    pub const AUTH: u8 = 5;
    pub const CONNECTION: u8 = 6;
    pub const MUTATION_REJECTED: u8 = 7;
    pub const TIMEOUT: u8 = 8;
    pub const DECLINED: u8 = 9;
    pub const INTERNAL: u8 = 70;
}

/// Problems with the roster file. All of these abort before any network contact.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("no such file: \"{}\"", .0.display())]
    MissingFile(PathBuf),

    #[error("error reading \"{}\": {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("\"{}\" is missing required column(s): {}", path.display(), missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("duplicate key serial(s) in roster: {}", uids.join(", "))]
    DuplicateKeys { uids: Vec<String> },
}

/// Login rejected by a controller
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("bad credentials for {host}")]
    BadCredentials { host: String },

    #[error("unexpected login status {status} from {host}")]
    UnexpectedStatus { host: String, status: u16 },

    #[error("login request to {host} failed: {source}")]
    Request {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// The persistent controller connection could not be opened or was lost
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("timed out after {after:?} connecting to {url}")]
    ConnectTimeout { url: String, after: Duration },

    #[error("{url} rejected the connection with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("invalid connection request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("connection error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed by controller")]
    Closed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Mutation command kinds, named as the controller names them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Remove,
    Add,
}

impl MutationKind {
    /// Value the controller echoes back in `resultof`
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Remove => "remove",
            MutationKind::Add => "userfile",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error for a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Usage(String),

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("controller rejected {kind} for uid {uid}")]
    MutationRejected { kind: MutationKind, uid: String },

    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout { waiting_for: String, after: Duration },

    #[error("aborted by operator, no changes made")]
    Declined,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Usage(_) => exit_code::USAGE,
            SyncError::Config(_) => exit_code::CONFIG,
            SyncError::Input(InputError::MissingFile(_)) => exit_code::MISSING_FILE,
            SyncError::Input(InputError::Unreadable { .. }) => exit_code::MISSING_FILE,
            SyncError::Input(_) => exit_code::INVALID_INPUT,
            SyncError::Auth(_) => exit_code::AUTH,
            SyncError::Connection(_) => exit_code::CONNECTION,
            SyncError::MutationRejected { .. } => exit_code::MUTATION_REJECTED,
            SyncError::Timeout { .. } => exit_code::TIMEOUT,
            SyncError::Declined => exit_code::DECLINED,
            SyncError::Internal(_) => exit_code::INTERNAL,
        }
    }

    /// Whether the failure only affects the controller it happened on.
    ///
    /// Login and connection failures leave that controller untouched, so the
    /// run may continue with the next one. Anything else ends the run.
    pub fn is_controller_scoped(&self) -> bool {
        matches!(self, SyncError::Auth(_) | SyncError::Connection(_))
    }
}
