use crate::p4rt::schema::MatchKind;
use crate::p4rt::session::SessionState;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub use rusty_p4_ecn_packet::MalformedTelemetry;

/// Machine readable part of a failed RPC.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpcStatus {
    pub code: tonic::Code,
    pub message: String,
}

impl From<tonic::Status> for RpcStatus {
    fn from(status: tonic::Status) -> Self {
        RpcStatus {
            code: status.code(),
            message: status.message().to_owned(),
        }
    }
}

impl From<&tonic::Status> for RpcStatus {
    fn from(status: &tonic::Status) -> Self {
        RpcStatus {
            code: status.code(),
            message: status.message().to_owned(),
        }
    }
}

impl Display for RpcStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum SchemaLoadError {
    #[error("Schema file {} error: {:?}", path, error)]
    Io { path: String, error: std::io::Error },
    #[error("Schema file {} has an unsupported format", path)]
    UnsupportedFormat { path: String },
    #[error("Schema syntax error at line {}: {}", line, message)]
    Syntax { line: usize, message: String },
    #[error("Schema decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Schema has no {0} section")]
    MissingSection(&'static str),
    #[error("Malformed {}: {}", kind, reason)]
    Malformed { kind: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("value 0x{} of {} needs {} bits, field is {} bits wide", value, field, needed, bitwidth)]
pub struct ValueRangeError {
    pub field: String,
    /// hex, as given
    pub value: String,
    pub needed: u32,
    pub bitwidth: i32,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ValidationError {
    #[error("Table {0} not found")]
    UnknownTable(String),
    #[error("Action {0} not found")]
    UnknownAction(String),
    #[error("Match field {} not found in table {}", field, table)]
    UnknownMatchField { table: String, field: String },
    #[error("Param {} not found in action {}", param, action)]
    UnknownParam { action: String, param: String },
    #[error("Action {} cannot be used {} of table {}", action, usage, table)]
    ActionNotAllowed {
        table: String,
        action: String,
        usage: &'static str,
    },
    #[error("Match field {} of table {} is {:?}, not {:?}", field, table, declared, requested)]
    MatchKind {
        table: String,
        field: String,
        declared: MatchKind,
        requested: MatchKind,
    },
    #[error("Match field {} of table {} given twice", field, table)]
    DuplicateMatchField { table: String, field: String },
    #[error("Exact match field {} of table {} is missing", field, table)]
    MissingMatchField { table: String, field: String },
    #[error("Default action entry of table {} cannot carry matches", table)]
    DefaultActionWithMatch { table: String },
    #[error("Param {} of action {} given twice", param, action)]
    DuplicateParam { action: String, param: String },
    #[error("Param {} of action {} is missing", param, action)]
    MissingParam { action: String, param: String },
    #[error("Entry of table {} has no action", table)]
    MissingAction { table: String },
    #[error("Prefix length {} is out of range for {} ({} bits)", prefix_len, field, bitwidth)]
    PrefixLength {
        field: String,
        prefix_len: i32,
        bitwidth: i32,
    },
    #[error("Table {} needs a positive priority", table)]
    PriorityRequired { table: String },
    #[error("Table {} does not use priorities, got {}", table, priority)]
    PriorityNotAllowed { table: String, priority: i32 },
    #[error("Port {} is outside {}..={}", port, min, max)]
    Port { port: u32, min: u32, max: u32 },
    #[error("Invalid clone session: {0}")]
    CloneSession(String),
    #[error("Unknown {} id {}", kind, id)]
    UnknownId { kind: &'static str, id: u32 },
    #[error("Unsupported {0}")]
    Unsupported(String),
    #[error(transparent)]
    ValueRange(#[from] ValueRangeError),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device {} connection to {} failed: {}", device, address, reason)]
    Connection {
        device: String,
        address: String,
        reason: String,
    },
    #[error("Device {} mastership not granted, code {}: {}", device, code, message)]
    Arbitration {
        device: String,
        code: i32,
        message: String,
    },
    #[error("Device {} pipeline install failed, {}", device, status)]
    PipelineInstall { device: String, status: RpcStatus },
    #[error("Device config file {} error: {:?}", path, error)]
    DeviceConfigFile { path: String, error: std::io::Error },
    #[error("Device {} already holds a different entry for {}", device, entry)]
    EntryConflict { device: String, entry: String },
    #[error("Device {} {} failed, {}", device, operation, status)]
    Transport {
        device: String,
        operation: &'static str,
        status: RpcStatus,
    },
    #[error("Device {} cannot {} while {:?}", device, operation, state)]
    InvalidState {
        device: String,
        operation: &'static str,
        state: SessionState,
    },
    #[error(
        "Device {} stream channel lost: {}",
        device,
        status.as_ref().map_or_else(|| "closed by the switch".to_owned(), |s| s.to_string())
    )]
    StreamLost {
        device: String,
        status: Option<RpcStatus>,
    },
    #[error("Device {} entry error: {}", device, error)]
    Validation {
        device: String,
        error: ValidationError,
    },
}

impl DeviceError {
    pub fn status_code(&self) -> Option<tonic::Code> {
        match self {
            DeviceError::PipelineInstall { status, .. } | DeviceError::Transport { status, .. } => {
                Some(status.code)
            }
            DeviceError::StreamLost { status, .. } => status.as_ref().map(|s| s.code),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {} error: {:?}", path, error)]
    Io { path: String, error: std::io::Error },
    #[error("Config file {} parse error: {}", path, error)]
    Parse {
        path: String,
        error: serde_json::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Invalid threshold {0:?}")]
    Threshold(String),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Schema(#[from] SchemaLoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No switch completed startup")]
    NoSwitchStarted,
}

pub type Result<T> = std::result::Result<T, ControllerError>;
