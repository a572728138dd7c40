use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckErrorKind {
    InvalidConfig,
    Connection,
    DeviceTypeUnsupported,
    VersionUnparseable,
    VersionUnsupported,
    ScriptAssetMissing,
    TransferFailure,
    ExecutionChannelError,
    ResultsFileMissing,
    JsonDecodeError,
    CleanupFailure,
    ChangeRecordFailure,
    Unclassified,
}

impl CheckErrorKind {
    /// Kinds that stop the remote-operation sequence before execution.
    pub fn aborts_flow(self) -> bool {
        matches!(
            self,
            CheckErrorKind::DeviceTypeUnsupported
                | CheckErrorKind::VersionUnparseable
                | CheckErrorKind::VersionUnsupported
                | CheckErrorKind::ScriptAssetMissing
                | CheckErrorKind::TransferFailure
        )
    }

    pub fn code(self) -> &'static str {
        match self {
            CheckErrorKind::InvalidConfig => "INVALID_CONFIG",
            CheckErrorKind::Connection => "CONNECTION",
            CheckErrorKind::DeviceTypeUnsupported => "DEVICE_TYPE_UNSUPPORTED",
            CheckErrorKind::VersionUnparseable => "VERSION_UNPARSEABLE",
            CheckErrorKind::VersionUnsupported => "VERSION_UNSUPPORTED",
            CheckErrorKind::ScriptAssetMissing => "SCRIPT_ASSET_MISSING",
            CheckErrorKind::TransferFailure => "TRANSFER_FAILURE",
            CheckErrorKind::ExecutionChannelError => "EXECUTION_CHANNEL_ERROR",
            CheckErrorKind::ResultsFileMissing => "RESULTS_FILE_MISSING",
            CheckErrorKind::JsonDecodeError => "JSON_DECODE_ERROR",
            CheckErrorKind::CleanupFailure => "CLEANUP_FAILURE",
            CheckErrorKind::ChangeRecordFailure => "CHANGE_RECORD_FAILURE",
            CheckErrorKind::Unclassified => "UNCLASSIFIED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckError {
    pub kind: CheckErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CheckError {
    pub fn new(kind: CheckErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Re-tags an error raised by a lower layer with the step it failed in.
    pub fn reclassify(mut self, kind: CheckErrorKind) -> Self {
        self.kind = kind;
        self.code = kind.code().to_string();
        self
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::InvalidConfig, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::Connection, message)
    }

    pub fn device_type_unsupported(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::DeviceTypeUnsupported, message)
    }

    pub fn version_unparseable(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::VersionUnparseable, message)
    }

    pub fn version_unsupported(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::VersionUnsupported, message)
    }

    pub fn script_asset_missing(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::ScriptAssetMissing, message)
    }

    pub fn transfer_failure(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::TransferFailure, message)
    }

    pub fn execution_channel(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::ExecutionChannelError, message)
    }

    pub fn results_file_missing(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::ResultsFileMissing, message)
    }

    pub fn json_decode(message: impl Into<String>, raw_output: &str) -> Self {
        Self::new(CheckErrorKind::JsonDecodeError, message)
            .with_details(serde_json::json!({ "raw_output": raw_output }))
    }

    pub fn cleanup_failure(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::CleanupFailure, message)
    }

    pub fn change_record(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::ChangeRecordFailure, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(CheckErrorKind::Unclassified, message)
    }

    pub fn raw_output(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("raw_output"))
            .and_then(|v| v.as_str())
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CheckError {}

impl From<std::io::Error> for CheckError {
    fn from(err: std::io::Error) -> Self {
        CheckError::unclassified(err.to_string())
    }
}
