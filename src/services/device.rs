use crate::constants::budget;
use crate::errors::CheckError;
use crate::utils::paths::remote_join;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn from_read_write(read_write: bool) -> Self {
        if read_write {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly
        }
    }
}

/// Device family reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Sonic,
    Other(String),
}

impl Platform {
    pub fn is_sonic(&self) -> bool {
        matches!(self, Platform::Sonic)
    }
}

impl From<String> for Platform {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("sonic") {
            Platform::Sonic
        } else {
            Platform::Other(value.trim().to_lowercase())
        }
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        match value {
            Platform::Sonic => "sonic".to_string(),
            Platform::Other(name) => name,
        }
    }
}

/// Wait budget for one command: `max_loops` read cycles of
/// `LOOP_DELAY_MS * delay_factor` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBudget {
    pub max_loops: u64,
    pub delay_factor: u64,
}

impl CommandBudget {
    pub fn new(max_loops: u64, delay_factor: u64) -> Self {
        Self {
            max_loops: max_loops.max(1),
            delay_factor: delay_factor.max(1),
        }
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(budget::LOOP_DELAY_MS.saturating_mul(self.delay_factor))
    }

    pub fn timeout(&self) -> Duration {
        self.loop_delay()
            .saturating_mul(u32::try_from(self.max_loops).unwrap_or(u32::MAX))
    }
}

impl Default for CommandBudget {
    fn default() -> Self {
        Self::new(budget::DEFAULT_MAX_LOOPS, budget::DEFAULT_DELAY_FACTOR)
    }
}

/// One connected terminal session to a device. Commands are issued one at a
/// time; implementations serialize access to the underlying channel.
#[async_trait]
pub trait DeviceHandler: Send + Sync {
    fn device_name(&self) -> &str;

    fn platform(&self) -> Platform;

    async fn connect(&self, mode: AccessMode) -> Result<(), CheckError>;

    async fn disconnect(&self) -> Result<(), CheckError>;

    /// Returns whatever the terminal printed, echo and prompt included.
    async fn send_command(
        &self,
        command: &str,
        budget: Option<CommandBudget>,
    ) -> Result<String, CheckError>;

    /// Version reported by the running device.
    async fn running_os_version(&self) -> Result<String, CheckError>;

    /// Inventory-side version, used when the device cannot be asked.
    fn os_version(&self) -> Option<String>;

    async fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CheckError>;
}

#[async_trait]
pub trait HandlerProvider: Send + Sync {
    async fn get_handler(&self, device_name: &str) -> Result<Box<dyn DeviceHandler>, CheckError>;
}

#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn transfer_files(
        &self,
        handler: &dyn DeviceHandler,
        local_paths: &[PathBuf],
        remote_dir: &str,
    ) -> Result<(), CheckError>;
}

/// Copies each file into `remote_dir` under its own file name, stopping at the
/// first failure.
pub struct HandlerFileTransfer;

#[async_trait]
impl FileTransfer for HandlerFileTransfer {
    async fn transfer_files(
        &self,
        handler: &dyn DeviceHandler,
        local_paths: &[PathBuf],
        remote_dir: &str,
    ) -> Result<(), CheckError> {
        for local_path in local_paths {
            let file_name = local_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    CheckError::transfer_failure(format!(
                        "Local path has no file name: {}",
                        local_path.display()
                    ))
                })?;
            let remote_path = remote_join(remote_dir, file_name);
            handler
                .put_file(local_path, &remote_path)
                .await
                .map_err(|err| err.reclassify(crate::errors::CheckErrorKind::TransferFailure))?;
        }
        Ok(())
    }
}
