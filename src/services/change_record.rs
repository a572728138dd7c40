use crate::constants::change::DESCRIPTION;
use crate::errors::CheckError;
use crate::services::logger::Logger;
use crate::services::settings::ChangeSettings;
use crate::utils::paths::{ensure_dir_for_file, resolve_change_ledger_path};
use chrono::{DateTime, Duration, Local, Timelike};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeState {
    ChangeInProcess,
    Completed,
}

/// Planned start and finish of the risky operation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeWindow {
    pub start: DateTime<Local>,
    pub finish: DateTime<Local>,
}

impl ChangeWindow {
    pub fn starting_now(duration_mins: i64) -> Self {
        let now = Local::now();
        let start = now.with_nanosecond(0).unwrap_or(now);
        Self {
            start,
            finish: start + Duration::minutes(duration_mins),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub device: String,
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub finish_time: String,
    pub risk: String,
    pub ticket_id: String,
    pub actor: String,
    pub service_name: String,
    pub state: ChangeState,
}

impl ChangeEntry {
    pub fn new(
        device: &str,
        task_name: &str,
        settings: &ChangeSettings,
        window: &ChangeWindow,
        state: ChangeState,
    ) -> Self {
        Self {
            device: device.to_string(),
            title: format!("{} - Warm Reboot Blocker Check", task_name),
            description: DESCRIPTION.to_string(),
            start_time: window.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            finish_time: window.finish.format("%Y-%m-%d %H:%M:%S").to_string(),
            risk: settings.risk.clone(),
            ticket_id: settings.ticket_id.clone(),
            actor: current_user(),
            service_name: settings.service_name.clone(),
            state,
        }
    }
}

fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Change-management system. `Ok(false)` means the system declined the entry.
pub trait ChangeRecordSink: Send + Sync {
    fn record_change(&self, entry: &ChangeEntry) -> Result<bool, CheckError>;
}

/// Keeps change entries as JSON lines in a local ledger file.
#[derive(Clone)]
pub struct JsonlChangeLedger {
    logger: Logger,
    file_path: PathBuf,
    queue: Arc<Mutex<()>>,
}

impl JsonlChangeLedger {
    pub fn new(logger: Logger) -> Self {
        Self::with_path(logger, resolve_change_ledger_path())
    }

    pub fn with_path(logger: Logger, file_path: PathBuf) -> Self {
        Self {
            logger: logger.child("change"),
            file_path,
            queue: Arc::new(Mutex::new(())),
        }
    }
}

impl ChangeRecordSink for JsonlChangeLedger {
    fn record_change(&self, entry: &ChangeEntry) -> Result<bool, CheckError> {
        let mut payload = serde_json::to_value(entry).map_err(|err| {
            CheckError::change_record(format!("Failed to serialize change entry: {}", err))
        })?;
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "recorded_at".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        ensure_dir_for_file(&self.file_path)
            .and_then(|_| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.file_path)
                    .and_then(|mut file| file.write_all(format!("{}\n", payload).as_bytes()))
            })
            .map_err(|err| {
                CheckError::change_record(format!("Failed to write change ledger: {}", err))
            })?;
        self.logger.debug(
            "Change entry recorded",
            Some(&serde_json::json!({"device": entry.device, "state": entry.state})),
        );
        Ok(true)
    }
}
