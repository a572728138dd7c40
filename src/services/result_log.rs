use crate::errors::CheckError;
use crate::services::logger::Logger;
use crate::utils::paths::{ensure_dir_for_file, resolve_results_log_path};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Durable, queryable trail of task milestones, separate from process logs.
pub trait ResultSink: Send + Sync {
    fn record_result(
        &self,
        device: &str,
        task: &str,
        request_id: Option<&str>,
        message: &str,
    ) -> Result<(), CheckError>;
}

#[derive(Debug, Default, Clone)]
pub struct ResultLogStats {
    pub logged: u64,
    pub errors: u64,
}

/// Appends one JSON object per line to a local file.
#[derive(Clone)]
pub struct JsonlResultLog {
    logger: Logger,
    file_path: PathBuf,
    queue: Arc<Mutex<()>>,
    stats: Arc<Mutex<ResultLogStats>>,
}

impl JsonlResultLog {
    pub fn new(logger: Logger) -> Self {
        Self::with_path(logger, resolve_results_log_path())
    }

    pub fn with_path(logger: Logger, file_path: PathBuf) -> Self {
        Self {
            logger: logger.child("results"),
            file_path,
            queue: Arc::new(Mutex::new(())),
            stats: Arc::new(Mutex::new(ResultLogStats::default())),
        }
    }

    fn append(&self, entry: &Value) -> Result<(), CheckError> {
        let payload = format!("{}\n", entry);
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        let written = ensure_dir_for_file(&self.file_path).and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .and_then(|mut file| file.write_all(payload.as_bytes()))
        });
        let mut stats = self.stats.lock().unwrap_or_else(|err| err.into_inner());
        match written {
            Ok(()) => {
                stats.logged += 1;
                Ok(())
            }
            Err(err) => {
                stats.errors += 1;
                Err(CheckError::unclassified(format!(
                    "Result log write failed: {}",
                    err
                )))
            }
        }
    }

    /// Most recent `limit` entries recorded for `device`, oldest first.
    pub fn read_entries_for(&self, device: &str, limit: usize) -> Result<Vec<Value>, CheckError> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.file_path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.unwrap_or_default();
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(parsed) if parsed["device"] == device => entries.push(parsed),
                Ok(_) => {}
                Err(_) => self.logger.warn("Skipping invalid result entry", None),
            }
        }
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    pub fn stats(&self) -> ResultLogStats {
        self.stats
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl ResultSink for JsonlResultLog {
    fn record_result(
        &self,
        device: &str,
        task: &str,
        request_id: Option<&str>,
        message: &str,
    ) -> Result<(), CheckError> {
        self.append(&serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "device": device,
            "task": task,
            "request_id": request_id,
            "message": message,
        }))
    }
}
