#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use warmreboot_checker::errors::CheckError;
use warmreboot_checker::managers::checker::WarmrebootChecker;
use warmreboot_checker::services::catalog::{DirectoryScriptSource, ScriptSource};
use warmreboot_checker::services::change_record::{ChangeEntry, ChangeRecordSink};
use warmreboot_checker::services::device::{
    AccessMode, CommandBudget, DeviceHandler, HandlerFileTransfer, HandlerProvider, Platform,
};
use warmreboot_checker::services::logger::Logger;
use warmreboot_checker::services::result_log::ResultSink;
use warmreboot_checker::services::settings::CheckerSettings;

pub static ENV_LOCK: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

pub const SCRIPT: &str = "exit_check_202305.sh";
pub const HELPER: &str = "exit_check_common.sh";
pub const RESULTS: &str = "/tmp/exit_check_validation_results.json";

pub const PASSED_JSON: &str = r#"{"overall_status":"PASSED","total_failures":0,"failed_validations":[],"timestamp":"2025-11-18 22:54:32 UTC"}"#;
pub const FAILED_JSON: &str = r#"{"timestamp":"2025-11-18 22:54:32 UTC","overall_status":"FAILED","total_failures":1,"failed_exit_codes":[30],"failed_validations":[{"exit_code":30,"message":"Leftover tunnel"}]}"#;

pub fn tmp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

/// Script folder with two versions and the shared helper.
pub fn script_dir() -> PathBuf {
    let root = tmp_dir("warmreboot-scripts");
    std::fs::create_dir_all(&root).expect("create script dir");
    for name in ["exit_check_201811.sh", SCRIPT, HELPER] {
        std::fs::write(root.join(name), "#!/bin/bash\nexit 0\n").expect("write script");
    }
    root
}

/// Echoes the prompt and command in front of the payload like a real session.
pub fn with_echo(command: &str, payload: &str) -> String {
    format!("sw1# {}\n{}", command, payload)
}

#[derive(Clone)]
pub enum Reply {
    Output(String),
    Fail(CheckError),
}

pub struct FakeDevice {
    pub platform: Platform,
    pub running_version: Option<String>,
    pub inventory_version: Option<String>,
    pub fail_connect: bool,
    pub fail_upload: bool,
    replies: Mutex<Vec<(String, Reply)>>,
    pub commands: Mutex<Vec<(String, Option<CommandBudget>)>>,
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub modes: Mutex<Vec<AccessMode>>,
}

impl FakeDevice {
    pub fn sonic(running_version: &str) -> Self {
        Self {
            platform: Platform::Sonic,
            running_version: Some(running_version.to_string()),
            inventory_version: None,
            fail_connect: false,
            fail_upload: false,
            replies: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
        }
    }

    /// Replies to any command starting with `prefix`. Later rules win.
    pub fn reply(self, prefix: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push((prefix.to_string(), reply));
        self
    }

    pub fn with_results(self, payload: &str) -> Self {
        let cat = format!("sudo cat {}", RESULTS);
        let output = with_echo(&cat, payload);
        self.reply(&cat, Reply::Output(output))
    }

    pub fn command_list(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.command_list().iter().filter(|c| *c == command).count()
    }

    pub fn budget_for(&self, command: &str) -> Option<CommandBudget> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|(cmd, _)| cmd == command)
            .and_then(|(_, budget)| *budget)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct FakeHandler {
    name: String,
    device: Arc<FakeDevice>,
}

#[async_trait]
impl DeviceHandler for FakeHandler {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.device.platform.clone()
    }

    async fn connect(&self, mode: AccessMode) -> Result<(), CheckError> {
        self.device.connects.fetch_add(1, Ordering::SeqCst);
        self.device.modes.lock().unwrap().push(mode);
        if self.device.fail_connect {
            return Err(CheckError::connection("connection refused"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CheckError> {
        self.device.disconnects.fetch_add(1, Ordering::SeqCst);
        Err(CheckError::connection("already closed"))
    }

    async fn send_command(
        &self,
        command: &str,
        budget: Option<CommandBudget>,
    ) -> Result<String, CheckError> {
        self.device
            .commands
            .lock()
            .unwrap()
            .push((command.to_string(), budget));
        let replies = self.device.replies.lock().unwrap();
        match replies
            .iter()
            .rev()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            Some((_, Reply::Output(text))) => Ok(text.clone()),
            Some((_, Reply::Fail(err))) => Err(err.clone()),
            None => Ok(format!("sw1# {}\n", command)),
        }
    }

    async fn running_os_version(&self) -> Result<String, CheckError> {
        self.device
            .running_version
            .clone()
            .ok_or_else(|| CheckError::connection("show version failed"))
    }

    fn os_version(&self) -> Option<String> {
        self.device.inventory_version.clone()
    }

    async fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CheckError> {
        if self.device.fail_upload {
            return Err(CheckError::connection("SFTP channel closed"));
        }
        self.device
            .uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }
}

pub struct FakeProvider {
    pub device: Arc<FakeDevice>,
    pub fail: bool,
}

#[async_trait]
impl HandlerProvider for FakeProvider {
    async fn get_handler(&self, device_name: &str) -> Result<Box<dyn DeviceHandler>, CheckError> {
        if self.fail {
            return Err(CheckError::invalid_config(format!(
                "Device not found in inventory: {}",
                device_name
            )));
        }
        Ok(Box::new(FakeHandler {
            name: device_name.to_string(),
            device: self.device.clone(),
        }))
    }
}

#[derive(Default)]
pub struct MemoryChangeSink {
    pub accept: bool,
    pub entries: Mutex<Vec<ChangeEntry>>,
}

impl MemoryChangeSink {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl ChangeRecordSink for MemoryChangeSink {
    fn record_change(&self, entry: &ChangeEntry) -> Result<bool, CheckError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(self.accept)
    }
}

#[derive(Default)]
pub struct MemoryResults {
    pub fail: bool,
    pub entries: Mutex<Vec<(String, String, Option<String>, String)>>,
}

impl MemoryResults {
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, _, message)| message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl ResultSink for MemoryResults {
    fn record_result(
        &self,
        device: &str,
        task: &str,
        request_id: Option<&str>,
        message: &str,
    ) -> Result<(), CheckError> {
        self.entries.lock().unwrap().push((
            device.to_string(),
            task.to_string(),
            request_id.map(|s| s.to_string()),
            message.to_string(),
        ));
        if self.fail {
            return Err(CheckError::unclassified("sink offline"));
        }
        Ok(())
    }
}

pub struct Harness {
    pub device: Arc<FakeDevice>,
    pub changes: Arc<MemoryChangeSink>,
    pub results: Arc<MemoryResults>,
    pub checker: WarmrebootChecker,
    pub script_dir: PathBuf,
}

impl Harness {
    pub fn new(device: FakeDevice) -> Self {
        Self::build(device, MemoryChangeSink::accepting(), MemoryResults::default(), false)
    }

    pub fn build(
        device: FakeDevice,
        changes: MemoryChangeSink,
        results: MemoryResults,
        provider_fails: bool,
    ) -> Self {
        let script_dir = script_dir();
        let logger = Logger::new("test");
        let scripts = DirectoryScriptSource::new(logger.clone(), &script_dir, HELPER)
            .load()
            .expect("load scripts");
        let device = Arc::new(device);
        let changes = Arc::new(changes);
        let results = Arc::new(results);
        let checker = WarmrebootChecker::new(
            logger,
            CheckerSettings::default().with_script_dir(&script_dir),
            Arc::new(scripts),
            Arc::new(FakeProvider {
                device: device.clone(),
                fail: provider_fails,
            }),
            Arc::new(HandlerFileTransfer),
            changes.clone(),
            results.clone(),
        );
        Self {
            device,
            changes,
            results,
            checker,
            script_dir,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.script_dir);
    }
}
