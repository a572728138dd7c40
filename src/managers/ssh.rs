use crate::constants::network as network_constants;
use crate::errors::CheckError;
use crate::services::device::{AccessMode, CommandBudget, DeviceHandler, HandlerProvider, Platform};
use crate::services::logger::Logger;
use crate::utils::paths::resolve_inventory_path;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use ssh2::{OpenFlags, OpenType, Session};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

static SONIC_VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*SONiC Software Version:\s*(\S+)").expect("sonic version regex")
});

fn default_port() -> u16 {
    network_constants::SSH_DEFAULT_PORT
}

fn default_ready_timeout_ms() -> u64 {
    network_constants::TIMEOUT_SSH_READY_MS
}

fn default_keepalive_interval_ms() -> u64 {
    network_constants::KEEPALIVE_INTERVAL_MS
}

/// Connection details for one device, as stored in the inventory file.
#[derive(Debug, Clone, Deserialize)]
pub struct SshTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
    pub platform: Platform,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub devices: HashMap<String, SshTarget>,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self, CheckError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            CheckError::invalid_config(format!(
                "Failed to read inventory {}: {}",
                path.display(),
                err
            ))
            .with_hint("Set WARMREBOOT_INVENTORY_PATH to a JSON file with a \"devices\" map.")
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            CheckError::invalid_config(format!(
                "Failed to parse inventory {}: {}",
                path.display(),
                err
            ))
        })
    }
}

pub struct SshHandlerProvider {
    logger: Logger,
    inventory_path: PathBuf,
}

impl SshHandlerProvider {
    pub fn new(logger: Logger) -> Self {
        Self::with_inventory(logger, resolve_inventory_path())
    }

    pub fn with_inventory(logger: Logger, inventory_path: PathBuf) -> Self {
        Self {
            logger: logger.child("ssh"),
            inventory_path,
        }
    }
}

#[async_trait]
impl HandlerProvider for SshHandlerProvider {
    async fn get_handler(&self, device_name: &str) -> Result<Box<dyn DeviceHandler>, CheckError> {
        let inventory = Inventory::load(&self.inventory_path)?;
        let target = inventory.devices.get(device_name).cloned().ok_or_else(|| {
            CheckError::invalid_config(format!("Device not found in inventory: {}", device_name))
        })?;
        Ok(Box::new(SshDeviceHandler::new(
            self.logger.clone(),
            device_name,
            target,
        )))
    }
}

/// Terminal session to one device. The session mutex keeps commands strictly
/// sequential.
pub struct SshDeviceHandler {
    logger: Logger,
    device_name: String,
    target: SshTarget,
    session: Arc<Mutex<Option<Session>>>,
}

impl SshDeviceHandler {
    pub fn new(logger: Logger, device_name: &str, target: SshTarget) -> Self {
        Self {
            logger: logger.child(device_name),
            device_name: device_name.to_string(),
            target,
            session: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_session<F, T>(&self, label: &'static str, handler: F) -> Result<T, CheckError>
    where
        F: FnOnce(&Session) -> Result<T, CheckError> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let guard = session.lock().unwrap_or_else(|err| err.into_inner());
            let session = guard
                .as_ref()
                .ok_or_else(|| CheckError::connection("SSH session is not connected"))?;
            handler(session)
        })
        .await
        .map_err(|_| CheckError::unclassified(format!("SSH {} task failed", label)))?
    }
}

#[async_trait]
impl DeviceHandler for SshDeviceHandler {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn platform(&self) -> Platform {
        self.target.platform.clone()
    }

    async fn connect(&self, mode: AccessMode) -> Result<(), CheckError> {
        let target = self.target.clone();
        let session = tokio::task::spawn_blocking(move || connect_session(&target))
            .await
            .map_err(|_| CheckError::unclassified("SSH connect task failed"))??;
        *self.session.lock().unwrap_or_else(|err| err.into_inner()) = Some(session);
        self.logger.info(
            "Connected",
            Some(&serde_json::json!({
                "host": self.target.host,
                "port": self.target.port,
                "mode": mode,
            })),
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CheckError> {
        let taken = self
            .session
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(session) = taken {
            session
                .disconnect(None, "warm-reboot check finished", None)
                .map_err(map_ssh_error)?;
        }
        Ok(())
    }

    async fn send_command(
        &self,
        command: &str,
        budget: Option<CommandBudget>,
    ) -> Result<String, CheckError> {
        let budget = budget.unwrap_or_default();
        let command = command.to_string();
        self.logger.debug(
            "send_command",
            Some(&serde_json::json!({
                "command": command,
                "timeout_ms": budget.timeout().as_millis() as u64,
            })),
        );
        self.with_session("exec", move |session| {
            exec_blocking(session, &command, budget)
        })
        .await
    }

    async fn running_os_version(&self) -> Result<String, CheckError> {
        let output = self.send_command("show version", None).await?;
        parse_sonic_version(&output).ok_or_else(|| {
            CheckError::unclassified("SONiC Software Version not found in show version output")
        })
    }

    fn os_version(&self) -> Option<String> {
        self.target.os_version.clone()
    }

    async fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CheckError> {
        let local_clone = local_path.to_path_buf();
        let remote_clone = remote_path.to_string();
        self.with_session("sftp", move |session| {
            let sftp = session.sftp().map_err(map_ssh_error)?;
            let mut local_file = fs::File::open(&local_clone).map_err(|err| {
                CheckError::transfer_failure(format!(
                    "{} must be readable: {}",
                    local_clone.display(),
                    err
                ))
            })?;
            let mut remote_file = sftp
                .open_mode(
                    Path::new(&remote_clone),
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                    0o644,
                    OpenType::File,
                )
                .map_err(map_ssh_error)?;
            std::io::copy(&mut local_file, &mut remote_file)
                .map_err(|err| CheckError::transfer_failure(err.to_string()))?;
            Ok(())
        })
        .await?;
        self.logger.info(
            &format!("Successfully transferred {}", local_path.display()),
            Some(&serde_json::json!({ "remote_path": remote_path })),
        );
        Ok(())
    }
}

pub fn parse_sonic_version(show_version: &str) -> Option<String> {
    SONIC_VERSION_RE
        .captures(show_version)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn connect_session(target: &SshTarget) -> Result<Session, CheckError> {
    let addr = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|err| CheckError::invalid_config(format!("Invalid SSH host/port: {}", err)))?
        .next()
        .ok_or_else(|| CheckError::invalid_config("Invalid SSH host/port"))?;
    let ready = Duration::from_millis(target.ready_timeout_ms);
    let tcp = TcpStream::connect_timeout(&addr, ready)
        .map_err(|err| CheckError::connection(format!("Failed to connect SSH: {}", err)))?;
    tcp.set_read_timeout(Some(ready)).ok();
    tcp.set_write_timeout(Some(ready)).ok();

    let mut session =
        Session::new().map_err(|_| CheckError::connection("Failed to create SSH session"))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(map_ssh_error)?;

    if let Some(key_path) = target.private_key_path.as_ref() {
        session
            .userauth_pubkey_file(
                &target.username,
                None,
                key_path,
                target.passphrase.as_deref(),
            )
            .map_err(map_ssh_error)?;
    } else if let Some(password) = target.password.as_ref() {
        session
            .userauth_password(&target.username, password)
            .map_err(map_ssh_error)?;
    }

    if !session.authenticated() {
        return Err(CheckError::connection("SSH authentication failed"));
    }
    let interval = std::cmp::max(1, (target.keepalive_interval_ms / 1000) as u32);
    session.set_keepalive(true, interval);
    // Long-running scripts are bounded by the command budget, not the socket.
    session.set_timeout(0);

    Ok(session)
}

/// Runs one command and returns stderr followed by stdout, the way a terminal
/// would show both. Exceeding the budget is a channel error.
fn exec_blocking(
    session: &Session,
    command: &str,
    budget: CommandBudget,
) -> Result<String, CheckError> {
    let mut channel = session.channel_session().map_err(map_ssh_error)?;
    channel.exec(command).map_err(map_ssh_error)?;
    session.set_blocking(false);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut stderr_stream = channel.stderr();
    let started = Instant::now();
    let timeout = budget.timeout();
    let mut timed_out = false;
    let mut read_error = None;

    loop {
        let mut progressed = false;
        let mut buf = [0u8; 8192];
        match channel.read(&mut buf) {
            Ok(n) if n > 0 => {
                stdout.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => {
                read_error = Some(format!("SSH stdout read failed: {}", err));
                break;
            }
        }
        match stderr_stream.read(&mut buf) {
            Ok(n) if n > 0 => {
                stderr.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => {
                read_error = Some(format!("SSH stderr read failed: {}", err));
                break;
            }
        }

        if channel.eof() {
            break;
        }
        if started.elapsed() > timeout {
            timed_out = true;
            break;
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    if timed_out || read_error.is_some() {
        let _ = channel.close();
        let deadline =
            Instant::now() + Duration::from_millis(network_constants::TIMEOUT_SSH_EXEC_HARD_GRACE_MS);
        while Instant::now() < deadline && !channel.eof() {
            std::thread::sleep(Duration::from_millis(20));
        }
    }
    session.set_blocking(true);

    if let Some(message) = read_error {
        return Err(CheckError::execution_channel(message));
    }
    if timed_out {
        return Err(CheckError::execution_channel(format!(
            "Command did not complete within {} loops (delay factor {}): {}",
            budget.max_loops, budget.delay_factor, command
        ))
        .with_details(serde_json::json!({
            "timeout_ms": timeout.as_millis() as u64,
            "captured": String::from_utf8_lossy(&stdout),
        })));
    }

    let _ = channel.wait_close();
    Ok(merge_streams(&stdout, &stderr))
}

/// Stderr leads: `sudo` warnings are printed before the command runs, and the
/// command's own output must stay at the tail.
fn merge_streams(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stderr).into_owned();
    if !output.is_empty() && !stdout.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(&String::from_utf8_lossy(stdout));
    output
}

fn map_ssh_error(err: ssh2::Error) -> CheckError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => CheckError::execution_channel("SSH operation timed out"),
        _ => CheckError::connection(format!("SSH error: {}", io_err)),
    }
}
