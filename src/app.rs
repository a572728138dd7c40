use crate::errors::CheckError;
use crate::managers::checker::WarmrebootChecker;
use crate::managers::ssh::SshHandlerProvider;
use crate::services::catalog::{DirectoryScriptSource, ScriptMapping, ScriptSource};
use crate::services::change_record::JsonlChangeLedger;
use crate::services::device::{AccessMode, HandlerFileTransfer};
use crate::services::logger::Logger;
use crate::services::result_log::JsonlResultLog;
use crate::services::settings::CheckerSettings;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static SHARED_APP: OnceCell<App> = OnceCell::new();

pub struct App {
    pub logger: Logger,
    pub settings: CheckerSettings,
    pub scripts: Arc<ScriptMapping>,
    pub results: Arc<JsonlResultLog>,
    pub checker: Arc<WarmrebootChecker>,
}

impl App {
    pub fn initialize() -> Result<Self, CheckError> {
        Self::with_settings(Logger::new("warmreboot"), CheckerSettings::from_env())
    }

    /// Process-wide instance built from the environment on first use. The
    /// script folder is scanned once; later calls reuse the same mapping.
    pub fn shared() -> Result<&'static App, CheckError> {
        SHARED_APP.get_or_try_init(Self::initialize)
    }

    /// Scans the script folder and wires the SSH-backed collaborators.
    pub fn with_settings(logger: Logger, settings: CheckerSettings) -> Result<Self, CheckError> {
        let source = DirectoryScriptSource::new(
            logger.clone(),
            settings.script_dir.clone(),
            &settings.helper_script,
        );
        let scripts = Arc::new(source.load()?);
        logger.debug(
            "Script catalog ready",
            Some(&serde_json::json!({
                "script_dir": scripts.script_dir().display().to_string(),
                "helper": scripts.helper_name(),
                "versions": scripts.supported_versions(),
            })),
        );

        let results = Arc::new(JsonlResultLog::new(logger.clone()));
        let checker = Arc::new(WarmrebootChecker::new(
            logger.clone(),
            settings.clone(),
            scripts.clone(),
            Arc::new(SshHandlerProvider::new(logger.clone())),
            Arc::new(HandlerFileTransfer),
            Arc::new(JsonlChangeLedger::new(logger.clone())),
            results.clone(),
        ));

        Ok(Self {
            logger,
            settings,
            scripts,
            results,
            checker,
        })
    }
}

/// Entry point for task runners: `true` means the device is safe to warm-reboot.
pub async fn run_warmreboot_blocker_check(device_name: &str, read_write: bool) -> bool {
    let app = match App::shared() {
        Ok(app) => app,
        Err(err) => {
            Logger::new("warmreboot").error(
                &format!("Failed to initialize checker: {}", err),
                Some(&serde_json::json!({ "device": device_name, "error": err })),
            );
            return false;
        }
    };
    app.checker
        .run(device_name, AccessMode::from_read_write(read_write), None)
        .await
}
