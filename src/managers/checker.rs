//! Warm-reboot blocker check for one device.
//!
//! The flow is validate → select script → transfer → execute → read results →
//! cleanup. Failures before execution abort the check. Once the script has
//! been started, every later step runs regardless of how the previous one
//! went: a script that timed out on the channel may still have written its
//! results file, and the device must always be left clean.

use crate::constants::TASK_NAME;
use crate::errors::{CheckError, CheckErrorKind};
use crate::services::catalog::ScriptMapping;
use crate::services::change_record::{ChangeEntry, ChangeRecordSink, ChangeState, ChangeWindow};
use crate::services::device::{AccessMode, DeviceHandler, FileTransfer, HandlerProvider};
use crate::services::logger::Logger;
use crate::services::report::{extract_report, Verdict};
use crate::services::result_log::ResultSink;
use crate::services::settings::CheckerSettings;
use crate::utils::paths::remote_join;
use crate::utils::text::{clip_for_log, display_request_id};
use crate::utils::version::{resolve_version_key, VersionKey};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStage {
    Start,
    Validated,
    ScriptSelected,
    Transferred,
    Executed,
    ResultsParsed,
    CleanedUp,
    Done,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub success: bool,
    pub stage: CheckStage,
    pub verdict: Option<Verdict>,
    /// Every classified error seen during the run, fatal or not, in order.
    pub errors: Vec<CheckErrorKind>,
}

/// Result of the execute step. A channel error does not end the check.
enum ExecutionStatus {
    Completed(String),
    ChannelError(CheckError),
}

struct Run<'a> {
    device: &'a str,
    request_id: Option<&'a str>,
    stage: CheckStage,
    errors: Vec<CheckErrorKind>,
}

impl<'a> Run<'a> {
    fn meta(&self) -> Value {
        serde_json::json!({
            "device": self.device,
            "task": TASK_NAME,
            "request_id": self.request_id,
            "stage": self.stage,
        })
    }
}

pub struct WarmrebootChecker {
    logger: Logger,
    settings: CheckerSettings,
    scripts: Arc<ScriptMapping>,
    handlers: Arc<dyn HandlerProvider>,
    transfer: Arc<dyn FileTransfer>,
    change_records: Arc<dyn ChangeRecordSink>,
    results: Arc<dyn ResultSink>,
}

impl WarmrebootChecker {
    pub fn new(
        logger: Logger,
        settings: CheckerSettings,
        scripts: Arc<ScriptMapping>,
        handlers: Arc<dyn HandlerProvider>,
        transfer: Arc<dyn FileTransfer>,
        change_records: Arc<dyn ChangeRecordSink>,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            logger: logger.child("checker"),
            settings,
            scripts,
            handlers,
            transfer,
            change_records,
            results,
        }
    }

    /// `true` only when the device script reported `PASSED`.
    pub async fn run(&self, device_name: &str, mode: AccessMode, request_id: Option<&str>) -> bool {
        self.check(device_name, mode, request_id).await.success
    }

    pub async fn check(
        &self,
        device_name: &str,
        mode: AccessMode,
        request_id: Option<&str>,
    ) -> CheckOutcome {
        let mut run = Run {
            device: device_name,
            request_id,
            stage: CheckStage::Start,
            errors: Vec::new(),
        };
        self.log_info(&run, &format!("Starting {} for device {}", TASK_NAME, device_name));

        let handler = match self.handlers.get_handler(device_name).await {
            Ok(handler) => {
                self.log_info(
                    &run,
                    &format!(
                        "Acquired {:?} handler for {}",
                        handler.platform(),
                        handler.device_name()
                    ),
                );
                handler
            }
            Err(err) => {
                self.log_unclassified(&mut run, &err);
                return self.finish(run, None);
            }
        };

        let verdict = match self.drive(&mut run, handler.as_ref(), mode).await {
            Ok(verdict) => Some(verdict),
            Err(err) => {
                if err.kind.aborts_flow() {
                    run.errors.push(err.kind);
                } else {
                    self.log_unclassified(&mut run, &err);
                }
                None
            }
        };

        if let Err(err) = handler.disconnect().await {
            self.logger.debug(
                &format!("Ignoring disconnect failure: {}", err),
                Some(&run.meta()),
            );
        }
        self.finish(run, verdict)
    }

    fn finish(&self, mut run: Run<'_>, verdict: Option<Verdict>) -> CheckOutcome {
        run.stage = if verdict.is_some() {
            CheckStage::Done
        } else {
            CheckStage::Aborted
        };
        self.logger.debug("Check finished", Some(&run.meta()));
        CheckOutcome {
            success: verdict.as_ref().map(|v| v.success).unwrap_or(false),
            stage: run.stage,
            verdict,
            errors: run.errors,
        }
    }

    async fn drive(
        &self,
        run: &mut Run<'_>,
        handler: &dyn DeviceHandler,
        mode: AccessMode,
    ) -> Result<Verdict, CheckError> {
        handler.connect(mode).await?;

        let version = self.validate(run, handler).await.map_err(|err| {
            self.record(run, "Device validation failed or unsupported version");
            err
        })?;
        self.advance(run, CheckStage::Validated);

        let script = self.select_script(run, &version).map_err(|err| {
            self.record(run, "Failed to select appropriate script");
            err
        })?;
        self.advance(run, CheckStage::ScriptSelected);

        let change_window = self.open_change(run);
        let result = self.run_script(run, handler, &script).await;
        if let Ok(verdict) = &result {
            let message = if verdict.success {
                format!("Successfully executed {} for version {}", script, version)
            } else {
                format!("Failed to execute {}", script)
            };
            self.record(run, &message);
        }
        self.close_change(run, change_window);
        result
    }

    async fn validate(
        &self,
        run: &mut Run<'_>,
        handler: &dyn DeviceHandler,
    ) -> Result<VersionKey, CheckError> {
        if !handler.platform().is_sonic() {
            let message = "Unexpected device OS type. Only SONiC is supported.";
            self.log_result(run, message);
            return Err(CheckError::device_type_unsupported(message)
                .with_details(serde_json::json!({ "platform": handler.platform() })));
        }

        let os_version = match handler.running_os_version().await {
            Ok(version) => version,
            Err(err) => {
                self.logger.warn(
                    &format!(
                        "Failed to get the running OS version of the device, using inventory data: {}",
                        err
                    ),
                    Some(&run.meta()),
                );
                handler.os_version().unwrap_or_default()
            }
        };
        self.log_info(run, &format!("Device OS version detected: {}", os_version));

        let Some(version) = resolve_version_key(&os_version) else {
            let message = format!("Unable to parse version from OS version string: {}", os_version);
            self.log_result_err(run, &message);
            return Err(CheckError::version_unparseable(message));
        };
        self.log_info(run, &format!("Matched version key: {}", version));
        Ok(version)
    }

    fn select_script(&self, run: &Run<'_>, version: &VersionKey) -> Result<String, CheckError> {
        let Some(script) = self.scripts.script_for(version) else {
            let message = format!(
                "Unsupported OS version: {}. Supported versions: {:?}",
                version,
                self.scripts.supported_versions()
            );
            self.log_result_err(run, &message);
            return Err(CheckError::version_unsupported(message));
        };
        self.log_info(run, &format!("Selected script: {}", script));
        Ok(script.to_string())
    }

    /// Everything inside the change window: transfer, execute, read, cleanup.
    async fn run_script(
        &self,
        run: &mut Run<'_>,
        handler: &dyn DeviceHandler,
        script: &str,
    ) -> Result<Verdict, CheckError> {
        self.transfer_scripts(run, handler, script).await?;
        self.advance(run, CheckStage::Transferred);

        match self.execute(run, handler, script).await {
            ExecutionStatus::Completed(output) => {
                self.log_info(
                    run,
                    &format!(
                        "Script output: {}",
                        clip_for_log(&output, crate::constants::limits::LOG_OUTPUT_BYTES)
                    ),
                );
            }
            ExecutionStatus::ChannelError(err) => {
                run.errors.push(CheckErrorKind::ExecutionChannelError);
                self.log_result_err(
                    run,
                    &format!("Executing bash script failed with exception: {}", err),
                );
                self.log_info(run, "Continuing to read the results file after execution error");
            }
        }
        self.advance(run, CheckStage::Executed);

        let verdict = self.read_results(run, handler).await;
        self.report_script_outcome(run, script, &verdict);
        self.advance(run, CheckStage::ResultsParsed);

        self.cleanup(run, handler, script).await;
        self.advance(run, CheckStage::CleanedUp);
        Ok(verdict)
    }

    async fn transfer_scripts(
        &self,
        run: &mut Run<'_>,
        handler: &dyn DeviceHandler,
        script: &str,
    ) -> Result<(), CheckError> {
        let source_path = self.scripts.script_path(script);
        if !source_path.is_file() {
            let message = format!("Script file not found at: {}", source_path.display());
            self.log_result_err(run, &message);
            return Err(CheckError::script_asset_missing(message));
        }
        let helper_path = self.scripts.helper_path();
        if !helper_path.is_file() {
            let message = format!("Common script file not found at: {}", helper_path.display());
            self.log_result_err(run, &message);
            return Err(CheckError::script_asset_missing(message));
        }

        for name in [script, self.scripts.helper_name()] {
            let command = format!("sudo rm -f {}", self.remote_path(name));
            if let Err(err) = handler.send_command(&command, None).await {
                self.logger.warn(
                    &format!("Stale script removal failed: {}", err),
                    Some(&run.meta()),
                );
            }
        }

        if let Err(err) = self
            .transfer
            .transfer_files(handler, &[source_path, helper_path], &self.settings.remote_dir)
            .await
        {
            self.log_result_err(run, &format!("SCP transfer failed with exception: {}", err));
            return Err(err.reclassify(CheckErrorKind::TransferFailure));
        }
        self.logger.info(
            &format!(
                "Successfully transferred {} and {} to device",
                script,
                self.scripts.helper_name()
            ),
            Some(&run.meta()),
        );
        Ok(())
    }

    async fn execute(
        &self,
        run: &Run<'_>,
        handler: &dyn DeviceHandler,
        script: &str,
    ) -> ExecutionStatus {
        let script_path = self.remote_path(script);
        let helper_path = self.remote_path(self.scripts.helper_name());
        let steps = [
            ("Making script executable", format!("sudo chmod +x {}", script_path)),
            (
                "Making common script executable",
                format!("sudo chmod +x {}", helper_path),
            ),
            (
                "Removing old results file if exists",
                format!("sudo rm -f {}", self.settings.results_path),
            ),
        ];
        for (label, command) in steps {
            self.log_info(run, label);
            if let Err(err) = handler.send_command(&command, None).await {
                return ExecutionStatus::ChannelError(err);
            }
        }

        let command = format!("sudo bash {}", script_path);
        self.log_info(run, &format!("Executing bash script: {}", command));
        match handler
            .send_command(&command, Some(self.settings.exec_budget))
            .await
        {
            Ok(output) => ExecutionStatus::Completed(output),
            Err(err) => ExecutionStatus::ChannelError(err),
        }
    }

    async fn read_results(&self, run: &mut Run<'_>, handler: &dyn DeviceHandler) -> Verdict {
        let path = &self.settings.results_path;
        self.log_info(run, &format!("Reading results from {}", path));
        let raw = match handler.send_command(&format!("sudo cat {}", path), None).await {
            Ok(raw) => raw,
            Err(err) => {
                run.errors.push(CheckErrorKind::ExecutionChannelError);
                self.log_result_err(run, &format!("Failed to read results file: {}", err));
                return Verdict::failed();
            }
        };

        let report = match extract_report(&raw) {
            Ok(report) => report,
            Err(err) => {
                run.errors.push(err.kind);
                let message = match err.kind {
                    CheckErrorKind::ResultsFileMissing => {
                        format!("Results file not found: {}", path)
                    }
                    _ => err.message.clone(),
                };
                self.log_result_err(run, &message);
                return Verdict::failed();
            }
        };

        let pretty = serde_json::to_string_pretty(&report.raw).unwrap_or_default();
        self.log_info(run, &format!("Parsed results: {}", pretty));
        self.log_result(run, &report.summary());
        let details = report.failure_details();
        if !details.is_empty() {
            let lines = details
                .iter()
                .map(|line| format!("  - {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            self.log_result_err(
                run,
                &format!(
                    "Exit check failed with {} failure(s):\n{}",
                    report.total_failures, lines
                ),
            );
        }
        Verdict::classify(report)
    }

    fn report_script_outcome(&self, run: &Run<'_>, script: &str, verdict: &Verdict) {
        let results = verdict.report_json().map(|json| json.to_string());
        match (verdict.success, results) {
            (true, Some(json)) => self.log_result(
                run,
                &format!(
                    "Bash script {} successfully completed with PASSED status. Results: {}",
                    script, json
                ),
            ),
            (true, None) => self.logger.info(
                &format!("Bash script {} successfully completed with PASSED status", script),
                Some(&run.meta()),
            ),
            (false, Some(json)) => self.log_result_err(
                run,
                &format!(
                    "Bash script {} completed with FAILED status. Results: {}",
                    script, json
                ),
            ),
            (false, None) => self.log_result_err(
                run,
                &format!("Bash script {} completed with FAILED status", script),
            ),
        }
    }

    /// Removes the script, helper and results file. Each removal is attempted
    /// even if an earlier one failed.
    async fn cleanup(&self, run: &mut Run<'_>, handler: &dyn DeviceHandler, script: &str) {
        let targets = [
            ("script", self.remote_path(script)),
            ("common script", self.remote_path(self.scripts.helper_name())),
            ("results file", self.settings.results_path.clone()),
        ];
        let mut failed = 0usize;
        for (label, path) in targets {
            let command = format!("sudo rm -f {}", path);
            self.log_info(run, &format!("Cleaning up {}: {}", label, command));
            if let Err(err) = handler.send_command(&command, None).await {
                failed += 1;
                let err =
                    CheckError::cleanup_failure(format!("Failed to cleanup {}: {}", path, err));
                run.errors.push(err.kind);
                self.log_result_err(run, &err.message);
            }
        }
        if failed == 0 {
            self.log_info(
                run,
                &format!(
                    "Successfully cleaned up {}, {} and results file",
                    script,
                    self.scripts.helper_name()
                ),
            );
        }
    }

    fn open_change(&self, run: &mut Run<'_>) -> Option<ChangeWindow> {
        let window = ChangeWindow::starting_now(self.settings.change.duration_mins);
        let entry = ChangeEntry::new(
            run.device,
            TASK_NAME,
            &self.settings.change,
            &window,
            ChangeState::ChangeInProcess,
        );
        match self.change_records.record_change(&entry) {
            Ok(true) => Some(window),
            Ok(false) => {
                run.errors.push(CheckErrorKind::ChangeRecordFailure);
                self.log_result_err(
                    run,
                    &format!(
                        "Failed to create change entry for device:{}. task_name:{}",
                        run.device, TASK_NAME
                    ),
                );
                None
            }
            Err(err) => {
                run.errors.push(CheckErrorKind::ChangeRecordFailure);
                self.log_result_err(
                    run,
                    &format!(
                        "Failed to create change entry for device:{}. task_name:{}: {}",
                        run.device, TASK_NAME, err
                    ),
                );
                None
            }
        }
    }

    fn close_change(&self, run: &mut Run<'_>, window: Option<ChangeWindow>) {
        let Some(window) = window else {
            self.logger.info(
                &format!(
                    "Change entry was not created for device:{}. task_name:{}. Ignore closing of change entry",
                    run.device, TASK_NAME
                ),
                Some(&run.meta()),
            );
            return;
        };
        let entry = ChangeEntry::new(
            run.device,
            TASK_NAME,
            &self.settings.change,
            &window,
            ChangeState::Completed,
        );
        match self.change_records.record_change(&entry) {
            Ok(true) => self.logger.info(
                &format!(
                    "Completion change entry created for device:{}. task_name:{}",
                    run.device, TASK_NAME
                ),
                Some(&run.meta()),
            ),
            Ok(false) => {
                run.errors.push(CheckErrorKind::ChangeRecordFailure);
                self.log_result_err(
                    run,
                    &format!(
                        "Failed to close change entry for device:{}. task_name:{}",
                        run.device, TASK_NAME
                    ),
                );
            }
            Err(err) => {
                run.errors.push(CheckErrorKind::ChangeRecordFailure);
                self.logger.error(
                    &format!("Exception hit closing change entry: {}: {}", run.device, err),
                    Some(&run.meta()),
                );
            }
        }
    }

    fn advance(&self, run: &mut Run<'_>, stage: CheckStage) {
        run.stage = stage;
        self.logger.debug("Stage reached", Some(&run.meta()));
    }

    fn remote_path(&self, file_name: &str) -> String {
        remote_join(&self.settings.remote_dir, file_name)
    }

    fn log_unclassified(&self, run: &mut Run<'_>, err: &CheckError) {
        run.errors.push(CheckErrorKind::Unclassified);
        self.logger.error(
            &format!(
                "{}, {}, {} failed with exception: {}",
                run.device,
                TASK_NAME,
                display_request_id(run.request_id),
                err
            ),
            Some(&serde_json::json!({ "error": err, "meta": run.meta() })),
        );
        self.record(run, &format!("Task failed with exception: {}", err));
    }

    fn log_info(&self, run: &Run<'_>, message: &str) {
        self.logger
            .scoped(run.device, run.request_id)
            .info(message, None);
    }

    fn log_result(&self, run: &Run<'_>, message: &str) {
        self.logger.info(message, Some(&run.meta()));
        self.record(run, message);
    }

    fn log_result_err(&self, run: &Run<'_>, message: &str) {
        self.logger.error(message, Some(&run.meta()));
        self.record(run, message);
    }

    /// Writes to the durable result trail. A failed write is logged and dropped.
    fn record(&self, run: &Run<'_>, message: &str) {
        if let Err(err) = self
            .results
            .record_result(run.device, TASK_NAME, run.request_id, message)
        {
            self.logger.warn(
                &format!("Result sink write failed: {}", err),
                Some(&run.meta()),
            );
        }
    }
}
