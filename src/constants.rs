pub const TASK_NAME: &str = "sonic_warmreboot_blocker_checker";

pub mod remote {
    pub const DEFAULT_REMOTE_DIR: &str = "/tmp";
    pub const RESULTS_JSON_PATH: &str = "/tmp/exit_check_validation_results.json";
    pub const HELPER_SCRIPT_NAME: &str = "exit_check_common.sh";
    /// Marker printed by `cat` when the results file was never written.
    pub const MISSING_FILE_ERROR: &str = "No such file or directory";
}

pub mod scripts {
    pub const SCRIPT_FOLDER: &str = "sonic_warmreboot_blocker_checker";
}

pub mod budget {
    /// Base sleep between read cycles, scaled by the delay factor.
    pub const LOOP_DELAY_MS: u64 = 200;
    pub const DEFAULT_MAX_LOOPS: u64 = 500;
    pub const DEFAULT_DELAY_FACTOR: u64 = 1;
    pub const EXEC_MAX_LOOPS: u64 = 600;
    pub const EXEC_DELAY_FACTOR: u64 = 10;
}

pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_READY_MS: u64 = 10_000;
    pub const KEEPALIVE_INTERVAL_MS: u64 = 30_000;
    pub const TIMEOUT_SSH_EXEC_HARD_GRACE_MS: u64 = 2_000;
}

pub mod change {
    pub const DEFAULT_TICKET_ID: &str = "711199096";
    pub const DEFAULT_DURATION_MINS: i64 = 3;
    pub const DEFAULT_RISK: &str = "Low";
    pub const DEFAULT_SERVICE_NAME: &str = "PhyNet\\Change Management";
    pub const DESCRIPTION: &str =
        "Execute version-specific exit check scripts to validate warm-reboot readiness";
}

pub mod limits {
    pub const LOG_OUTPUT_BYTES: usize = 16 * 1024;
}
