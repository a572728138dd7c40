use crate::constants::{budget, change, remote};
use crate::services::device::CommandBudget;
use crate::utils::paths::resolve_script_dir;
use std::path::PathBuf;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_positive<T: std::str::FromStr + PartialOrd + Default>(key: &str) -> Option<T> {
    env_string(key)
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSettings {
    pub ticket_id: String,
    pub duration_mins: i64,
    pub risk: String,
    pub service_name: String,
}

impl ChangeSettings {
    pub fn from_env() -> Self {
        Self {
            ticket_id: env_string("WARMREBOOT_CHANGE_TICKET")
                .unwrap_or_else(|| change::DEFAULT_TICKET_ID.to_string()),
            duration_mins: env_positive("WARMREBOOT_CHANGE_DURATION_MINS")
                .unwrap_or(change::DEFAULT_DURATION_MINS),
            risk: env_string("WARMREBOOT_CHANGE_RISK")
                .unwrap_or_else(|| change::DEFAULT_RISK.to_string()),
            service_name: env_string("WARMREBOOT_CHANGE_SERVICE")
                .unwrap_or_else(|| change::DEFAULT_SERVICE_NAME.to_string()),
        }
    }
}

impl Default for ChangeSettings {
    fn default() -> Self {
        Self {
            ticket_id: change::DEFAULT_TICKET_ID.to_string(),
            duration_mins: change::DEFAULT_DURATION_MINS,
            risk: change::DEFAULT_RISK.to_string(),
            service_name: change::DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerSettings {
    pub script_dir: PathBuf,
    pub remote_dir: String,
    pub results_path: String,
    pub helper_script: String,
    pub exec_budget: CommandBudget,
    pub change: ChangeSettings,
}

impl CheckerSettings {
    pub fn from_env() -> Self {
        let exec_budget = CommandBudget::new(
            env_positive("WARMREBOOT_EXEC_MAX_LOOPS").unwrap_or(budget::EXEC_MAX_LOOPS),
            env_positive("WARMREBOOT_EXEC_DELAY_FACTOR").unwrap_or(budget::EXEC_DELAY_FACTOR),
        );
        Self {
            script_dir: resolve_script_dir(),
            remote_dir: env_string("WARMREBOOT_REMOTE_DIR")
                .unwrap_or_else(|| remote::DEFAULT_REMOTE_DIR.to_string()),
            results_path: env_string("WARMREBOOT_RESULTS_PATH")
                .unwrap_or_else(|| remote::RESULTS_JSON_PATH.to_string()),
            helper_script: env_string("WARMREBOOT_HELPER_SCRIPT")
                .unwrap_or_else(|| remote::HELPER_SCRIPT_NAME.to_string()),
            exec_budget,
            change: ChangeSettings::from_env(),
        }
    }

    pub fn with_script_dir(mut self, script_dir: impl Into<PathBuf>) -> Self {
        self.script_dir = script_dir.into();
        self
    }
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("changes").join(crate::constants::scripts::SCRIPT_FOLDER),
            remote_dir: remote::DEFAULT_REMOTE_DIR.to_string(),
            results_path: remote::RESULTS_JSON_PATH.to_string(),
            helper_script: remote::HELPER_SCRIPT_NAME.to_string(),
            exec_budget: CommandBudget::new(budget::EXEC_MAX_LOOPS, budget::EXEC_DELAY_FACTOR),
            change: ChangeSettings::default(),
        }
    }
}
