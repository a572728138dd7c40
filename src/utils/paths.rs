use crate::constants::scripts::SCRIPT_FOLDER;
use std::env;
use std::path::{Path, PathBuf};

pub(crate) fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" || lowered == "none" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_STATE_HOME").ok()) {
        return Some(path);
    }
    resolve_home_dir().map(|home| home.join(".local").join("state"))
}

fn resolve_entry_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
}

pub fn resolve_state_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("WARMREBOOT_STATE_DIR").ok()) {
        return path;
    }
    if let Some(path) = resolve_xdg_state_dir() {
        return path.join("warmreboot-checker");
    }
    resolve_entry_dir().unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

pub fn resolve_results_log_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("WARMREBOOT_RESULTS_LOG_PATH").ok()) {
        return path;
    }
    resolve_state_dir().join("results.jsonl")
}

pub fn resolve_change_ledger_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("WARMREBOOT_CHANGE_LEDGER_PATH").ok()) {
        return path;
    }
    resolve_state_dir().join("change_records.jsonl")
}

pub fn resolve_inventory_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("WARMREBOOT_INVENTORY_PATH").ok()) {
        return path;
    }
    resolve_state_dir().join("inventory.json")
}

/// Script folder lookup order: explicit env, next to the binary, then the
/// working directory.
pub fn resolve_script_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("WARMREBOOT_SCRIPT_DIR").ok()) {
        return path;
    }
    let mut candidates = Vec::new();
    if let Some(entry) = resolve_entry_dir() {
        candidates.push(entry.join("changes").join(SCRIPT_FOLDER));
        candidates.push(entry.join("..").join("changes").join(SCRIPT_FOLDER));
    }
    candidates.push(PathBuf::from("changes").join(SCRIPT_FOLDER));
    for candidate in &candidates {
        if candidate.is_dir() {
            return candidate.clone();
        }
    }
    PathBuf::from("changes").join(SCRIPT_FOLDER)
}

pub fn ensure_dir_for_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Joins a file name onto a remote POSIX directory.
pub fn remote_join(dir: &str, file_name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, file_name)
    } else {
        format!("{}/{}", dir, file_name)
    }
}
