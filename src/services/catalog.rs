use crate::errors::CheckError;
use crate::services::logger::Logger;
use crate::utils::version::VersionKey;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

static SCRIPT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^exit_check_(\d{6})\.([A-Za-z0-9]+)$").expect("script name regex")
});

/// Version to script mapping for one script folder. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScriptMapping {
    script_dir: PathBuf,
    helper_name: String,
    scripts: BTreeMap<VersionKey, String>,
}

impl ScriptMapping {
    pub fn from_entries<I, S>(script_dir: impl Into<PathBuf>, helper_name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (VersionKey, S)>,
        S: Into<String>,
    {
        Self {
            script_dir: script_dir.into(),
            helper_name: helper_name.to_string(),
            scripts: entries
                .into_iter()
                .map(|(key, name)| (key, name.into()))
                .collect(),
        }
    }

    pub fn script_for(&self, version: &VersionKey) -> Option<&str> {
        self.scripts.get(version).map(|s| s.as_str())
    }

    pub fn supported_versions(&self) -> Vec<String> {
        self.scripts.keys().map(|k| k.to_string()).collect()
    }

    pub fn script_path(&self, script_name: &str) -> PathBuf {
        self.script_dir.join(script_name)
    }

    pub fn helper_name(&self) -> &str {
        &self.helper_name
    }

    pub fn helper_path(&self) -> PathBuf {
        self.script_dir.join(&self.helper_name)
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Produces the mapping handed to the checker at startup.
pub trait ScriptSource: Send + Sync {
    fn load(&self) -> Result<ScriptMapping, CheckError>;
}

/// Parses `exit_check_<6 digits>.<ext>` into its version key.
pub fn parse_script_file_name(file_name: &str) -> Option<VersionKey> {
    let caps = SCRIPT_NAME_RE.captures(file_name)?;
    VersionKey::parse_exact(caps.get(1)?.as_str())
}

pub struct DirectoryScriptSource {
    logger: Logger,
    script_dir: PathBuf,
    helper_name: String,
}

impl DirectoryScriptSource {
    pub fn new(logger: Logger, script_dir: impl Into<PathBuf>, helper_name: &str) -> Self {
        Self {
            logger: logger.child("catalog"),
            script_dir: script_dir.into(),
            helper_name: helper_name.to_string(),
        }
    }
}

impl ScriptSource for DirectoryScriptSource {
    fn load(&self) -> Result<ScriptMapping, CheckError> {
        let mut scripts: BTreeMap<VersionKey, String> = BTreeMap::new();
        if self.script_dir.is_dir() {
            for entry in walkdir::WalkDir::new(&self.script_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                let Some(version) = parse_script_file_name(name) else {
                    continue;
                };
                if let Some(existing) = scripts.get(&version) {
                    self.logger.warn(
                        "Duplicate exit check script for version, keeping first",
                        Some(&serde_json::json!({
                            "version": version.as_str(),
                            "kept": existing,
                            "ignored": name,
                        })),
                    );
                    continue;
                }
                self.logger.info(
                    &format!("Found script mapping: {} -> {}", version, name),
                    None,
                );
                scripts.insert(version, name.to_string());
            }
        }

        let mapping = ScriptMapping::from_entries(&self.script_dir, &self.helper_name, scripts);
        if mapping.is_empty() {
            self.logger.warn(
                &format!(
                    "No exit check scripts found in {}. Check if the script directory exists and contains exit_check_*.sh files.",
                    self.script_dir.display()
                ),
                None,
            );
        } else {
            self.logger.info(
                &format!(
                    "Loaded exit check scripts for {} versions: {:?}",
                    mapping.len(),
                    mapping.supported_versions()
                ),
                None,
            );
        }
        Ok(mapping)
    }
}

/// Returns a prebuilt mapping, for callers that do not scan a directory.
pub struct FixedScriptSource {
    mapping: ScriptMapping,
}

impl FixedScriptSource {
    pub fn new(mapping: ScriptMapping) -> Self {
        Self { mapping }
    }
}

impl ScriptSource for FixedScriptSource {
    fn load(&self) -> Result<ScriptMapping, CheckError> {
        Ok(self.mapping.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    #[test]
    fn parse_script_file_name_matches_pattern() {
        assert_eq!(
            parse_script_file_name("exit_check_202405.sh").map(|k| k.to_string()),
            Some("202405".to_string())
        );
        assert_eq!(
            parse_script_file_name("exit_check_201811.py").map(|k| k.to_string()),
            Some("201811".to_string())
        );
        assert!(parse_script_file_name("exit_check_common.sh").is_none());
        assert!(parse_script_file_name("exit_check_2024050.sh").is_none());
        assert!(parse_script_file_name("old_exit_check_202405.sh").is_none());
    }

    #[test]
    fn directory_scan_builds_sorted_mapping() {
        let root = tmp_dir("warmreboot-catalog");
        fs::create_dir_all(&root).unwrap();
        for name in [
            "exit_check_202305.sh",
            "exit_check_201811.sh",
            "exit_check_common.sh",
            "README.md",
        ] {
            fs::write(root.join(name), "#!/bin/bash\n").unwrap();
        }
        fs::create_dir_all(root.join("exit_check_202405.sh")).unwrap();

        let source = DirectoryScriptSource::new(Logger::new("test"), &root, "exit_check_common.sh");
        let mapping = source.load().unwrap();

        assert_eq!(mapping.supported_versions(), vec!["201811", "202305"]);
        let key = VersionKey::parse_exact("202305").unwrap();
        assert_eq!(mapping.script_for(&key), Some("exit_check_202305.sh"));
        assert_eq!(mapping.helper_path(), root.join("exit_check_common.sh"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_directory_yields_empty_mapping() {
        let source = DirectoryScriptSource::new(
            Logger::new("test"),
            tmp_dir("warmreboot-missing"),
            "exit_check_common.sh",
        );
        let mapping = source.load().unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn fixed_source_serves_prebuilt_mapping() {
        let key = VersionKey::parse_exact("202012").unwrap();
        let mapping = ScriptMapping::from_entries(
            "/opt/checks",
            "exit_check_common.sh",
            [(key.clone(), "exit_check_202012.sh")],
        );
        let loaded = FixedScriptSource::new(mapping).load().unwrap();
        assert_eq!(loaded.script_for(&key), Some("exit_check_202012.sh"));
        assert_eq!(loaded.supported_versions(), vec!["202012".to_string()]);
        assert_eq!(
            loaded.helper_path(),
            PathBuf::from("/opt/checks/exit_check_common.sh")
        );
        assert_eq!(
            loaded.script_path("exit_check_202012.sh"),
            PathBuf::from("/opt/checks/exit_check_202012.sh")
        );
    }
}
