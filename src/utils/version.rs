use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static VERSION_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{6}").expect("version key regex"));

/// Six-digit release identifier taken from a SONiC version string, e.g. `202305`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey(String);

impl VersionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts exactly six ASCII digits.
    pub fn parse_exact(value: &str) -> Option<Self> {
        if value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the first six consecutive digits of `os_version`.
///
/// Any six-digit run qualifies, so `"build 1234567"` yields `"123456"`.
pub fn resolve_version_key(os_version: &str) -> Option<VersionKey> {
    VERSION_KEY_RE
        .find(os_version)
        .map(|m| VersionKey(m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_release_from_sonic_versions() {
        assert_eq!(
            resolve_version_key("SONiC.20181130.101").map(|k| k.to_string()),
            Some("201811".to_string())
        );
        assert_eq!(
            resolve_version_key("SONiC.20230531.01").map(|k| k.to_string()),
            Some("202305".to_string())
        );
    }

    #[test]
    fn no_six_digit_run_is_absent() {
        assert_eq!(resolve_version_key("SONiC.master.12345"), None);
        assert_eq!(resolve_version_key(""), None);
    }

    #[test]
    fn unrelated_digits_are_accepted() {
        assert_eq!(
            resolve_version_key("image-9876543-dbg").map(|k| k.to_string()),
            Some("987654".to_string())
        );
    }

    #[test]
    fn parse_exact_requires_six_digits() {
        assert!(VersionKey::parse_exact("202405").is_some());
        assert!(VersionKey::parse_exact("20240").is_none());
        assert!(VersionKey::parse_exact("2024a5").is_none());
    }
}
