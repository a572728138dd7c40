//! Exit check report extraction and verdict classification.
//!
//! Terminal sessions hand back the results file with the prompt and the echoed
//! `cat` command in front of it, so the payload has to be cut out of the raw
//! output before it is decoded. Stripping always happens before decoding.

use crate::constants::remote::MISSING_FILE_ERROR;
use crate::errors::CheckError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub const STATUS_PASSED: &str = "PASSED";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_UNKNOWN: &str = "UNKNOWN";
pub const TIMESTAMP_UNKNOWN: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedValidation {
    pub exit_code: Option<i64>,
    pub message: Option<String>,
}

impl FailedValidation {
    fn from_value(value: &Value) -> Self {
        Self {
            exit_code: value.get("exit_code").and_then(Value::as_i64),
            message: value.get("message").map(render_scalar),
        }
    }
}

impl fmt::Display for FailedValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "Exit Code {}: {}",
            code,
            self.message.as_deref().unwrap_or("unknown")
        )
    }
}

/// Parsed content of the results file. `raw` keeps every key the script wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitCheckReport {
    pub overall_status: String,
    /// Rendered as the script wrote it; never coerced to a number.
    pub total_failures: String,
    pub failed_validations: Vec<FailedValidation>,
    pub timestamp: String,
    #[serde(skip)]
    pub raw: Value,
}

impl ExitCheckReport {
    /// Missing or unexpected fields fall back to defaults; nothing here fails.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let overall_status = object
            .get("overall_status")
            .map(render_scalar)
            .unwrap_or_else(|| STATUS_UNKNOWN.to_string());
        let total_failures = object
            .get("total_failures")
            .map(render_scalar)
            .unwrap_or_else(|| "0".to_string());
        let failed_validations = object
            .get("failed_validations")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(FailedValidation::from_value).collect())
            .unwrap_or_default();
        let timestamp = object
            .get("timestamp")
            .map(render_scalar)
            .unwrap_or_else(|| TIMESTAMP_UNKNOWN.to_string());
        Self {
            overall_status,
            total_failures,
            failed_validations,
            timestamp,
            raw: Value::Object(object),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.overall_status == STATUS_PASSED
    }

    pub fn summary(&self) -> String {
        format!(
            "Exit check results - Status: {}, Total Failures: {}, Timestamp: {}",
            self.overall_status, self.total_failures, self.timestamp
        )
    }

    /// One line per failed validation, in report order. Empty unless FAILED.
    pub fn failure_details(&self) -> Vec<String> {
        if self.overall_status != STATUS_FAILED {
            return Vec::new();
        }
        self.failed_validations
            .iter()
            .map(|v| v.to_string())
            .collect()
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Drops everything before the first `{` and trims. Without a `{` the
/// output is returned untouched and decoding is left to fail.
pub fn isolate_payload(output: &str) -> &str {
    match output.find('{') {
        Some(start) => output[start..].trim(),
        None => output,
    }
}

pub fn is_results_file_missing(output: &str) -> bool {
    output.is_empty() || output.contains(MISSING_FILE_ERROR)
}

/// Turns the raw output of `cat <results>` into a report.
pub fn extract_report(raw_output: &str) -> Result<ExitCheckReport, CheckError> {
    if is_results_file_missing(raw_output) {
        return Err(CheckError::results_file_missing(
            "Results file is missing or empty",
        ));
    }
    let payload = isolate_payload(raw_output);
    let object: Map<String, Value> = serde_json::from_str(payload).map_err(|err| {
        CheckError::json_decode(
            format!(
                "Failed to parse JSON results: {}. Raw output: {}",
                err, raw_output
            ),
            raw_output,
        )
    })?;
    Ok(ExitCheckReport::from_object(object))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub success: bool,
    pub report: Option<ExitCheckReport>,
}

impl Verdict {
    pub fn classify(report: ExitCheckReport) -> Self {
        Self {
            success: report.is_passed(),
            report: Some(report),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            report: None,
        }
    }

    pub fn report_json(&self) -> Option<&Value> {
        self.report.as_ref().map(|r| &r.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSED_JSON: &str = r#"{"overall_status":"PASSED","total_failures":0,"failed_validations":[],"timestamp":"t"}"#;

    fn verdict_for(raw: &str) -> Verdict {
        match extract_report(raw) {
            Ok(report) => Verdict::classify(report),
            Err(_) => Verdict::failed(),
        }
    }

    #[test]
    fn prompt_and_echo_are_stripped_before_decoding() {
        let raw = format!("host# sudo cat f.json\n{}", PASSED_JSON);
        let verdict = verdict_for(&raw);
        assert!(verdict.success);
        let report = verdict.report.unwrap();
        assert_eq!(report.overall_status, "PASSED");
        assert_eq!(report.timestamp, "t");
    }

    #[test]
    fn noisy_prefix_matches_clean_payload() {
        let clean = extract_report(PASSED_JSON).unwrap();
        for prefix in ["", "sw1# ", "sw1# sudo cat /tmp/x.json\r\n", "\n\n  "] {
            let noisy = extract_report(&format!("{}{}", prefix, PASSED_JSON)).unwrap();
            assert_eq!(noisy, clean, "prefix {:?}", prefix);
        }
    }

    #[test]
    fn isolation_is_idempotent_for_clean_payloads() {
        let padded = format!("{}\n\n", PASSED_JSON);
        let once = isolate_payload(&padded);
        assert_eq!(once, PASSED_JSON);
        assert_eq!(isolate_payload(once), once);
        assert_eq!(
            extract_report(once).unwrap(),
            extract_report(isolate_payload(once)).unwrap()
        );
    }

    #[test]
    fn missing_marker_short_circuits() {
        let raw = format!(
            "host# cat f.json\ncat: f.json: No such file or directory\n{}",
            PASSED_JSON
        );
        let err = extract_report(&raw).unwrap_err();
        assert_eq!(err.kind, crate::errors::CheckErrorKind::ResultsFileMissing);
        assert_eq!(verdict_for(&raw), Verdict::failed());
    }

    #[test]
    fn empty_output_is_missing() {
        let err = extract_report("").unwrap_err();
        assert_eq!(err.kind, crate::errors::CheckErrorKind::ResultsFileMissing);
    }

    #[test]
    fn no_brace_fails_decoding_without_panicking() {
        let err = extract_report("garbage no brace").unwrap_err();
        assert_eq!(err.kind, crate::errors::CheckErrorKind::JsonDecodeError);
        assert_eq!(err.raw_output(), Some("garbage no brace"));
        assert_eq!(isolate_payload("garbage no brace"), "garbage no brace");
    }

    #[test]
    fn non_object_payload_is_a_decode_error() {
        let err = extract_report("sw# cat x\n[{\"overall_status\":\"PASSED\"}]").unwrap_err();
        assert_eq!(err.kind, crate::errors::CheckErrorKind::JsonDecodeError);
    }

    #[test]
    fn failed_report_lists_details_in_order() {
        let raw = r#"sw1# sudo cat /tmp/r.json
{"overall_status":"FAILED","total_failures":2,"failed_exit_codes":[30,12],
 "failed_validations":[{"exit_code":30,"message":"Leftover tunnel"},{"exit_code":12,"message":"BGP not converged"}],
 "timestamp":"2025-11-18 22:54:32 UTC"}"#;
        let verdict = verdict_for(raw);
        assert!(!verdict.success);
        let report = verdict.report.as_ref().unwrap();
        assert_eq!(
            report.failure_details(),
            vec![
                "Exit Code 30: Leftover tunnel".to_string(),
                "Exit Code 12: BGP not converged".to_string()
            ]
        );
        assert_eq!(
            report.summary(),
            "Exit check results - Status: FAILED, Total Failures: 2, Timestamp: 2025-11-18 22:54:32 UTC"
        );
        assert_eq!(
            verdict.report_json().unwrap()["failed_exit_codes"],
            serde_json::json!([30, 12])
        );
    }

    #[test]
    fn single_failure_detail_line() {
        let raw = r#"{"overall_status":"FAILED","total_failures":1,"failed_validations":[{"exit_code":30,"message":"Leftover tunnel"}]}"#;
        let report = extract_report(raw).unwrap();
        assert_eq!(report.failure_details(), vec!["Exit Code 30: Leftover tunnel"]);
        assert!(!Verdict::classify(report).success);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let report = extract_report("{}").unwrap();
        assert_eq!(report.overall_status, "UNKNOWN");
        assert_eq!(report.total_failures, "0");
        assert!(report.failed_validations.is_empty());
        assert_eq!(report.timestamp, "N/A");
        assert!(!Verdict::classify(report).success);
    }

    #[test]
    fn status_match_is_exact() {
        for status in ["passed", "PASSED ", "Passed", "OK"] {
            let raw = format!(r#"{{"overall_status":"{}"}}"#, status);
            assert!(!verdict_for(&raw).success, "status {:?}", status);
        }
    }

    #[test]
    fn failure_count_and_list_are_not_cross_checked() {
        let report =
            extract_report(r#"{"overall_status":"FAILED","total_failures":3,"failed_validations":[]}"#)
                .unwrap();
        assert!(report.failure_details().is_empty());
        assert_eq!(report.total_failures, "3");

        let report = extract_report(
            r#"{"overall_status":"PASSED","total_failures":0,"failed_validations":[{"exit_code":1,"message":"x"}]}"#,
        )
        .unwrap();
        assert!(report.failure_details().is_empty());
        assert!(Verdict::classify(report).success);
    }

    #[test]
    fn failure_count_is_reported_verbatim() {
        for (raw, shown) in [
            (r#"{"total_failures":"2"}"#, "2"),
            (r#"{"total_failures":2.0}"#, "2.0"),
            (r#"{"total_failures":null}"#, "null"),
        ] {
            let report = extract_report(raw).unwrap();
            assert_eq!(
                report.summary(),
                format!(
                    "Exit check results - Status: UNKNOWN, Total Failures: {}, Timestamp: N/A",
                    shown
                )
            );
        }
    }

    #[test]
    fn sudo_warning_ahead_of_payload_is_stripped() {
        let raw = format!(
            "sudo: unable to resolve host sw1: Name or service not known\n{}",
            PASSED_JSON
        );
        assert!(verdict_for(&raw).success);

        let trailing = format!(
            "{}\nsudo: unable to resolve host sw1: Name or service not known",
            PASSED_JSON
        );
        let err = extract_report(&trailing).unwrap_err();
        assert_eq!(err.kind, crate::errors::CheckErrorKind::JsonDecodeError);
    }

    #[test]
    fn validation_entries_tolerate_missing_fields() {
        let report = extract_report(
            r#"{"overall_status":"FAILED","failed_validations":[{"message":"no code"},{"exit_code":7}]}"#,
        )
        .unwrap();
        assert_eq!(
            report.failure_details(),
            vec!["Exit Code unknown: no code", "Exit Code 7: unknown"]
        );
    }
}
