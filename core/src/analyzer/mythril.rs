use serde::Deserialize;
use std::ffi::{OsStr, OsString};

use super::{extract_json_report, Analyzer};
use crate::error::{Result, ScanError};
use crate::model::{Finding, ScanRequest};

pub const DEFAULT_PROGRAM: &str = "myth";

/// Mythril 符号执行分析器，`-o json` 输出到 stdout
#[derive(Debug, Clone)]
pub struct MythrilAnalyzer {
    program: OsString,
    leading_args: Vec<OsString>,
}

#[derive(Debug, Deserialize)]
struct MythrilReport {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    issues: Vec<Finding>,
}

fn default_success() -> bool {
    true
}

impl MythrilAnalyzer {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self::with_command(program, Vec::<OsString>::new())
    }

    /// 例如 `python3 -m mythril`：程序加上固定的前置参数
    pub fn with_command<I, S>(program: impl Into<OsString>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for MythrilAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for MythrilAnalyzer {
    fn name(&self) -> &str {
        "mythril"
    }

    fn program(&self) -> &OsStr {
        &self.program
    }

    fn args(&self, request: &ScanRequest) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-x".into(),
            request.source_path().as_os_str().to_os_string(),
            "-o".into(),
            "json".into(),
            "--max-depth".into(),
            request.max_depth.to_string().into(),
        ]);
        args
    }

    fn parse_report(&self, output: &str) -> Result<Vec<Finding>> {
        let value = extract_json_report(output).ok_or_else(|| {
            ScanError::MalformedOutput("no JSON report in analyzer output".to_string())
        })?;

        let report: MythrilReport = serde_json::from_value(value)
            .map_err(|e| ScanError::MalformedOutput(format!("unexpected report shape: {}", e)))?;

        if !report.success {
            return Err(ScanError::Analyzer(
                report
                    .error
                    .unwrap_or_else(|| "analyzer reported failure".to_string()),
            ));
        }

        Ok(report.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_args_are_discrete() {
        let analyzer = MythrilAnalyzer::new();
        let request = ScanRequest::new("/tmp/a b; rm -rf ~.sol", 10);
        let args = analyzer.args(&request);
        assert_eq!(args.len(), 6);
        assert_eq!(args[1], OsString::from("/tmp/a b; rm -rf ~.sol"));
        assert_eq!(args[5], OsString::from("10"));
        assert_eq!(analyzer.program(), OsStr::new("myth"));
    }

    #[test]
    fn test_leading_args_come_first() {
        let analyzer = MythrilAnalyzer::with_command("python3", ["-m", "mythril"]);
        let args = analyzer.args(&ScanRequest::new("c.sol", 3));
        assert_eq!(args[0], OsString::from("-m"));
        assert_eq!(args[1], OsString::from("mythril"));
        assert_eq!(args[2], OsString::from("-x"));
    }

    #[test]
    fn test_parse_issues_in_order() {
        let output = r#"{"success": true, "error": null, "issues": [
            {"type": "Reentrancy", "title": "First", "filename": "contract.sol", "lineno": 42, "description": "a"},
            {"type": "Warning", "title": "Second", "filename": "contract.sol", "address": 661, "function": "withdraw()", "description": "b"}
        ]}"#;
        let findings = MythrilAnalyzer::new().parse_report(output).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].title, "First");
        assert_eq!(findings[0].line_number, Some(42));
        assert_eq!(findings[1].title, "Second");
        assert_eq!(findings[1].address.as_deref(), Some("661"));
        assert_eq!(findings[1].function_name.as_deref(), Some("withdraw()"));
    }

    #[test]
    fn test_parse_with_log_noise() {
        let output = "mythril.mythril: Analyzing contract.sol\n{\"success\": true, \"issues\": []}\n";
        let findings = MythrilAnalyzer::new().parse_report(output).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_reported_failure() {
        let output = r#"{"success": false, "error": "Solc experienced a fatal error", "issues": []}"#;
        let err = MythrilAnalyzer::new().parse_report(output).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AnalyzerError);
        assert_eq!(err.detail(), "Solc experienced a fatal error");
    }

    #[test]
    fn test_malformed() {
        let analyzer = MythrilAnalyzer::new();
        let err = analyzer.parse_report("not json at all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedOutput);

        let err = analyzer
            .parse_report(r#"{"success": true, "issues": [{"title": "missing type"}]}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedOutput);
    }
}
