use regex::Regex;
use std::ffi::{OsStr, OsString};

use super::{Analyzer, ReportStream};
use crate::error::{Result, ScanError};
use crate::model::{Finding, ScanRequest};

pub const DEFAULT_PROGRAM: &str = "oyente";

const COMPLETED_MARKER: &str = "====== Analysis Completed ======";

/// Oyente 分析器
///
/// Oyente 通过 Python logging 把结果写到 stderr，格式为 `LEVEL:logger:message`：
///
/// ```text
/// INFO:root:contract wallet.sol:Wallet:
/// INFO:symExec:	  Integer Underflow: 			 True
/// INFO:symExec:wallet.sol:12:5: Warning: Integer Underflow.
/// 	balance -= amount;
/// INFO:symExec:	====== Analysis Completed ======
/// ```
pub struct OyenteAnalyzer {
    program: OsString,
    leading_args: Vec<OsString>,
    contract_re: Regex,
    flag_re: Regex,
    warning_re: Regex,
    log_prefix_re: Regex,
}

impl OyenteAnalyzer {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_PROGRAM, Vec::<OsString>::new())
    }

    /// 例如 `python /oyente/oyente/oyente.py`
    pub fn with_command<I, S>(program: impl Into<OsString>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            contract_re: Regex::new(r"^INFO:root:contract (?P<file>[^:]+):(?P<name>[^:]+):\s*$")
                .unwrap(),
            flag_re: Regex::new(r"^INFO:symExec:\s+(?P<name>[^:]+?):\s+(?P<value>True|False)\s*$")
                .unwrap(),
            warning_re: Regex::new(
                r"^INFO:symExec:(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+): Warning: (?P<msg>.+?)\.?\s*$",
            )
            .unwrap(),
            log_prefix_re: Regex::new(r"^[A-Z]+:[\w.]+:").unwrap(),
        }
    }
}

impl Default for OyenteAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for OyenteAnalyzer {
    fn name(&self) -> &str {
        "oyente"
    }

    fn program(&self) -> &OsStr {
        &self.program
    }

    fn args(&self, request: &ScanRequest) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-ce".into(),
            "-s".into(),
            request.source_path().as_os_str().to_os_string(),
            "--depthlimit".into(),
            request.max_depth.to_string().into(),
        ]);
        args
    }

    fn report_stream(&self) -> ReportStream {
        ReportStream::Stderr
    }

    // 发现漏洞时 oyente 以 1 退出
    fn report_exit_codes(&self) -> &[i32] {
        &[1]
    }

    fn parse_report(&self, output: &str) -> Result<Vec<Finding>> {
        if !output.contains(COMPLETED_MARKER) {
            return Err(ScanError::MalformedOutput(
                "oyente output has no completed analysis block".to_string(),
            ));
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut contract_file = String::new();
        let mut contract_name = String::new();
        // 正在收集源码片段的 warning
        let mut open_warning: Option<usize> = None;

        for line in output.lines() {
            if !self.log_prefix_re.is_match(line) {
                if let Some(idx) = open_warning {
                    let snippet = line.trim();
                    if !snippet.is_empty() && !snippet.chars().all(|c| c == '^') {
                        let code = findings[idx].code.get_or_insert_with(String::new);
                        if !code.is_empty() {
                            code.push('\n');
                        }
                        code.push_str(snippet);
                    }
                }
                continue;
            }
            open_warning = None;

            if let Some(caps) = self.contract_re.captures(line) {
                contract_file = caps["file"].to_string();
                contract_name = caps["name"].to_string();
            } else if let Some(caps) = self.flag_re.captures(line) {
                if &caps["value"] == "True" {
                    let name = caps["name"].trim().to_string();
                    findings.push(Finding {
                        description: format!("{} detected in contract {}", name, contract_name),
                        kind: name.clone(),
                        title: name,
                        filename: contract_file.clone(),
                        address: None,
                        debug_info: None,
                        function_name: None,
                        line_number: None,
                        code: None,
                    });
                }
            } else if let Some(caps) = self.warning_re.captures(line) {
                let msg = caps["msg"].to_string();
                findings.push(Finding {
                    kind: "Warning".to_string(),
                    description: format!(
                        "{} at {}:{}:{}",
                        msg, &caps["file"], &caps["line"], &caps["col"]
                    ),
                    title: msg,
                    filename: caps["file"].to_string(),
                    address: None,
                    debug_info: None,
                    function_name: None,
                    line_number: caps["line"].parse().ok(),
                    code: None,
                });
                open_warning = Some(findings.len() - 1);
            }
        }

        Ok(findings)
    }
}
