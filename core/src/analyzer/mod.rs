// Analyzer module - 分析器适配器
// 定义外部分析工具的命令模板和输出解析接口

pub mod mythril;
pub mod oyente;
pub mod registry;

use std::ffi::{OsStr, OsString};

use crate::error::Result;
use crate::model::{Finding, ScanRequest};

/// 报告所在的输出流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStream {
    Stdout,
    Stderr,
}

/// 分析器 trait - 每个外部工具实现一个适配器
///
/// 编排器只依赖这个接口：如何构造参数向量、报告写在哪个流、如何解析报告。
pub trait Analyzer: Send + Sync {
    /// 返回分析器名称
    fn name(&self) -> &str;

    /// 可执行文件，相对名称通过 PATH 查找
    fn program(&self) -> &OsStr;

    /// 完整参数向量，不经过 shell
    fn args(&self, request: &ScanRequest) -> Vec<OsString>;

    fn report_stream(&self) -> ReportStream {
        ReportStream::Stdout
    }

    /// 非 0 但仍带完整报告的退出码，例如发现漏洞时以 1 退出的工具
    fn report_exit_codes(&self) -> &[i32] {
        &[]
    }

    /// 解析进程正常退出（退出码 0 或 `report_exit_codes`）后的报告
    fn parse_report(&self, output: &str) -> Result<Vec<Finding>>;
}

/// 从可能夹杂日志行的输出中取出 JSON 报告
///
/// 先尝试整段输出；否则取最后一个以 `{` 开头且能解析为 JSON 对象的行。
pub fn extract_json_report(output: &str) -> Option<serde_json::Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| match serde_json::from_str(line) {
            Ok(value @ serde_json::Value::Object(_)) => Some(value),
            _ => None,
        })
}
