// 数据模型：扫描请求、扫描结果与漏洞发现

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

use crate::error::{ErrorKind, ScanError};
use crate::storage::StoredUpload;

/// 客户端没有提供文件名时的显示名
const DEFAULT_UPLOAD_NAME: &str = "upload";

/// 分析器报告的一条问题
///
/// 字段名与分析器 JSON 报告以及前端页面保持一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub filename: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,
    #[serde(rename = "debug", default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
    #[serde(rename = "function", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(rename = "lineno", default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub description: String,
}

/// Mythril 的 address 字段是字节码偏移（数字），其他来源可能是字符串
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// 一次扫描请求
///
/// 如果请求来自上传，它持有上传文件的所有权；请求被丢弃时文件随之删除。
#[derive(Debug)]
pub struct ScanRequest {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub max_depth: u32,
    /// 返回给客户端时用来替换临时文件路径
    display_name: Option<String>,
    _upload: Option<TempPath>,
}

impl ScanRequest {
    /// 针对已存在的文件构造请求（文件不归请求所有）
    pub fn new(source_path: impl Into<PathBuf>, max_depth: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: source_path.into(),
            max_depth,
            display_name: None,
            _upload: None,
        }
    }

    /// 接管上传文件，扫描结束后删除
    pub fn from_upload(upload: StoredUpload, max_depth: u32) -> Self {
        let display_name = upload
            .display_name()
            .unwrap_or(DEFAULT_UPLOAD_NAME)
            .to_string();
        let temp_path = upload.into_temp_path();
        Self {
            id: Uuid::new_v4(),
            source_path: temp_path.to_path_buf(),
            max_depth,
            display_name: Some(display_name),
            _upload: Some(temp_path),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// 把结果中的临时文件路径换成上传时的文件名，避免暴露服务器目录
    pub fn redact(&self, result: ScanResult) -> ScanResult {
        if self.display_name.is_none() {
            return result;
        }
        match result {
            ScanResult::Success { findings } => ScanResult::Success {
                findings: findings
                    .into_iter()
                    .map(|mut finding| {
                        finding.filename = self.redact_text(&finding.filename);
                        finding.title = self.redact_text(&finding.title);
                        finding.description = self.redact_text(&finding.description);
                        finding
                    })
                    .collect(),
            },
            ScanResult::Failure { reason, detail } => ScanResult::Failure {
                reason,
                detail: self.redact_text(&detail),
            },
        }
    }

    fn redact_text(&self, text: &str) -> String {
        let Some(name) = self.display_name.as_deref() else {
            return text.to_string();
        };
        let mut redacted = text.replace(self.source_path.to_string_lossy().as_ref(), name);
        if let Some(file_name) = self.source_path.file_name().and_then(|f| f.to_str()) {
            redacted = redacted.replace(file_name, name);
        }
        redacted
    }
}

/// 每个请求恰好产生一个扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Success { findings: Vec<Finding> },
    Failure { reason: ErrorKind, detail: String },
}

impl ScanResult {
    pub fn failure(reason: ErrorKind, detail: impl Into<String>) -> Self {
        ScanResult::Failure {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success { .. })
    }
}

impl From<Result<Vec<Finding>, ScanError>> for ScanResult {
    fn from(result: Result<Vec<Finding>, ScanError>) -> Self {
        match result {
            Ok(findings) => ScanResult::Success { findings },
            Err(e) => ScanResult::Failure {
                reason: e.kind(),
                detail: e.detail(),
            },
        }
    }
}

impl From<ScanError> for ScanResult {
    fn from(e: ScanError) -> Self {
        ScanResult::from(Err(e))
    }
}
