// ScanRelay Core Library
// 核心功能库，包含数据模型、分析器适配器、临时存储和扫描编排

pub mod analyzer;
pub mod model;
pub mod orchestrator;
pub mod storage;

// 重新导出常用类型
pub use analyzer::mythril::MythrilAnalyzer;
pub use analyzer::oyente::OyenteAnalyzer;
pub use analyzer::registry::AnalyzerRegistry;
pub use analyzer::{Analyzer, ReportStream};
pub use error::{ErrorKind, ScanError};
pub use model::{Finding, ScanRequest, ScanResult};
pub use orchestrator::{ScanConfig, ScanOrchestrator, ScanState};
pub use storage::{ScratchStore, StoredUpload};

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// 扫描失败的分类，序列化为变体名（例如 `"LaunchError"`）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum ErrorKind {
        InvalidUpload,
        InvalidInput,
        StorageError,
        LaunchError,
        AnalyzerError,
        Timeout,
        MalformedOutput,
    }

    impl ErrorKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ErrorKind::InvalidUpload => "InvalidUpload",
                ErrorKind::InvalidInput => "InvalidInput",
                ErrorKind::StorageError => "StorageError",
                ErrorKind::LaunchError => "LaunchError",
                ErrorKind::AnalyzerError => "AnalyzerError",
                ErrorKind::Timeout => "Timeout",
                ErrorKind::MalformedOutput => "MalformedOutput",
            }
        }
    }

    impl fmt::Display for ErrorKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Error, Debug)]
    pub enum ScanError {
        #[error("invalid upload: {0}")]
        InvalidUpload(String),

        #[error("invalid input: {0}")]
        InvalidInput(String),

        #[error("storage error: {0}")]
        Storage(#[from] std::io::Error),

        #[error("failed to launch analyzer: {0}")]
        Launch(String),

        #[error("analyzer failed: {0}")]
        Analyzer(String),

        #[error("analyzer timed out after {0:?}")]
        Timeout(std::time::Duration),

        #[error("malformed analyzer output: {0}")]
        MalformedOutput(String),
    }

    impl ScanError {
        pub fn kind(&self) -> ErrorKind {
            match self {
                ScanError::InvalidUpload(_) => ErrorKind::InvalidUpload,
                ScanError::InvalidInput(_) => ErrorKind::InvalidInput,
                ScanError::Storage(_) => ErrorKind::StorageError,
                ScanError::Launch(_) => ErrorKind::LaunchError,
                ScanError::Analyzer(_) => ErrorKind::AnalyzerError,
                ScanError::Timeout(_) => ErrorKind::Timeout,
                ScanError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            }
        }

        /// 面向调用方的错误详情
        pub fn detail(&self) -> String {
            match self {
                ScanError::InvalidUpload(s)
                | ScanError::InvalidInput(s)
                | ScanError::Launch(s)
                | ScanError::Analyzer(s)
                | ScanError::MalformedOutput(s) => s.clone(),
                ScanError::Storage(e) => e.to_string(),
                ScanError::Timeout(d) => format!("analyzer did not finish within {:?}", d),
            }
        }
    }

    pub type Result<T> = std::result::Result<T, ScanError>;
}
