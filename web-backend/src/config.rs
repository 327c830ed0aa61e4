use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// 启动时读取一次的运行配置，之后只读
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub scratch_dir: PathBuf,
    pub static_dir: PathBuf,
    pub scan_timeout: Duration,
    pub default_max_depth: u32,
    pub max_depth_limit: u32,
    pub max_upload_bytes: u64,
    pub max_output_bytes: usize,
    /// 默认分析器名称
    pub analyzer: String,
    /// 程序加前置参数，例如 `python /oyente/oyente/oyente.py`
    pub mythril_command: Vec<String>,
    pub oyente_command: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            host: get("HOST", "0.0.0.0"),
            port: parse("PORT", get("PORT", "4000"))?,
            scratch_dir: PathBuf::from(get("SCRATCH_DIR", "./contracts")),
            static_dir: PathBuf::from(get("STATIC_DIR", "./app")),
            scan_timeout: Duration::from_secs(parse(
                "SCAN_TIMEOUT_SECS",
                get("SCAN_TIMEOUT_SECS", "120"),
            )?),
            default_max_depth: parse("DEFAULT_MAX_DEPTH", get("DEFAULT_MAX_DEPTH", "10"))?,
            max_depth_limit: parse("MAX_DEPTH_LIMIT", get("MAX_DEPTH_LIMIT", "64"))?,
            max_upload_bytes: parse("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES", "10485760"))?,
            max_output_bytes: parse("MAX_OUTPUT_BYTES", get("MAX_OUTPUT_BYTES", "8388608"))?,
            analyzer: get("ANALYZER", "mythril").to_lowercase(),
            mythril_command: split_command(get("MYTHRIL_BIN", "myth")),
            oyente_command: split_command(get("OYENTE_BIN", "oyente")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_timeout.is_zero() {
            return Err(invalid("SCAN_TIMEOUT_SECS", "0", "must be positive"));
        }
        if self.max_depth_limit == 0 {
            return Err(invalid("MAX_DEPTH_LIMIT", "0", "must be positive"));
        }
        if self.default_max_depth == 0 || self.default_max_depth > self.max_depth_limit {
            return Err(invalid(
                "DEFAULT_MAX_DEPTH",
                &self.default_max_depth.to_string(),
                &format!("must be between 1 and {}", self.max_depth_limit),
            ));
        }
        Ok(())
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn split_command(command: String) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
