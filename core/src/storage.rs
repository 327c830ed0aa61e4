// 临时存储：上传文件写入隔离目录，使用唯一文件名

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};

use crate::error::{Result, ScanError};

const MAX_EXTENSION_LEN: usize = 10;
const MAX_DISPLAY_NAME_LEN: usize = 255;

/// 上传文件的临时存放目录，多个请求共享，文件名互不冲突
#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
    max_upload_bytes: u64,
}

impl ScratchStore {
    pub fn new(dir: impl Into<PathBuf>, max_upload_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_upload_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// 为一次上传创建临时文件
    ///
    /// 客户端提供的文件名只用于保留扩展名，不参与路径拼接。
    pub fn create(&self, client_name: Option<&str>) -> Result<StoredUpload> {
        let suffix = client_name
            .and_then(sanitized_extension)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;

        tracing::debug!("Created scratch file {}", file.path().display());

        Ok(StoredUpload {
            file,
            display_name: client_name.and_then(display_name),
            size: 0,
            limit: self.max_upload_bytes,
        })
    }
}

/// 客户端文件名的最后一段，只用于回显给客户端
fn display_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_DISPLAY_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// 只接受 ASCII 字母数字组成的短扩展名
fn sanitized_extension(name: &str) -> Option<String> {
    // 同时处理 Windows 风格路径分隔符
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 正在写入或已写完的上传文件，丢弃时删除
#[derive(Debug)]
pub struct StoredUpload {
    file: NamedTempFile,
    display_name: Option<String>,
    size: u64,
    limit: u64,
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 客户端提供的文件名（去掉目录部分）
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let size = self.size + chunk.len() as u64;
        if size > self.limit {
            return Err(ScanError::InvalidUpload(format!(
                "upload exceeds the {} byte limit",
                self.limit
            )));
        }
        self.file.write_all(chunk)?;
        self.size = size;
        Ok(())
    }

    /// 刷新到磁盘；空文件视为无效上传
    pub fn finish(mut self) -> Result<Self> {
        if self.size == 0 {
            return Err(ScanError::InvalidUpload("uploaded file is empty".to_string()));
        }
        self.file.flush()?;
        Ok(self)
    }

    pub(crate) fn into_temp_path(self) -> TempPath {
        self.file.into_temp_path()
    }
}
