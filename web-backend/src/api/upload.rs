use actix_multipart::Multipart;
use futures_util::TryStreamExt;
use scanrelay_core::{ScanError, ScratchStore, StoredUpload};

/// 接收 multipart 表单中唯一的文件字段并写入临时存储
///
/// 不带文件名的字段被忽略；写入过程中出错时临时文件随 `StoredUpload` 一起删除。
pub async fn receive_upload(
    store: &ScratchStore,
    mut payload: Multipart,
) -> Result<StoredUpload, ScanError> {
    let mut stored: Option<StoredUpload> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ScanError::InvalidUpload(format!("Failed to read multipart: {}", e))
    })? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let Some(filename) = filename else {
            // 普通表单字段，读完丢弃
            while field.try_next().await.map_err(multipart_error)?.is_some() {}
            continue;
        };

        if stored.is_some() {
            return Err(ScanError::InvalidUpload(
                "only one file may be uploaded per scan".to_string(),
            ));
        }

        tracing::info!(
            "Receiving file: {} (field: {})",
            filename,
            field.name().unwrap_or("")
        );

        let mut upload = store.create(Some(filename.as_str()))?;
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            upload.write_chunk(&chunk)?;
        }
        let upload = upload.finish()?;
        tracing::info!(
            "Stored upload at {}, size: {} bytes",
            upload.path().display(),
            upload.size()
        );
        stored = Some(upload);
    }

    stored.ok_or_else(|| {
        tracing::error!("No file data received");
        ScanError::InvalidUpload("no file field in upload".to_string())
    })
}

fn multipart_error(e: actix_multipart::MultipartError) -> ScanError {
    tracing::error!("Failed to read multipart field: {}", e);
    ScanError::InvalidUpload(format!("Failed to read multipart: {}", e))
}
