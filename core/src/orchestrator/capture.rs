// 子进程输出的流式捕获

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    /// 超出上限的部分被丢弃
    pub truncated: bool,
    /// 读取管道时出错
    pub failed: bool,
}

impl Captured {
    pub fn is_complete(&self) -> bool {
        !self.truncated && !self.failed
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// 最多保留末尾 `max` 字节，用于错误详情
    pub fn tail(&self, max: usize) -> String {
        let start = self.bytes.len().saturating_sub(max);
        String::from_utf8_lossy(&self.bytes[start..]).trim().to_string()
    }
}

/// 进程被杀死之前收到的输出依然保留在缓冲区中
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputBuffer {
    inner: Arc<Mutex<Captured>>,
}

impl OutputBuffer {
    pub async fn len(&self) -> usize {
        self.inner.lock().await.bytes.len()
    }

    pub async fn take(&self) -> Captured {
        std::mem::take(&mut *self.inner.lock().await)
    }

    async fn append(&self, chunk: &[u8], limit: usize) {
        let mut captured = self.inner.lock().await;
        let room = limit.saturating_sub(captured.bytes.len());
        if chunk.len() > room {
            captured.truncated = true;
        }
        let keep = chunk.len().min(room);
        captured.bytes.extend_from_slice(&chunk[..keep]);
    }

    async fn mark_failed(&self) {
        self.inner.lock().await.failed = true;
    }
}

/// 按到达顺序把 `reader` 的数据追加到缓冲区，直到 EOF
///
/// 超过上限后继续读取并丢弃，避免子进程因管道写满而阻塞。
pub(crate) async fn pump<R>(mut reader: R, buffer: OutputBuffer, limit: usize, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tracing::trace!(stream = stream, bytes = n, "{}", String::from_utf8_lossy(&chunk[..n]));
                buffer.append(&chunk[..n], limit).await;
            }
            Err(e) => {
                tracing::warn!("Failed to read analyzer {}: {}", stream, e);
                buffer.mark_failed().await;
                break;
            }
        }
    }
}
