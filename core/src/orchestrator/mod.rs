// Orchestrator module - 扫描编排
// 启动外部分析器、限制运行时间、捕获输出，并为每个请求给出唯一结果

mod capture;
mod process;

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::analyzer::{Analyzer, ReportStream};
use crate::error::{Result, ScanError};
use crate::model::{Finding, ScanRequest, ScanResult};
use capture::{Captured, OutputBuffer};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

/// 错误详情中保留的 stderr 末尾长度
const STDERR_DETAIL_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 从启动到输出读完的总时长上限
    pub timeout: Duration,
    /// 每个输出流的捕获上限
    pub max_output_bytes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// 扫描生命周期：`Idle -> Launched -> {Succeeded | Failed | TimedOut | LaunchFailed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Launched,
    Succeeded,
    Failed,
    TimedOut,
    LaunchFailed,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanState::Idle | ScanState::Launched)
    }

    fn terminal_for(outcome: &Result<Vec<Finding>>) -> Self {
        match outcome {
            Ok(_) => ScanState::Succeeded,
            Err(ScanError::Timeout(_)) => ScanState::TimedOut,
            Err(ScanError::Launch(_)) => ScanState::LaunchFailed,
            Err(_) => ScanState::Failed,
        }
    }
}

/// 子进程退出码与两路输出
struct ProcessOutput {
    status: ExitStatus,
    stdout: Captured,
    stderr: Captured,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOrchestrator {
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// 运行一次扫描
    ///
    /// 所有错误都在这里转成 `ScanResult::Failure`；请求在返回前被释放，上传的临时文件随之删除。
    pub async fn run_scan(&self, analyzer: &dyn Analyzer, request: ScanRequest) -> ScanResult {
        let span = tracing::info_span!(
            "scan",
            scan_id = %request.id,
            analyzer = analyzer.name()
        );

        async move {
            tracing::info!(
                "Scanning {} (max depth {})",
                request.source_path().display(),
                request.max_depth
            );
            let start = std::time::Instant::now();

            let mut state = ScanState::Idle;
            let outcome = self.execute(analyzer, &request, &mut state).await;
            let terminal = ScanState::terminal_for(&outcome);
            debug_assert!(!state.is_terminal());
            tracing::debug!("Scan state {:?} -> {:?}", state, terminal);

            match &outcome {
                Ok(findings) => tracing::info!(
                    "Scan finished with {} findings in {:?}",
                    findings.len(),
                    start.elapsed()
                ),
                Err(e) => tracing::warn!("Scan failed ({}): {}", e.kind(), e),
            }

            let result = request.redact(ScanResult::from(outcome));
            drop(request);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        analyzer: &dyn Analyzer,
        request: &ScanRequest,
        state: &mut ScanState,
    ) -> Result<Vec<Finding>> {
        validate_source(request.source_path()).await?;

        let mut command = Command::new(analyzer.program());
        command
            .args(analyzer.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process::isolate(&mut command);

        let mut child = command.spawn().map_err(|e| {
            ScanError::Launch(format!(
                "failed to start {}: {}",
                analyzer.program().to_string_lossy(),
                e
            ))
        })?;
        tracing::debug!("Scan state {:?} -> {:?}", state, ScanState::Launched);
        *state = ScanState::Launched;

        let output = self.supervise(&mut child).await?;

        let report = match analyzer.report_stream() {
            ReportStream::Stdout => &output.stdout,
            ReportStream::Stderr => &output.stderr,
        };

        if !output.status.success() {
            let reported = output
                .status
                .code()
                .is_some_and(|code| analyzer.report_exit_codes().contains(&code));
            if !reported || !report.is_complete() {
                return Err(analyzer_failure(&output));
            }
            // 退出码表示发现问题，但报告必须完整可解析
            return analyzer.parse_report(&report.text()).map_err(|e| {
                tracing::debug!("No usable report with exit {}: {}", output.status, e);
                analyzer_failure(&output)
            });
        }

        if !report.is_complete() {
            return Err(ScanError::MalformedOutput(format!(
                "analyzer report incomplete (limit {} bytes)",
                self.config.max_output_bytes
            )));
        }

        analyzer.parse_report(&report.text())
    }

    /// 等待子进程退出并读完输出，整个过程受同一个截止时间约束
    async fn supervise(&self, child: &mut Child) -> Result<ProcessOutput> {
        let deadline = Instant::now() + self.config.timeout;
        let pid = child.id();
        let limit = self.config.max_output_bytes;

        let stdout_buf = OutputBuffer::default();
        let stderr_buf = OutputBuffer::default();
        let mut pumps: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(capture::pump(stdout, stdout_buf.clone(), limit, "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(capture::pump(stderr, stderr_buf.clone(), limit, "stderr")));
        }

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(child, pid, &pumps).await;
                // 进程已经启动，等待失败属于分析器失败而不是启动失败
                return Err(ScanError::Analyzer(format!("failed to wait for analyzer: {}", e)));
            }
            Err(_) => {
                terminate(child, pid, &pumps).await;
                tracing::debug!(
                    "Discarding partial output: {} bytes stdout, {} bytes stderr",
                    stdout_buf.len().await,
                    stderr_buf.len().await
                );
                return Err(ScanError::Timeout(self.config.timeout));
            }
        };
        tracing::debug!("Analyzer exited with {}", status);

        // 主进程已退出，清理可能残留的子孙进程，让管道关闭
        if let Some(pid) = pid {
            process::kill_process_group(pid);
        }

        let drained = tokio::time::timeout_at(deadline, async {
            for pump in pumps.iter_mut() {
                if let Err(e) = pump.await {
                    tracing::warn!("Output capture task failed: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            terminate(child, pid, &pumps).await;
            return Err(ScanError::Timeout(self.config.timeout));
        }

        Ok(ProcessOutput {
            status,
            stdout: stdout_buf.take().await,
            stderr: stderr_buf.take().await,
        })
    }
}

fn analyzer_failure(output: &ProcessOutput) -> ScanError {
    let stderr = output.stderr.tail(STDERR_DETAIL_BYTES);
    let detail = if stderr.is_empty() {
        format!("analyzer exited with {}", output.status)
    } else {
        stderr
    };
    ScanError::Analyzer(detail)
}

/// 杀死整个进程组、回收子进程并停止捕获
async fn terminate(child: &mut Child, pid: Option<u32>, pumps: &[JoinHandle<()>]) {
    if let Some(pid) = pid {
        process::kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("Analyzer already gone: {}", e);
    }
    for pump in pumps {
        pump.abort();
    }
}

async fn validate_source(path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ScanError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(ScanError::InvalidInput(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    tokio::fs::File::open(path)
        .await
        .map_err(|e| ScanError::InvalidInput(format!("{} is not readable: {}", path.display(), e)))?;
    Ok(())
}
