// 进程组管理：超时后连同子孙进程一起终止

/// 向以 `pid` 为组长的进程组发送 SIGKILL
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => tracing::debug!("Sent SIGKILL to process group {}", pid),
        // 进程组已经不存在
        Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {}

/// 让子进程成为新进程组的组长
#[cfg(unix)]
pub(crate) fn isolate(command: &mut tokio::process::Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
pub(crate) fn isolate(_command: &mut tokio::process::Command) {}
