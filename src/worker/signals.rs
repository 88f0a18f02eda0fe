//! Termination analysis for worker processes.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Why a worker process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// SIGKILL, from `terminate()` or the OOM killer.
    Killed,
    /// SIGTERM from the escalation path of a graceful stop.
    Terminated,
    /// Any other fatal signal (SIGSEGV, SIGABRT, ...).
    Signaled(Signal),
    /// Process is still running.
    StillAlive,
    /// Status could not be determined (already reaped elsewhere).
    Unknown,
}

impl TerminationReason {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::StillAlive)
    }

    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Killed => "killed (SIGKILL)".to_string(),
            Self::Terminated => "terminated (SIGTERM)".to_string(),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::StillAlive => "still running".to_string(),
            Self::Unknown => "stopped for an unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Map a `waitpid` status onto a termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, Signal::SIGKILL, _) => TerminationReason::Killed,
        WaitStatus::Signaled(_, Signal::SIGTERM, _) => TerminationReason::Terminated,
        WaitStatus::Signaled(_, signal, _) => TerminationReason::Signaled(signal),
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}

/// Diagnostic text for a task whose worker died before answering.
pub fn lost_task_message(worker_id: usize, seq: u64, reason: TerminationReason) -> String {
    format!(
        "worker {} {} while running task {}",
        worker_id, reason, seq
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_analyze_wait_status() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 0)),
            TerminationReason::Exited(0)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            TerminationReason::Killed
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGSEGV, true)),
            TerminationReason::Signaled(Signal::SIGSEGV)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::StillAlive
        );
    }

    #[test]
    fn test_success_and_running() {
        assert!(TerminationReason::Exited(0).is_success());
        assert!(!TerminationReason::Exited(3).is_success());
        assert!(!TerminationReason::Killed.is_success());
        assert!(TerminationReason::StillAlive.is_running());
    }

    #[test]
    fn test_lost_task_message() {
        let msg = lost_task_message(2, 17, TerminationReason::Exited(3));
        assert_eq!(msg, "worker 2 exited with code 3 while running task 17");
    }
}
