//! Scheduling-policy probe for the calling thread.

use std::fmt;

use varstream_types::Result;

/// Scheduling policy of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// First-in first-out real-time scheduling.
    Fifo,
    /// Round-robin real-time scheduling.
    RoundRobin,
    /// Any other policy, by its raw value.
    Other(i32),
}

impl SchedPolicy {
    /// `true` for the real-time policies.
    pub fn is_realtime(self) -> bool {
        matches!(self, SchedPolicy::Fifo | SchedPolicy::RoundRobin)
    }

    #[cfg(unix)]
    fn from_raw(policy: libc::c_int) -> Self {
        match policy {
            libc::SCHED_FIFO => SchedPolicy::Fifo,
            libc::SCHED_RR => SchedPolicy::RoundRobin,
            other => SchedPolicy::Other(other),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedPolicy::Fifo => write!(f, "SCHED_FIFO"),
            SchedPolicy::RoundRobin => write!(f, "SCHED_RR"),
            SchedPolicy::Other(raw) => write!(f, "policy {raw}"),
        }
    }
}

/// Scheduling policy of the calling thread.
///
/// # Errors
///
/// [`BridgeError::SchedulingQuery`][varstream_types::BridgeError::SchedulingQuery]
/// when the operating system refuses the query.
#[cfg(unix)]
pub fn current_policy() -> Result<SchedPolicy> {
    let mut policy: libc::c_int = 0;
    // SAFETY: `sched_param` is plain data; all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: `pthread_self` is always a valid handle for the calling
    // thread and both out-pointers reference live locals.
    let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if rc != 0 {
        return Err(varstream_types::BridgeError::SchedulingQuery(
            std::io::Error::from_raw_os_error(rc).to_string(),
        ));
    }
    Ok(SchedPolicy::from_raw(policy))
}

/// Scheduling policy of the calling thread. Platforms without POSIX
/// thread scheduling never report a real-time policy.
#[cfg(not(unix))]
pub fn current_policy() -> Result<SchedPolicy> {
    Ok(SchedPolicy::Other(0))
}
