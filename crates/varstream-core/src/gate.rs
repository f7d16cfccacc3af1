//! Emission gating.
//!
//! - [`Throttle`] – sends on the first cycle, then on every
//!   `skip_interval + 1`-th cycle.
//! - [`EmissionGate`] – the one-time real-time thread check, run on the
//!   first cycle after every prepare.

use tracing::{debug, warn};
use varstream_types::{BridgeError, Result};

use crate::sched::{self, SchedPolicy};

/// Skip counter. Over `n` cycles with interval `k` it admits
/// `ceil(n / (k + 1))` sends.
///
/// The counter starts at 0 rather than at `skip_interval`, so the first
/// cycle after a (re)build always sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    skip_interval: u32,
    skip_counter: u32,
}

impl Throttle {
    pub fn new(skip_interval: u32) -> Self {
        Self {
            skip_interval,
            skip_counter: 0,
        }
    }

    pub fn skip_interval(&self) -> u32 {
        self.skip_interval
    }

    /// Advance one cycle. Returns `true` when this cycle sends.
    pub fn tick(&mut self) -> bool {
        if self.skip_counter == 0 {
            self.skip_counter = self.skip_interval;
            true
        } else {
            self.skip_counter -= 1;
            false
        }
    }
}

/// Probe returning the calling thread's scheduling policy.
pub type SchedProbe = fn() -> Result<SchedPolicy>;

/// One-shot real-time thread check.
///
/// The `checked` flag is consumed before the probe runs, so the probe runs
/// at most once per prepare/release span. A failed check sticks: every
/// later [`admit`][Self::admit] returns the same error until
/// [`rearm`][Self::rearm].
#[derive(Debug, Clone)]
pub struct EmissionGate {
    rt_strict: bool,
    checked: bool,
    violation: Option<BridgeError>,
    probe: SchedProbe,
}

impl EmissionGate {
    /// Gate probing the calling thread with [`sched::current_policy`].
    pub fn new(rt_strict: bool) -> Self {
        Self::with_probe(rt_strict, sched::current_policy)
    }

    pub fn with_probe(rt_strict: bool, probe: SchedProbe) -> Self {
        Self {
            rt_strict,
            checked: false,
            violation: None,
            probe,
        }
    }

    pub fn rt_strict(&self) -> bool {
        self.rt_strict
    }

    /// `true` once the check of the current span has run.
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// The failure recorded by the check of the current span, if any.
    pub fn violation(&self) -> Option<&BridgeError> {
        self.violation.as_ref()
    }

    /// Run the check if it has not run since the last [`rearm`][Self::rearm],
    /// or repeat its failure.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::RealTimeSafety`] – `rt_strict` is on and the thread
    ///   runs under a real-time policy.
    /// - [`BridgeError::SchedulingQuery`] – the policy could not be read.
    pub fn admit(&mut self) -> Result<()> {
        if self.checked {
            return match &self.violation {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            };
        }
        self.checked = true;
        if !self.rt_strict {
            return Ok(());
        }
        let verdict = self.probe_policy();
        if let Err(err) = &verdict {
            self.violation = Some(err.clone());
        }
        verdict
    }

    fn probe_policy(&self) -> Result<()> {
        let policy = (self.probe)()?;
        debug!(%policy, "processing thread scheduling policy");
        if policy.is_realtime() {
            warn!(%policy, "bridge invoked from a real-time thread");
            return Err(BridgeError::RealTimeSafety {
                policy: policy.to_string(),
            });
        }
        Ok(())
    }

    /// Arm the check again for the next prepare and clear a recorded failure.
    pub fn rearm(&mut self) {
        self.checked = false;
        self.violation = None;
    }
}
