use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use anyhow::anyhow;

use crate::{error, warn};

/// What an interleaved success does to the failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Successes never reset the count; the ceiling is a lifetime budget.
    Cumulative,
    /// A success resets the count, so only an unbroken run of failures disables.
    Consecutive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Succeeded,
    Failed { count: u32 },
    /// Returned to exactly one caller, the one whose failure hit the ceiling.
    CeilingReached { count: u32 },
}

pub struct FailureGuard {
    count: AtomicU32,
    ceiling: u32,
    policy: FailurePolicy,
    tripped: AtomicBool,
}

impl FailureGuard {
    pub fn new(ceiling: u32, policy: FailurePolicy) -> Self {
        Self {
            count: AtomicU32::new(0),
            ceiling: ceiling.max(1),
            policy,
            tripped: AtomicBool::new(false),
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Runs `op`, swallowing its error after tagging it with `message` and
    /// `context`. The error is logged, never returned. A panic inside `op` is
    /// caught and counted like any other failure.
    pub fn guard<F>(&self, message: u32, context: &str, op: F) -> GuardOutcome
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let result = panic::catch_unwind(AssertUnwindSafe(op))
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())));

        match result {
            Ok(()) => {
                if self.policy == FailurePolicy::Consecutive && !self.is_tripped() {
                    self.count.store(0, Ordering::SeqCst);
                }
                GuardOutcome::Succeeded
            }
            Err(e) => self.record(message, context, e),
        }
    }

    fn record(&self, message: u32, context: &str, err: anyhow::Error) -> GuardOutcome {
        let err = err
            .context(format!("context: {context}"))
            .context(format!("WM MSG 0x{message:04X}"));

        let count = self.count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        error!(
            "[BADGES][GUARD] Composition request failed ({}/{}): {:#}",
            count, self.ceiling, err
        );

        if count >= self.ceiling && !self.tripped.swap(true, Ordering::SeqCst) {
            warn!(
                "[BADGES][GUARD] Solution badge has failed {} times and will be disabled",
                count
            );
            return GuardOutcome::CeilingReached { count };
        }

        GuardOutcome::Failed { count }
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let reason = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload");
    anyhow!("panicked: {reason}")
}
