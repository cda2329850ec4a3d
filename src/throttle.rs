use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{debug, warn};

/// Shared flag handed to each throttled invocation. Set once a newer request
/// supersedes the invocation that is running.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Action = Box<dyn Fn(&CancellationToken) + Send + Sync>;

struct ThrottleState {
    first_pending: Option<Instant>,
    last_request: Instant,
    last_run: Option<Instant>,
    running: Option<CancellationToken>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<ThrottleState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Coalesces bursts of `invoke()` calls into at most one action per `min`
/// interval, while still running at least once per `max` interval under
/// continuous load.
pub struct InvocationThrottle {
    shared: Arc<Shared>,
}

impl InvocationThrottle {
    pub fn new<F>(min: Duration, max: Duration, action: F) -> Self
    where
        F: Fn(&CancellationToken) + Send + Sync + 'static,
    {
        let max = max.max(min);
        let shared = Arc::new(Shared {
            state: Mutex::new(ThrottleState {
                first_pending: None,
                last_request: Instant::now(),
                last_run: None,
                running: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let action: Action = Box::new(action);
        let spawned = thread::Builder::new()
            .name("badge-throttle".to_string())
            .spawn(move || run_worker(worker, min, max, action));

        if let Err(e) = spawned {
            warn!("[BADGES][THROTTLE] Failed to spawn worker thread: {}", e);
        }

        Self { shared }
    }

    /// Queues a request. Never blocks on the action itself.
    pub fn invoke(&self) {
        let mut state = self.shared.lock();
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        state.last_request = now;
        if state.first_pending.is_none() {
            state.first_pending = Some(now);
        }

        if let Some(running) = state.running.as_ref() {
            running.cancel();
        }

        drop(state);
        self.shared.wake.notify_all();
    }

    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        state.first_pending = None;
        if let Some(running) = state.running.as_ref() {
            running.cancel();
        }
        drop(state);
        self.shared.wake.notify_all();
    }
}

impl Drop for InvocationThrottle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: Arc<Shared>, min: Duration, max: Duration, action: Action) {
    let mut state = shared.lock();

    loop {
        if state.shutdown {
            debug!("[BADGES][THROTTLE] Worker stopping");
            return;
        }

        let Some(first_pending) = state.first_pending else {
            state = shared.wake.wait(state).unwrap_or_else(|e| e.into_inner());
            continue;
        };

        let quiet_due = state.last_request + min;
        let starved_due = first_pending + max;
        let mut due = quiet_due.min(starved_due);
        if let Some(last_run) = state.last_run {
            due = due.max(last_run + min);
        }

        let now = Instant::now();
        if now < due {
            state = shared
                .wake
                .wait_timeout(state, due - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            continue;
        }

        let token = CancellationToken::new();
        state.first_pending = None;
        state.running = Some(token.clone());
        drop(state);

        action(&token);

        state = shared.lock();
        state.running = None;
        state.last_run = Some(Instant::now());
    }
}
