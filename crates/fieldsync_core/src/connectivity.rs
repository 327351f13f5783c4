//! Debounced connectivity monitor.
//!
//! # Responsibility
//! - Turn coarse reachability booleans into genuine online/offline transitions.
//! - Fan transitions out to subscribers (the sync coordinator, UIs).
//!
//! # Invariants
//! - A raw change is committed only after it persists for the stability window.
//! - A flap back to the stable value before the window elapses is discarded.
//! - Two consecutive emitted states always differ.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Idle wake-up used when no transition is pending.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Committed connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub online: bool,
    pub last_transition_at: DateTime<Utc>,
}

pub type TransitionCallback = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

/// Identifier returned by `ConnectivityMonitor::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionSubscription(u64);

/// Pure debounce state machine; time is supplied by the caller.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable: bool,
    candidate: Option<(bool, Instant)>,
    window: Duration,
}

impl Debouncer {
    pub fn new(initial_online: bool, window: Duration) -> Self {
        Self {
            stable: initial_online,
            candidate: None,
            window,
        }
    }

    pub fn stable(&self) -> bool {
        self.stable
    }

    /// Records one raw reachability sample.
    pub fn observe(&mut self, online: bool, now: Instant) {
        if online == self.stable {
            self.candidate = None;
            return;
        }
        match self.candidate {
            Some((pending, _)) if pending == online => {}
            _ => self.candidate = Some((online, now)),
        }
    }

    /// Instant at which the pending candidate would be committed.
    pub fn deadline(&self) -> Option<Instant> {
        self.candidate.map(|(_, since)| since + self.window)
    }

    /// Commits the candidate if it has been stable long enough.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        let (pending, since) = self.candidate?;
        if now < since + self.window {
            return None;
        }
        self.candidate = None;
        self.stable = pending;
        Some(pending)
    }
}

struct MonitorInner {
    debouncer: Debouncer,
    state: ConnectivityState,
    subscribers: Vec<(u64, TransitionCallback)>,
    next_id: u64,
}

/// Observes reachability and emits one event per genuine transition.
pub struct ConnectivityMonitor {
    inner: Mutex<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(initial_online: bool, stability_window: Duration) -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                debouncer: Debouncer::new(initial_online, stability_window),
                state: ConnectivityState {
                    online: initial_online,
                    last_transition_at: Utc::now(),
                },
                subscribers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn current(&self) -> ConnectivityState {
        self.lock().state
    }

    pub fn is_online(&self) -> bool {
        self.current().online
    }

    /// Registers `on_transition`; it is called once per committed transition.
    pub fn subscribe(
        &self,
        on_transition: impl Fn(ConnectivityState) + Send + Sync + 'static,
    ) -> TransitionSubscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(on_transition)));
        TransitionSubscription(id)
    }

    pub fn unsubscribe(&self, subscription: TransitionSubscription) {
        self.lock()
            .subscribers
            .retain(|(id, _)| *id != subscription.0);
    }

    /// Feeds one raw sample, committing immediately if the window allows.
    pub fn observe(&self, online: bool, now: Instant) -> Option<ConnectivityState> {
        debug!(
            "event=connectivity_sample module=connectivity status=ok online={}",
            online
        );
        self.lock().debouncer.observe(online, now);
        self.poll(now)
    }

    /// Commits a pending transition whose window has elapsed and notifies.
    pub fn poll(&self, now: Instant) -> Option<ConnectivityState> {
        let (state, callbacks) = {
            let mut inner = self.lock();
            let online = inner.debouncer.poll(now)?;
            if online == inner.state.online {
                return None;
            }
            inner.state = ConnectivityState {
                online,
                last_transition_at: Utc::now(),
            };
            let callbacks: Vec<TransitionCallback> = inner
                .subscribers
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            (inner.state, callbacks)
        };

        info!(
            "event=connectivity_transition module=connectivity status=ok online={} subscribers={}",
            state.online,
            callbacks.len()
        );
        for callback in callbacks {
            callback(state);
        }
        Some(state)
    }

    fn deadline(&self) -> Option<Instant> {
        self.lock().debouncer.deadline()
    }

    /// Drives the monitor from a raw reachability source until it closes.
    pub fn spawn(self: Arc<Self>, mut source: mpsc::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let deadline = self.deadline();
                let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAKE);
                tokio::select! {
                    sample = source.recv() => match sample {
                        Some(online) => {
                            self.observe(online, Instant::now());
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                        self.poll(Instant::now());
                    }
                }
            }
            info!("event=connectivity_source_closed module=connectivity status=ok");
        })
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectivityMonitor, Debouncer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    const WINDOW: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn flap_inside_window_is_discarded() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(false, WINDOW);
        debouncer.observe(true, start);
        debouncer.observe(false, start + Duration::from_millis(500));
        assert_eq!(debouncer.deadline(), None);
        assert_eq!(debouncer.poll(start + Duration::from_secs(10)), None);
        assert!(!debouncer.stable());
    }

    #[tokio::test]
    async fn repeated_samples_keep_original_candidate_start() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(false, WINDOW);
        debouncer.observe(true, start);
        debouncer.observe(true, start + Duration::from_secs(1));
        assert_eq!(debouncer.deadline(), Some(start + WINDOW));
        assert_eq!(debouncer.poll(start + WINDOW), Some(true));
        assert!(debouncer.stable());
    }

    #[tokio::test]
    async fn monitor_emits_once_per_transition() {
        let monitor = ConnectivityMonitor::new(false, Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let now = Instant::now();
        assert!(monitor.observe(true, now).is_some());
        assert!(monitor.observe(true, now).is_none());
        assert!(monitor.is_online());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
