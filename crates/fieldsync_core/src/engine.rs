//! Engine assembly and background task ownership.
//!
//! # Responsibility
//! - Wire config, local storage, remote store and connectivity into one
//!   `EngineContext` shared by the submission service and sync coordinator.
//! - Own the background tasks: connectivity driver, reconnect flush and the
//!   periodic safety-net flush.
//!
//! # Invariants
//! - Exactly one coordinator and one queue exist per engine.
//! - `shutdown` aborts every spawned task; queued entries stay durable.

use crate::config::{ConfigError, EngineConfig};
use crate::connectivity::{ConnectivityMonitor, TransitionSubscription};
use crate::context::EngineContext;
use crate::model::record::{FormType, RecordDate};
use crate::model::subject::MonitoredSubject;
use crate::queue::LocalPendingQueue;
use crate::remote::{RecordRepository, RemoteResult};
use crate::report::DailyReport;
use crate::service::SubmissionService;
use crate::storage::KeyValueStore;
use crate::sync::SyncCoordinator;
use log::{error, info};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine requires a local key/value store")]
    MissingStore,
    #[error("engine requires a remote record repository")]
    MissingRepository,
}

#[derive(Default)]
pub struct SyncEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    repo: Option<Arc<dyn RecordRepository>>,
    initial_online: bool,
}

impl SyncEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn repository(mut self, repo: Arc<dyn RecordRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Connectivity assumed until the first committed transition.
    pub fn initially_online(mut self, online: bool) -> Self {
        self.initial_online = online;
        self
    }

    pub fn build(self) -> Result<SyncEngine, EngineError> {
        self.config.validate()?;
        let store = self.store.ok_or(EngineError::MissingStore)?;
        let repo = self.repo.ok_or(EngineError::MissingRepository)?;

        let queue = Arc::new(LocalPendingQueue::new(
            store,
            self.config.queue_storage_key.clone(),
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(
            self.initial_online,
            self.config.stability_window(),
        ));
        let ctx = Arc::new(EngineContext::new(
            queue,
            repo,
            monitor,
            self.config.remote_timeout(),
            self.config.record_temperature_history,
        ));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&ctx),
            self.config.notice_capacity,
        ));
        let service = SubmissionService::new(Arc::clone(&ctx));

        info!(
            "event=engine_build module=engine status=ok online={} stability_window_ms={} remote_timeout_ms={} periodic_flush_secs={:?}",
            self.initial_online,
            self.config.stability_window_ms,
            self.config.remote_timeout_ms,
            self.config.periodic_flush_secs
        );
        Ok(SyncEngine {
            config: self.config,
            ctx,
            coordinator,
            service,
            tasks: Mutex::new(RunningTasks::default()),
        })
    }
}

#[derive(Default)]
struct RunningTasks {
    handles: Vec<JoinHandle<()>>,
    reconnect: Option<TransitionSubscription>,
}

/// Offline-first submission and sync engine.
pub struct SyncEngine {
    config: EngineConfig,
    ctx: Arc<EngineContext>,
    coordinator: Arc<SyncCoordinator>,
    service: SubmissionService,
    tasks: Mutex<RunningTasks>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn service(&self) -> &SubmissionService {
        &self.service
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.ctx.monitor
    }

    /// Spawns the background tasks, driven by raw reachability samples.
    ///
    /// When already online, queued entries left by a previous run are
    /// flushed immediately. A second call is ignored.
    pub fn start(&self, source: mpsc::Receiver<bool>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.handles.is_empty() {
            info!("event=engine_start module=engine status=skip reason=already_started");
            return;
        }

        let (reconnect, subscription) = Arc::clone(&self.coordinator).spawn_on_reconnect();
        tasks.handles.push(reconnect);
        tasks.reconnect = Some(subscription);
        tasks
            .handles
            .push(Arc::clone(&self.ctx.monitor).spawn(source));
        if let Some(every) = self.config.periodic_flush() {
            tasks
                .handles
                .push(Arc::clone(&self.coordinator).spawn_periodic(every));
        }
        if self.ctx.monitor.is_online() {
            let coordinator = Arc::clone(&self.coordinator);
            tasks.handles.push(tokio::spawn(async move {
                if let Err(err) = coordinator.flush().await {
                    error!(
                        "event=flush module=sync status=error trigger=startup error={}",
                        err
                    );
                }
            }));
        }
        info!(
            "event=engine_start module=engine status=ok tasks={}",
            tasks.handles.len()
        );
    }

    /// Stops every background task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscription) = tasks.reconnect.take() {
            self.ctx.monitor.unsubscribe(subscription);
        }
        let stopped = tasks.handles.len();
        for handle in tasks.handles.drain(..) {
            handle.abort();
        }
        info!(
            "event=engine_shutdown module=engine status=ok tasks={}",
            stopped
        );
    }

    /// Builds the daily report for `subjects` from the remote store.
    pub async fn daily_report(
        &self,
        form_type: FormType,
        date: RecordDate,
        subjects: &[MonitoredSubject],
    ) -> RemoteResult<DailyReport> {
        DailyReport::collect(
            self.ctx.repo.as_ref(),
            self.ctx.remote_timeout,
            form_type,
            date,
            subjects,
        )
        .await
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in tasks.handles.drain(..) {
            handle.abort();
        }
    }
}
