// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle manager: owns the table of live runners.

use crate::cancel::CancellationReason;
use crate::registry::{RegistryError, TapRegistry, TapStore, blocking};
use crate::runner::{self, Peers, RunnerSettings, RunningTap, StartError};
use etap_core::{LIST_PAGE_SIZE, TapDetails, TapListPage, TapOptions};
use etap_script::ScriptLimits;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors surfaced by [`TapManager`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The definition failed validation.
    #[error("invalid tap definition: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// No tap with this id exists.
    #[error("tap {0} not found")]
    NotFound(String),

    /// The registry could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] RegistryError),

    /// Runner pre-flight failed.
    #[error(transparent)]
    Start(#[from] StartError),
}

/// Starts, resumes and cancels tap runners against a [`TapRegistry`].
///
/// Holds at most one runner per tap id. The runner table is only locked for
/// single map operations, never across I/O.
pub struct TapManager {
    registry: TapRegistry,
    store: Arc<dyn TapStore>,
    peers: Peers,
    settings: RunnerSettings,
    limits: ScriptLimits,
    runners: Mutex<HashMap<String, RunningTap>>,
}

impl std::fmt::Debug for TapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapManager")
            .field("settings", &self.settings)
            .field("running", &self.running_count())
            .finish_non_exhaustive()
    }
}

impl TapManager {
    /// Build a manager. No runner is started until [`recover`](Self::recover)
    /// or [`create`](Self::create) is called.
    #[must_use]
    pub fn new(
        registry: TapRegistry,
        peers: Peers,
        settings: RunnerSettings,
        limits: ScriptLimits,
    ) -> Self {
        Self {
            store: Arc::new(registry.clone()),
            registry,
            peers,
            settings,
            limits,
            runners: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, RunningTap>> {
        self.runners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the registry on the blocking pool.
    async fn with_registry<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&TapRegistry) -> Result<T, RegistryError> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.registry.clone();
        blocking(move || f(&registry)).await
    }

    async fn start(&self, id: &str) -> Result<RunningTap, StartError> {
        runner::start(
            id,
            Arc::clone(&self.store),
            self.peers.clone(),
            self.settings,
            self.limits,
        )
        .await
    }

    /// Start a runner for every persisted tap that is not already running.
    ///
    /// Fail-fast: the first tap that cannot start aborts recovery, and every
    /// runner started by this call is cancelled again.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Storage`] if the id scan fails, [`ManagerError::Start`]
    /// for the first tap whose pre-flight fails.
    pub async fn recover(&self) -> Result<usize, ManagerError> {
        let ids = self.with_registry(TapRegistry::tap_ids).await?;
        let mut started = Vec::new();
        for id in ids {
            if self.table().contains_key(&id) {
                continue;
            }
            match self.start(&id).await {
                Ok(running) => {
                    self.table().insert(id.clone(), running);
                    started.push(id);
                }
                Err(e) => {
                    error!(target: "etap.manager", tap_id = %id, error = %e, "recovery aborted");
                    let mut table = self.table();
                    for id in &started {
                        if let Some(running) = table.remove(id) {
                            running.cancel(CancellationReason::RecoveryAborted);
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        info!(target: "etap.manager", recovered = started.len(), "recovery complete");
        Ok(started.len())
    }

    /// Validate, persist and start a new tap. Returns its id.
    ///
    /// The create is all-or-nothing: when pre-flight fails, the definition
    /// just written is deleted again.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Invalid`], [`ManagerError::Storage`] or
    /// [`ManagerError::Start`].
    pub async fn create(&self, options: TapOptions) -> Result<String, ManagerError> {
        options.validate().map_err(ManagerError::Invalid)?;

        let id = Uuid::now_v7().to_string();
        let name = options.name.clone();
        {
            let id = id.clone();
            self.with_registry(move |r| r.create(&id, &options)).await?;
        }

        match self.start(&id).await {
            Ok(running) => {
                self.table().insert(id.clone(), running);
                self.drop_if_deleted(&id).await;
                info!(target: "etap.manager", tap_id = %id, name = %name, "tap created");
                Ok(id)
            }
            Err(e) => {
                warn!(
                    target: "etap.manager",
                    tap_id = %id,
                    error = %e,
                    "pre-flight failed; removing definition"
                );
                let owned = id.clone();
                if let Err(cleanup) = self.with_registry(move |r| r.delete(&owned)).await {
                    error!(
                        target: "etap.manager",
                        tap_id = %id,
                        error = %cleanup,
                        "could not remove orphaned definition"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// A delete that lands while `create` is starting the runner finds no
    /// table entry; the runner inserted afterwards is removed here.
    async fn drop_if_deleted(&self, id: &str) {
        let owned = id.to_string();
        match self.with_registry(move |r| r.contains(&owned)).await {
            Ok(true) => {}
            Ok(false) => {
                if let Some(running) = self.table().remove(id) {
                    running.cancel(CancellationReason::Deleted);
                    info!(target: "etap.manager", tap_id = %id, "tap deleted during create");
                }
            }
            Err(e) => {
                warn!(
                    target: "etap.manager",
                    tap_id = %id,
                    error = %e,
                    "could not re-check new tap"
                );
            }
        }
    }

    /// Remove a tap and cancel its runner.
    ///
    /// A missing runner is not an error; the registry is authoritative.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] for an unknown id, [`ManagerError::Storage`]
    /// if the registry cannot be written.
    pub async fn delete(&self, id: &str) -> Result<(), ManagerError> {
        let owned = id.to_string();
        if !self.with_registry(move |r| r.delete(&owned)).await? {
            return Err(ManagerError::NotFound(id.to_string()));
        }
        let running = self.table().remove(id);
        match running {
            Some(running) => running.cancel(CancellationReason::Deleted),
            None => warn!(target: "etap.manager", tap_id = %id, "deleted tap had no runner"),
        }
        info!(target: "etap.manager", tap_id = %id, "tap deleted");
        Ok(())
    }

    /// One page of taps after `cursor`, [`LIST_PAGE_SIZE`] at a time.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Storage`] if the registry cannot be read.
    pub async fn list(&self, cursor: Option<&str>) -> Result<TapListPage, ManagerError> {
        let cursor = cursor.map(str::to_owned);
        let page = self
            .with_registry(move |r| r.list_page(cursor.as_deref(), LIST_PAGE_SIZE))
            .await?;
        Ok(page)
    }

    /// Number of persisted taps, running or not.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Storage`] if the registry cannot be read.
    pub async fn count(&self) -> Result<usize, ManagerError> {
        Ok(self.with_registry(TapRegistry::len).await?)
    }

    /// Persisted state of a tap plus live runner counters.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Storage`] if the registry cannot be read.
    pub async fn get(&self, id: &str) -> Result<Option<TapDetails>, ManagerError> {
        let owned = id.to_string();
        let Some(mut details) = self.with_registry(move |r| r.details(&owned)).await? else {
            return Ok(None);
        };
        if let Some(running) = self.table().get(id) {
            details.running = !running.is_finished();
            details.stats = Some(running.stats().snapshot());
        }
        Ok(Some(details))
    }

    /// Number of runners in the table.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.table().len()
    }

    /// `true` if a runner for `id` is in the table.
    #[must_use]
    pub fn is_running(&self, id: &str) -> bool {
        self.table().contains_key(id)
    }

    /// The registry this manager writes to.
    #[must_use]
    pub fn registry(&self) -> &TapRegistry {
        &self.registry
    }

    /// Cancel every runner and wait up to `grace` for them to exit.
    ///
    /// Taps stay in the registry and resume on the next [`recover`](Self::recover).
    pub async fn shutdown(&self, grace: Duration) {
        let runners: Vec<RunningTap> = self.table().drain().map(|(_, r)| r).collect();
        let count = runners.len();
        for running in &runners {
            running.cancel(CancellationReason::SystemShutdown);
        }
        let joined = futures::future::join_all(runners.into_iter().map(RunningTap::join));
        if tokio::time::timeout(grace, joined).await.is_err() {
            warn!(
                target: "etap.manager",
                grace_ms = grace.as_millis() as u64,
                "runners still busy after grace period"
            );
        }
        info!(target: "etap.manager", stopped = count, "all runners cancelled");
    }
}
