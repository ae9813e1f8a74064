// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-tap poll → transform → deliver → checkpoint loop.
//!
//! [`start`] performs the pre-flight checks (definition readable, script
//! compiles and defines `mapEvents`, checkpoint readable) before returning
//! and only then spawns the loop, so callers learn about broken taps
//! immediately. Once running, a tap never fails: every iteration error is
//! written to the tap's `status`, counted in [`RunnerStats`], and retried
//! after [`RunnerSettings::retry_delay`] until the runner is cancelled.
//!
//! Iterations are strictly sequential. The checkpoint is only advanced after
//! the batch it covers has been delivered (or produced no output), which
//! gives at-least-once delivery with a monotonic checkpoint.
//!
//! Store reads and writes run on the blocking pool, so a slow disk stalls
//! only the tap doing the write.

use crate::cancel::{CancellationReason, CancellationToken};
use crate::registry::{RegistryError, TapStore, blocking};
use crate::source::{EventSource, SourceError};
use crate::stats::RunnerStats;
use crate::webhook::{DeliveryError, WebhookSink};
use etap_core::TapOptions;
use etap_script::{ScriptEngine, ScriptError, ScriptLimits, Transform};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, info, warn};

/// Status recorded after a successful iteration.
pub const STATUS_OK: &str = "ok";

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Wait after a failed iteration before polling again.
    pub retry_delay: Duration,
    /// Wait after an empty poll; zero polls again immediately.
    pub idle_poll_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            idle_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Network peers shared by every runner.
#[derive(Clone)]
pub struct Peers {
    /// Upstream event source.
    pub source: Arc<dyn EventSource>,
    /// Webhook delivery.
    pub sink: Arc<dyn WebhookSink>,
}

impl std::fmt::Debug for Peers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peers").finish_non_exhaustive()
    }
}

/// Pre-flight failures. The tap is not run.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The definition could not be loaded.
    #[error("could not load definition of tap {id}: {source}")]
    Definition {
        /// Tap id.
        id: String,
        /// Underlying failure.
        source: RegistryError,
    },

    /// The script failed to compile or lacks `mapEvents`.
    #[error("could not compile script of tap {id}: {source}")]
    Script {
        /// Tap id.
        id: String,
        /// Underlying failure.
        source: ScriptError,
    },

    /// The checkpoint could not be loaded.
    #[error("could not load checkpoint of tap {id}: {source}")]
    Checkpoint {
        /// Tap id.
        id: String,
        /// Underlying failure.
        source: RegistryError,
    },
}

/// A live runner: its cancellation handle, counters and task.
#[derive(Debug)]
pub struct RunningTap {
    id: String,
    token: CancellationToken,
    stats: Arc<RunnerStats>,
    task: JoinHandle<()>,
}

impl RunningTap {
    /// Tap id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ask the loop to stop. Fire-and-forget.
    pub fn cancel(&self, reason: CancellationReason) {
        debug!(
            target: "etap.runner",
            tap_id = %self.id,
            reason = reason.description(),
            "cancel requested"
        );
        self.token.cancel(reason);
    }

    /// Why the runner was cancelled, if it was.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancellationReason> {
        self.token.reason()
    }

    /// Counters of this runner.
    #[must_use]
    pub fn stats(&self) -> &Arc<RunnerStats> {
        &self.stats
    }

    /// `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(target: "etap.runner", tap_id = %self.id, error = %e, "runner task panicked");
        }
    }
}

/// Load, compile and launch the runner for `id`.
///
/// Returns as soon as the pre-flight checks pass; the loop runs on its own
/// task.
///
/// # Errors
///
/// Returns [`StartError`] when the definition cannot be read, the script does
/// not compile or define `mapEvents`, or the checkpoint cannot be read.
pub async fn start(
    id: &str,
    store: Arc<dyn TapStore>,
    peers: Peers,
    settings: RunnerSettings,
    limits: ScriptLimits,
) -> Result<RunningTap, StartError> {
    let options = {
        let (store, owned) = (Arc::clone(&store), id.to_string());
        blocking(move || store.definition(&owned))
            .await
            .map_err(|source| StartError::Definition {
                id: id.to_string(),
                source,
            })?
    };
    let engine = ScriptEngine::compile(id, &options.code, limits)
        .await
        .map_err(|source| StartError::Script {
            id: id.to_string(),
            source,
        })?;
    start_with_transform(id, options, Arc::new(engine), store, peers, settings).await
}

/// Launch a runner with an already-compiled transform.
///
/// # Errors
///
/// Returns [`StartError::Checkpoint`] when the checkpoint cannot be read.
pub async fn start_with_transform(
    id: &str,
    options: TapOptions,
    transform: Arc<dyn Transform>,
    store: Arc<dyn TapStore>,
    peers: Peers,
    settings: RunnerSettings,
) -> Result<RunningTap, StartError> {
    let checkpoint = {
        let (store, owned) = (Arc::clone(&store), id.to_string());
        blocking(move || store.checkpoint(&owned))
            .await
            .map_err(|source| StartError::Checkpoint {
                id: id.to_string(),
                source,
            })?
    };

    let token = CancellationToken::new();
    let stats = Arc::new(RunnerStats::new());
    let runner = Runner {
        id: id.to_string(),
        options,
        transform,
        store,
        peers,
        settings,
        stats: Arc::clone(&stats),
        checkpoint,
        last_status: None,
    };
    let task = tokio::spawn(runner.run(token.clone()));

    Ok(RunningTap {
        id: id.to_string(),
        token,
        stats,
        task,
    })
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum IterationError {
    #[error("could not poll events: {0}")]
    Poll(SourceError),
    #[error("mapEvents failed: {0}")]
    Transform(ScriptError),
    #[error("exportValues failed: {0}")]
    Export(ScriptError),
    #[error("postWebhook failed: {0}")]
    Deliver(DeliveryError),
    #[error("updating last id failed: {0}")]
    Checkpoint(RegistryError),
    #[error("tap no longer exists")]
    TapGone,
}

enum Progress {
    /// The poll came back empty.
    Idle,
    /// A batch was processed and the checkpoint moved.
    Advanced,
}

struct Runner {
    id: String,
    options: TapOptions,
    transform: Arc<dyn Transform>,
    store: Arc<dyn TapStore>,
    peers: Peers,
    settings: RunnerSettings,
    stats: Arc<RunnerStats>,
    checkpoint: String,
    /// Last status successfully written; identical statuses are not rewritten.
    last_status: Option<String>,
}

impl Runner {
    async fn run(mut self, token: CancellationToken) {
        info!(
            target: "etap.runner",
            tap_id = %self.id,
            checkpoint = %self.checkpoint,
            "runner started"
        );
        while !token.is_cancelled() {
            let span = debug_span!("iteration", tap_id = %self.id);
            let wait = match self.iterate().instrument(span).await {
                Ok(Progress::Advanced) => None,
                Ok(Progress::Idle) => {
                    Some(self.settings.idle_poll_interval).filter(|d| !d.is_zero())
                }
                Err(IterationError::TapGone) => {
                    info!(target: "etap.runner", tap_id = %self.id, "tap deleted; runner stopping");
                    break;
                }
                Err(e) => {
                    self.fail(&e).await;
                    Some(self.settings.retry_delay)
                }
            };
            if let Some(delay) = wait {
                if token.sleep(delay).await {
                    break;
                }
            }
        }
        info!(
            target: "etap.runner",
            tap_id = %self.id,
            checkpoint = %self.checkpoint,
            "runner stopped"
        );
    }

    async fn iterate(&mut self) -> Result<Progress, IterationError> {
        self.stats.record_iteration();

        let batch = self
            .peers
            .source
            .poll(&self.checkpoint, self.options.batch_limit)
            .await
            .map_err(IterationError::Poll)?;
        self.stats.record_poll(batch.len());
        let Some(last) = batch.last_id().map(str::to_string) else {
            self.succeed().await;
            return Ok(Progress::Idle);
        };

        let values = self
            .transform
            .map_events(&batch.ids, &batch.events)
            .await
            .map_err(|e| {
                if e.is_export() {
                    IterationError::Export(e)
                } else {
                    IterationError::Transform(e)
                }
            })?;

        if !values.is_empty() {
            self.peers
                .sink
                .deliver(&self.options.webhook_url, &values)
                .await
                .map_err(IterationError::Deliver)?;
            self.stats.record_delivery(values.len());
            debug!(
                target: "etap.runner",
                events = batch.len(),
                values = values.len(),
                "delivered batch"
            );
        }

        let written = {
            let (store, id, last) = (Arc::clone(&self.store), self.id.clone(), last.clone());
            blocking(move || store.set_checkpoint(&id, &last)).await
        };
        match written {
            Ok(()) => {}
            Err(RegistryError::NotFound(_)) => return Err(IterationError::TapGone),
            Err(e) => return Err(IterationError::Checkpoint(e)),
        }
        debug!(target: "etap.runner", from = %self.checkpoint, to = %last, "checkpoint advanced");
        self.checkpoint = last;
        self.succeed().await;
        Ok(Progress::Advanced)
    }

    async fn succeed(&mut self) {
        self.stats.record_success();
        self.record_status(STATUS_OK).await;
    }

    async fn fail(&mut self, error: &IterationError) {
        let message = error.to_string();
        let consecutive = self.stats.record_failure(&message);
        warn!(
            target: "etap.runner",
            tap_id = %self.id,
            consecutive_failures = consecutive,
            retry_in_ms = self.settings.retry_delay.as_millis() as u64,
            error = %message,
            "iteration failed"
        );
        self.record_status(&message).await;
    }

    async fn record_status(&mut self, status: &str) {
        if self.last_status.as_deref() == Some(status) {
            return;
        }
        let written = {
            let (store, id, text) = (Arc::clone(&self.store), self.id.clone(), status.to_string());
            blocking(move || store.set_status(&id, &text)).await
        };
        match written {
            Ok(()) => self.last_status = Some(status.to_string()),
            Err(RegistryError::NotFound(_)) => {
                debug!(
                    target: "etap.runner",
                    tap_id = %self.id,
                    "status not recorded; tap deleted"
                );
            }
            Err(e) => {
                warn!(
                    target: "etap.runner",
                    tap_id = %self.id,
                    error = %e,
                    "could not record status"
                );
            }
        }
    }
}
