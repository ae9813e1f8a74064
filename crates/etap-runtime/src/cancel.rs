// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for tap runners.
//!
//! A [`CancellationToken`] is shared between a runner task and the
//! [`RunningTap`](crate::RunningTap) handle the manager keeps. The first
//! [`cancel`](CancellationToken::cancel) records why the runner stopped;
//! later calls are no-ops.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

/// Why a runner was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// The tap was deleted through the control plane.
    Deleted,
    /// The process is shutting down; the tap resumes on next start.
    SystemShutdown,
    /// Startup recovery was aborted after another tap failed to start.
    RecoveryAborted,
}

impl CancellationReason {
    /// Short description used in logs.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Deleted => "tap deleted",
            Self::SystemShutdown => "daemon shutting down",
            Self::RecoveryAborted => "startup recovery failed",
        }
    }
}

/// Shared stop signal carrying the reason it fired with.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    reason: OnceLock<CancellationReason>,
    fired: watch::Sender<bool>,
}

impl CancellationToken {
    /// A token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (fired, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                reason: OnceLock::new(),
                fired,
            }),
        }
    }

    /// Fire the token. Returns `false` if it had already fired, in which
    /// case the earlier reason is kept.
    pub fn cancel(&self, reason: CancellationReason) -> bool {
        let first = self.inner.reason.set(reason).is_ok();
        // send_replace also succeeds while nobody is waiting.
        self.inner.fired.send_replace(true);
        first
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason recorded by the first [`cancel`](Self::cancel).
    #[must_use]
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.get().copied()
    }

    /// Resolves once the token has fired.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.fired.subscribe();
        // The sender lives as long as `self`, so this only returns on fire.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Sleep for `delay` unless the token fires first.
    ///
    /// Returns `true` when the wait ended because of cancellation.
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancelled() => true,
            () = tokio::time::sleep(delay) => self.is_cancelled(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}
