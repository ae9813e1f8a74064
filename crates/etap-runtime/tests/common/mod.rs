// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test doubles shared by the runtime integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use etap_core::TapOptions;
use etap_runtime::{
    DeliveryError, EventBatch, EventSource, MemoryEventSource, Peers, RegistryError,
    RunnerSettings, SourceError, TapRegistry, TapStore, WebhookSink,
};
use etap_store::Store;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PASS_THROUGH: &str = "function mapEvents(batch) { return batch.map(p => p[1]); }";
pub const DROP_ALL: &str = "function mapEvents(batch) { return []; }";
pub const HOOK: &str = "http://receiver.invalid/hook";

pub fn options(code: &str) -> TapOptions {
    TapOptions {
        name: "test-tap".into(),
        code: code.into(),
        webhook_url: HOOK.into(),
        batch_limit: 10,
    }
}

pub fn registry() -> TapRegistry {
    let reg = TapRegistry::new(Store::open_in_memory().unwrap());
    reg.init().unwrap();
    reg
}

pub fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        retry_delay: Duration::from_millis(10),
        idle_poll_interval: Duration::from_millis(5),
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn eventually<F>(mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// [`eventually`] for conditions that have to await.
pub async fn eventually_async<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond().await
}

/// Give running loops a chance to misbehave.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub async fn with_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Records every delivery; can be told to reject the next N.
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<(String, Vec<Value>)>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn bodies(&self) -> Vec<Vec<Value>> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, url: &str, values: &[Value]) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Status {
                status: 500,
                body: "rejected".into(),
            });
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((url.to_string(), values.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A [`MemoryEventSource`] that can be told to fail the next N polls.
#[derive(Default)]
pub struct FlakySource {
    pub inner: MemoryEventSource,
    fail_next: AtomicUsize,
    polls: AtomicUsize,
}

impl FlakySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: Value) -> String {
        self.inner.push(event)
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FlakySource {
    async fn poll(&self, after: &str, limit: usize) -> Result<EventBatch, SourceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Malformed("source unavailable".into()));
        }
        self.inner.poll(after, limit).await
    }
}

pub fn peers(source: &Arc<FlakySource>, sink: &Arc<RecordingSink>) -> Peers {
    Peers {
        source: Arc::clone(source) as Arc<dyn EventSource>,
        sink: Arc::clone(sink) as Arc<dyn WebhookSink>,
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Wraps a registry, records checkpoint/status writes, can fail the next N
/// checkpoint writes and can make writes block the calling thread.
pub struct FlakyStore {
    pub inner: TapRegistry,
    fail_checkpoints: AtomicUsize,
    write_delay_ms: AtomicU64,
    writing: AtomicBool,
    checkpoints: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(inner: TapRegistry) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_checkpoints: AtomicUsize::new(0),
            write_delay_ms: AtomicU64::new(0),
            writing: AtomicBool::new(false),
            checkpoints: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_checkpoints(&self, n: usize) {
        self.fail_checkpoints.store(n, Ordering::SeqCst);
    }

    /// Every later write sleeps `delay` on the calling thread.
    pub fn slow_writes(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// `true` while a slowed write is sleeping.
    pub fn is_writing(&self) -> bool {
        self.writing.load(Ordering::SeqCst)
    }

    fn stall(&self) {
        let ms = self.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            self.writing.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(ms));
            self.writing.store(false, Ordering::SeqCst);
        }
    }

    pub fn checkpoint_history(&self) -> Vec<String> {
        self.checkpoints.lock().unwrap().clone()
    }

    pub fn status_history(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl TapStore for FlakyStore {
    fn definition(&self, id: &str) -> Result<TapOptions, RegistryError> {
        self.inner.definition(id)
    }

    fn checkpoint(&self, id: &str) -> Result<String, RegistryError> {
        self.inner.checkpoint(id)
    }

    fn set_checkpoint(&self, id: &str, cursor: &str) -> Result<(), RegistryError> {
        let remaining = self.fail_checkpoints.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_checkpoints.store(remaining - 1, Ordering::SeqCst);
            return Err(RegistryError::Store(etap_store::StoreError::LockPoisoned));
        }
        self.stall();
        self.inner.set_checkpoint(id, cursor)?;
        self.checkpoints.lock().unwrap().push(cursor.to_string());
        Ok(())
    }

    fn set_status(&self, id: &str, status: &str) -> Result<(), RegistryError> {
        self.stall();
        self.inner.set_status(id, status)?;
        self.statuses.lock().unwrap().push(status.to_string());
        Ok(())
    }
}
