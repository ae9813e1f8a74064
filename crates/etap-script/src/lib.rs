// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedded ECMAScript host for tap transforms.
//!
//! Each tap owns one [`ScriptEngine`]: a `boa_engine` context living on its
//! own OS thread (contexts are `!Send`). The script is compiled and its top
//! level evaluated once; afterwards every [`map_events`](Transform::map_events)
//! call is shipped to the thread as a job and answered over a one-shot
//! channel. No host objects are registered, so scripts only see ECMAScript
//! built-ins.
//!
//! The transform receives the batch as an array of `[id, payload]` pairs and
//! returns an array of arbitrary JSON-representable values:
//!
//! ```js
//! function mapEvents(batch) {
//!   return batch.map(([id, evt]) => evt);
//! }
//! ```
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use boa_engine::{Context, JsObject, JsValue, Script, Source};
use etap_core::ENTRY_POINT;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while compiling or invoking a transform script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// The source text is not valid ECMAScript.
    #[error("parse error: {0}")]
    Parse(String),

    /// Evaluating the top level of the script threw.
    #[error("evaluation error: {0}")]
    Evaluate(String),

    /// The script does not define a callable `mapEvents`.
    #[error("{ENTRY_POINT} is not defined")]
    MissingEntryPoint,

    /// `mapEvents` threw or hit a runtime limit.
    #[error("{0}")]
    Invoke(String),

    /// `mapEvents` returned something that is not an array of JSON values.
    #[error("{0}")]
    Export(String),

    /// The host thread could not be started or has gone away.
    #[error("script host unavailable: {0}")]
    HostUnavailable(String),
}

impl ScriptError {
    /// `true` for errors raised while marshalling the return value.
    #[must_use]
    pub fn is_export(&self) -> bool {
        matches!(self, Self::Export(_))
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Runtime limits applied to a script context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Maximum iterations of any single loop before the script is aborted.
    pub loop_iteration_limit: u64,
    /// Maximum call depth.
    pub recursion_limit: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
        }
    }
}

// ---------------------------------------------------------------------------
// Transform seam
// ---------------------------------------------------------------------------

/// A compiled batch transform.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Map a polled batch to the values that should be delivered.
    ///
    /// `ids` and `events` are parallel slices of equal length.
    async fn map_events(&self, ids: &[String], events: &[Value]) -> Result<Vec<Value>, ScriptError>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Job {
    batch: Value,
    reply: oneshot::Sender<Result<Vec<Value>, ScriptError>>,
}

/// Handle to a compiled script hosted on its own thread.
///
/// Dropping the handle stops the thread once any in-flight job completes.
pub struct ScriptEngine {
    label: String,
    jobs: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// Compile `source`, evaluate its top level and resolve `mapEvents`.
    ///
    /// `label` names the host thread (`etap-script-<label>`) and appears in
    /// logs; the tap id is the natural choice.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Parse`], [`ScriptError::Evaluate`] or
    /// [`ScriptError::MissingEntryPoint`] when the script is unusable;
    /// [`ScriptError::HostUnavailable`] when the thread cannot be spawned.
    pub async fn compile(
        label: &str,
        source: &str,
        limits: ScriptLimits,
    ) -> Result<Self, ScriptError> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let source = source.to_string();
        let thread_label = label.to_string();

        thread::Builder::new()
            .name(format!("etap-script-{label}"))
            .spawn(move || host_main(&thread_label, &source, limits, ready_tx, job_rx))
            .map_err(|e| ScriptError::HostUnavailable(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| {
                ScriptError::HostUnavailable("host thread exited during compile".into())
            })??;

        debug!(target: "etap.script", label, "compiled transform");
        Ok(Self {
            label: label.to_string(),
            jobs: job_tx,
        })
    }

    /// Label given at compile time.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl Transform for ScriptEngine {
    async fn map_events(
        &self,
        ids: &[String],
        events: &[Value],
    ) -> Result<Vec<Value>, ScriptError> {
        let batch = Value::Array(
            ids.iter()
                .zip(events)
                .map(|(id, evt)| Value::Array(vec![Value::String(id.clone()), evt.clone()]))
                .collect(),
        );
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { batch, reply })
            .map_err(|_| ScriptError::HostUnavailable("host thread stopped".into()))?;
        rx.await
            .map_err(|_| ScriptError::HostUnavailable("host thread dropped the job".into()))?
    }
}

// ---------------------------------------------------------------------------
// Host thread
// ---------------------------------------------------------------------------

fn host_main(
    label: &str,
    source: &str,
    limits: ScriptLimits,
    ready: oneshot::Sender<Result<(), ScriptError>>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(limits.loop_iteration_limit);
    context
        .runtime_limits_mut()
        .set_recursion_limit(limits.recursion_limit);

    let compiled = exporter(&mut context)
        .and_then(|export| load(&mut context, source).map(|entry| (entry, export)));
    let (entry, export) = match compiled {
        Ok(compiled) => compiled,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Some(job) = jobs.blocking_recv() {
        let out = panic::catch_unwind(AssertUnwindSafe(|| {
            invoke(&mut context, &entry, &export, &job.batch)
        }))
        .unwrap_or_else(|payload| {
            Err(ScriptError::Export(format!(
                "engine panicked: {}",
                panic_message(payload.as_ref())
            )))
        });
        if let Err(e) = &out {
            warn!(target: "etap.script", label, error = %e, "transform failed");
        }
        let _ = job.reply.send(out);
    }
    debug!(target: "etap.script", label, "host thread stopping");
}

/// Serializes a result with `undefined` exported as `null`, both as an array
/// element and as a property value. Bound before user code runs so a script
/// that replaces `JSON` cannot change the wire format.
const EXPORTER: &str =
    "((stringify) => (v) => stringify(v, (k, x) => x === undefined ? null : x))(JSON.stringify)";

fn exporter(context: &mut Context) -> Result<JsObject, ScriptError> {
    context
        .eval(Source::from_bytes(EXPORTER))
        .ok()
        .and_then(|f| f.as_callable().cloned())
        .ok_or_else(|| ScriptError::HostUnavailable("could not install the exporter".into()))
}

fn load(context: &mut Context, source: &str) -> Result<JsObject, ScriptError> {
    let script = Script::parse(Source::from_bytes(source), None, context)
        .map_err(|e| ScriptError::Parse(e.to_string()))?;
    script
        .evaluate(context)
        .map_err(|e| ScriptError::Evaluate(e.to_string()))?;

    // Resolving the bare identifier also finds `let`/`const` bindings, which
    // are not properties of the global object.
    let entry = context
        .eval(Source::from_bytes(ENTRY_POINT))
        .map_err(|_| ScriptError::MissingEntryPoint)?;
    entry
        .as_callable()
        .cloned()
        .ok_or(ScriptError::MissingEntryPoint)
}

fn invoke(
    context: &mut Context,
    entry: &JsObject,
    exporter: &JsObject,
    batch: &Value,
) -> Result<Vec<Value>, ScriptError> {
    let arg = JsValue::from_json(batch, context)
        .map_err(|e| ScriptError::Invoke(format!("could not marshal batch: {e}")))?;
    let result = entry
        .call(&JsValue::undefined(), &[arg], context)
        .map_err(|e| ScriptError::Invoke(e.to_string()))?;
    export(context, exporter, &result)
}

fn export(
    context: &mut Context,
    exporter: &JsObject,
    value: &JsValue,
) -> Result<Vec<Value>, ScriptError> {
    if value.is_null_or_undefined() {
        return Ok(Vec::new());
    }
    let is_array = value.as_object().is_some_and(|o| o.is_array());
    if !is_array {
        return Err(ScriptError::Export(format!(
            "{ENTRY_POINT} returned {}, expected an array",
            kind(value)
        )));
    }
    // Cycles and BigInts make JSON.stringify throw.
    let text = exporter
        .call(&JsValue::undefined(), &[value.clone()], context)
        .map_err(|e| ScriptError::Export(e.to_string()))?;
    let Some(text) = text.as_string() else {
        return Err(ScriptError::Export(format!(
            "{ENTRY_POINT} result has no JSON form"
        )));
    };
    match serde_json::from_str(&text.to_std_string_escaped()) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(other) => Err(ScriptError::Export(format!(
            "{ENTRY_POINT} result exported as {other}, expected an array"
        ))),
        Err(e) => Err(ScriptError::Export(e.to_string())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn kind(value: &JsValue) -> &'static str {
    if value.is_boolean() {
        "a boolean"
    } else if value.is_number() {
        "a number"
    } else if value.is_string() {
        "a string"
    } else if value.is_callable() {
        "a function"
    } else if value.is_object() {
        "an object"
    } else {
        "a primitive"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
