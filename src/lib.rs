// SPDX-License-Identifier: MIT OR Apache-2.0
//! event-tap
//!
//! Scripted event taps: each tap polls an upstream event source, runs the
//! batch through a user-supplied `mapEvents` script and posts the result to
//! a webhook, checkpointing the last processed event id.
//!
//! This crate re-exports the workspace members:
//!
//! - [`model`]: tap definitions and control-plane payloads
//! - [`store`]: transactional path-keyed key-value store
//! - [`script`]: per-tap script engine
//! - [`runtime`]: registry, runner loop and lifecycle manager
//! - [`config`]: daemon configuration
//! - [`daemon`]: HTTP control plane
//! - [`client`]: control-plane client
#![deny(unsafe_code)]

pub use etap_client as client;
pub use etap_config as config;
pub use etap_core as model;
pub use etap_daemon as daemon;
pub use etap_runtime as runtime;
pub use etap_script as script;
pub use etap_store as store;

pub use etap_core::{TapDetails, TapListEntry, TapListPage, TapOptions};
pub use etap_runtime::{TapManager, TapRegistry};
