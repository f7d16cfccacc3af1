//! `varstream-runtime` – the bridge as a host pipeline plugin.
//!
//! # Modules
//!
//! - [`plugin`] – [`BridgePlugin`][plugin::BridgePlugin] with the host
//!   lifecycle (`prepare` / `process` / `release`) and the thread-safe
//!   [`BridgeControl`][plugin::BridgeControl] handle for live parameter
//!   changes.
//! - [`settings`] – [`BridgeSettings`][settings::BridgeSettings], the
//!   plugin's parameters, and [`PipelineShape`][settings::PipelineShape].
//! - [`config_slot`] – [`ConfigSlot`][config_slot::ConfigSlot]: hands a
//!   freshly built registry from the control thread to the processing
//!   thread without blocking the latter.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.
//!
//! # Threads
//!
//! `prepare` and `release` run on the control thread, `process` on the
//! processing thread. Parameter writes go through [`BridgeControl`] from any
//! thread; structural changes are built there and picked up by the next
//! `process` call.

pub mod config_slot;
pub mod plugin;
pub mod settings;
pub mod telemetry;

pub use config_slot::ConfigSlot;
pub use plugin::{BridgeControl, BridgePlugin};
pub use settings::{BridgeSettings, PipelineShape};
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing, init_tracing_with};
