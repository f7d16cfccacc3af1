//! `varstream-core` – the variable bridge registry.
//!
//! Turns named variables of a [`VariableSpace`][varstream_space::VariableSpace]
//! into outbound streams and keeps them in step with the space, one
//! processing cycle at a time.
//!
//! # Modules
//!
//! - [`adapter`] – [`BridgeAdapter`]: one exported variable bound to its
//!   stream; reads the variable's memory and pushes it as a sample.
//! - [`factory`] – [`build_adapter`]: dispatches on the type tag and opens
//!   the stream with the right metadata.
//! - [`registry`] – [`BridgeRegistry`]: name → adapter map plus the
//!   per-cycle reconciliation against the live catalogue.
//! - [`gate`] – [`Throttle`] and [`EmissionGate`]: skip counting and the
//!   one-time real-time thread check.
//! - [`sched`] – scheduling-policy probe of the calling thread.
//!
//! # Per-cycle flow
//!
//! ```text
//! EmissionGate::admit ─► BridgeRegistry::reconcile ─► Throttle::tick ─► send_frame × N
//! ```

pub mod adapter;
pub mod factory;
pub mod gate;
pub mod registry;
pub mod sched;

pub use adapter::{BridgeAdapter, SampleLayout};
pub use factory::{StreamContext, build_adapter, stream_info_for};
pub use gate::{EmissionGate, SchedProbe, Throttle};
pub use registry::{BridgeRegistry, RebuildReason, ReconcileStats};
pub use sched::{SchedPolicy, current_policy};
