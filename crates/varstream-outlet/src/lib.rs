//! `varstream-outlet` – the streaming side of the bridge.
//!
//! The bridge never talks to a transport directly. It asks an
//! [`OutletProvider`] for one [`StreamOutlet`] per variable and pushes one
//! sample per cycle into it.
//!
//! # Modules
//!
//! - [`outlet`] – the [`OutletProvider`] / [`StreamOutlet`] contract and the
//!   borrowed [`SampleRef`] pushed through it.
//! - [`bus`] – [`StreamBus`], an in-process provider built on Tokio
//!   broadcast channels. Every subscriber sees stream announcements and
//!   samples as [`BusMessage`]s.
//! - [`server`] – [`SampleServer`], a WebSocket endpoint that forwards bus
//!   traffic to network clients as JSON.

pub mod bus;
pub mod outlet;
pub mod server;

pub use bus::{BusMessage, SampleFrame, SampleValues, StreamBus};
pub use outlet::{OutletProvider, SampleRef, StreamOutlet};
pub use server::SampleServer;
