//! [`BridgePlugin`] – the bridge inside a host processing pipeline.
//!
//! # Lifecycle
//!
//! | Call | Thread | Effect |
//! |---|---|---|
//! | [`prepare`][BridgePlugin::prepare] | control | lock `vars` / `rt_strict`, discover names if `vars` is empty, build the registry, arm the safety check |
//! | [`process`][BridgePlugin::process] | processing | safety check (first cycle only), pick up a rebuilt registry, reconcile and send |
//! | [`release`][BridgePlugin::release] | control | drop the registry, unlock, re-arm the safety check |
//!
//! Parameters are changed through a [`BridgeControl`] handle, which may live
//! on any thread. While prepared, `vars` and `rt_strict` are locked; changing
//! `source_id` or `skip` builds a new registry on the calling thread and
//! hands it to the processing thread through a [`ConfigSlot`]. `activate`
//! takes effect on the next cycle without touching the streams.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use varstream_outlet::StreamBus;
//! use varstream_runtime::{BridgePlugin, BridgeSettings, PipelineShape};
//! use varstream_space::{Catalogue, SimVariableSpace, VarBuffer};
//!
//! let space = Arc::new(SimVariableSpace::new().with("level", VarBuffer::Float32(vec![0.0; 4])));
//! let bus = StreamBus::default();
//! let mut plugin = BridgePlugin::new(
//!     BridgeSettings { rt_strict: false, ..BridgeSettings::default() },
//!     Catalogue::new(space),
//!     Arc::new(bus.clone()),
//! );
//!
//! plugin.prepare(PipelineShape::new(48000.0, 480)).unwrap();
//! assert_eq!(plugin.control().settings().vars, vec!["level"]);
//! plugin.process().unwrap();
//! plugin.release();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use varstream_core::{BridgeRegistry, EmissionGate, SchedProbe, StreamContext};
use varstream_outlet::OutletProvider;
use varstream_space::Catalogue;
use varstream_types::{BridgeError, Result};

use crate::config_slot::ConfigSlot;
use crate::settings::{BridgeSettings, PipelineShape, validate_vars};

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ControlState {
    settings: BridgeSettings,
    /// `Some` while prepared.
    shape: Option<PipelineShape>,
}

struct Shared {
    state: Mutex<ControlState>,
    activate: AtomicBool,
    slot: ConfigSlot<BridgeRegistry>,
    catalogue: Catalogue,
    outlets: Arc<dyn OutletProvider>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_registry(&self, settings: &BridgeSettings, shape: &PipelineShape) -> Result<BridgeRegistry> {
        let context = StreamContext::new(shape.stream_rate(settings.skip), settings.source_id.clone());
        BridgeRegistry::new(
            &settings.vars,
            self.catalogue.clone(),
            Arc::clone(&self.outlets),
            context,
            settings.skip,
        )
    }

    /// Apply `change` to the settings; when prepared, build and publish a
    /// registry for the new settings. On failure the old settings stay.
    fn update<F>(&self, param: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut BridgeSettings),
    {
        let mut state = self.lock();
        let mut next = state.settings.clone();
        change(&mut next);
        if next == state.settings {
            return Ok(());
        }
        if let Some(shape) = state.shape {
            let registry = self.build_registry(&next, &shape).inspect_err(|e| {
                warn!(param, error = %e, "rebuild rejected, keeping previous settings");
            })?;
            info!(param, streams = registry.len(), "publishing rebuilt registry");
            self.slot.publish(registry);
        }
        state.settings = next;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control handle
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe parameter interface of a [`BridgePlugin`].
#[derive(Clone)]
pub struct BridgeControl {
    shared: Arc<Shared>,
}

impl BridgeControl {
    /// Snapshot of the current settings.
    pub fn settings(&self) -> BridgeSettings {
        self.shared.lock().settings.clone()
    }

    /// `true` between a successful prepare and the matching release.
    pub fn is_prepared(&self) -> bool {
        self.shared.lock().shape.is_some()
    }

    /// # Errors
    ///
    /// [`BridgeError::Locked`] while prepared; [`BridgeError::InvalidConfig`]
    /// for a malformed name.
    pub fn set_vars(&self, vars: Vec<String>) -> Result<()> {
        let mut state = self.shared.lock();
        if state.shape.is_some() {
            return Err(BridgeError::Locked("vars".to_string()));
        }
        validate_vars(&vars)?;
        state.settings.vars = vars;
        Ok(())
    }

    /// # Errors
    ///
    /// [`BridgeError::Locked`] while prepared.
    pub fn set_rt_strict(&self, rt_strict: bool) -> Result<()> {
        let mut state = self.shared.lock();
        if state.shape.is_some() {
            return Err(BridgeError::Locked("rt_strict".to_string()));
        }
        state.settings.rt_strict = rt_strict;
        Ok(())
    }

    /// Change the source identifier. Rebuilds every stream when prepared.
    pub fn set_source_id(&self, source_id: impl Into<String>) -> Result<()> {
        let source_id = source_id.into();
        self.shared.update("source_id", |s| s.source_id = source_id)
    }

    /// Change the skip interval. Rebuilds every stream when prepared, since
    /// the nominal rate changes with it.
    pub fn set_skip(&self, skip: u32) -> Result<()> {
        self.shared.update("skip", |s| s.skip = skip)
    }

    /// Switch sending on or off. Streams stay open either way.
    pub fn set_activate(&self, activate: bool) {
        let mut state = self.shared.lock();
        state.settings.activate = activate;
        self.shared.activate.store(activate, Ordering::Release);
        debug!(activate, "activation changed");
    }

    /// Drop registries the processing thread has finished with. Returns
    /// `true` if one was dropped.
    pub fn collect(&self) -> bool {
        self.shared.slot.collect()
    }

    /// `true` while a rebuilt registry waits for the processing thread.
    pub fn has_pending(&self) -> bool {
        self.shared.slot.has_pending()
    }
}

impl std::fmt::Debug for BridgeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeControl")
            .field("state", &*self.shared.lock())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin
// ─────────────────────────────────────────────────────────────────────────────

/// Host-facing bridge.
pub struct BridgePlugin {
    shared: Arc<Shared>,
    current: Option<BridgeRegistry>,
    gate: EmissionGate,
    probe: Option<SchedProbe>,
}

impl BridgePlugin {
    pub fn new(settings: BridgeSettings, catalogue: Catalogue, outlets: Arc<dyn OutletProvider>) -> Self {
        let activate = settings.activate;
        let rt_strict = settings.rt_strict;
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControlState {
                    settings,
                    shape: None,
                }),
                activate: AtomicBool::new(activate),
                slot: ConfigSlot::new(),
                catalogue,
                outlets,
            }),
            current: None,
            gate: EmissionGate::new(rt_strict),
            probe: None,
        }
    }

    /// Replace the scheduling-policy probe used by the safety check.
    pub fn with_sched_probe(mut self, probe: SchedProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// A handle for changing parameters from other threads.
    pub fn control(&self) -> BridgeControl {
        BridgeControl {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The registry currently used by `process`, if any.
    pub fn registry(&self) -> Option<&BridgeRegistry> {
        self.current.as_ref()
    }

    /// Lock the structural parameters and build the registry.
    ///
    /// When `vars` is empty every variable in the space is exported and the
    /// discovered names are stored in `vars`.
    ///
    /// # Errors
    ///
    /// Any registry construction or discovery error, or
    /// [`BridgeError::InvalidConfig`] for a bad shape. The plugin stays
    /// unprepared and unlocked on error.
    pub fn prepare(&mut self, shape: PipelineShape) -> Result<()> {
        shape.validate()?;
        let mut state = self.shared.lock();
        if state.shape.is_some() {
            return Err(BridgeError::InvalidConfig("bridge is already prepared".to_string()));
        }
        state.settings.validate()?;

        let mut settings = state.settings.clone();
        if settings.vars.is_empty() {
            settings.vars = self.shared.catalogue.enumerate_all()?;
            info!(count = settings.vars.len(), "exporting every variable of the space");
        }
        let registry = self.shared.build_registry(&settings, &shape)?;

        let rt_strict = settings.rt_strict;
        state.settings = settings;
        state.shape = Some(shape);
        drop(state);

        self.shared.slot.clear();
        self.current = Some(registry);
        self.gate = match self.probe {
            Some(probe) => EmissionGate::with_probe(rt_strict, probe),
            None => EmissionGate::new(rt_strict),
        };
        info!(
            srate = shape.sample_rate,
            fragsize = shape.fragment_size,
            rt_strict,
            "bridge prepared"
        );
        Ok(())
    }

    /// One processing cycle.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::RealTimeSafety`] / [`BridgeError::SchedulingQuery`]
    ///   from the first cycle after prepare until [`release`][Self::release].
    /// - Any reconciliation error of [`BridgeRegistry::process`].
    pub fn process(&mut self) -> Result<()> {
        self.gate.admit()?;
        self.shared.slot.poll(&mut self.current);
        if !self.shared.activate.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(registry) = self.current.as_mut() {
            registry.process()?;
        }
        Ok(())
    }

    /// Run a cycle and hand the host's signal back unchanged.
    pub fn process_signal<S>(&mut self, signal: S) -> Result<S> {
        self.process()?;
        Ok(signal)
    }

    /// Drop the registry and unlock the structural parameters.
    pub fn release(&mut self) {
        self.current = None;
        self.shared.slot.clear();
        self.gate.rearm();
        self.shared.lock().shape = None;
        info!("bridge released");
    }
}

impl Drop for BridgePlugin {
    fn drop(&mut self) {
        self.shared.slot.clear();
    }
}

impl std::fmt::Debug for BridgePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgePlugin")
            .field("current", &self.current)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
