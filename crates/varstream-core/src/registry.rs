//! [`BridgeRegistry`] – the set of exported variables of one configuration
//! epoch.
//!
//! A registry is built in one go: every requested name is resolved and
//! type-checked before the first stream is opened, so a bad name or an
//! unsupported type leaves nothing behind.
//!
//! # Reconciliation
//!
//! Variables may move, change type or change size between cycles.
//! [`BridgeRegistry::reconcile`] compares each adapter with the live
//! descriptor and picks one action:
//!
//! | Live descriptor vs. adapter | Action |
//! |---|---|
//! | name absent | [`BridgeError::MissingVariable`] |
//! | new address, same type, same channel count | repoint |
//! | different type | rebuild |
//! | different channel count | rebuild |
//! | otherwise | keep |
//!
//! Repointing only swaps the cached address. Rebuilding opens a fresh stream
//! through the factory and closes the old one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, trace};
use varstream_outlet::OutletProvider;
use varstream_space::Catalogue;
use varstream_types::{BridgeError, Result, TypeTag, VarAddress, VariableDescriptor};

use crate::adapter::BridgeAdapter;
use crate::factory::{StreamContext, build_adapter, stream_info_for};
use crate::gate::Throttle;

/// Why an adapter had to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    TypeChanged { from: TypeTag, to: TypeTag },
    ShapeChanged { from: u32, to: u32 },
}

/// Counters of what reconciliation did since the registry was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Reconciliation passes.
    pub cycles: u64,
    pub repoints: u64,
    pub rebuilds: u64,
    /// Cycles that pushed a sample to every stream.
    pub sends: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Keep,
    Repoint(VarAddress),
    Rebuild(RebuildReason),
}

fn plan(adapter: &BridgeAdapter, live: &VariableDescriptor) -> Action {
    let same_type = adapter.type_tag() == live.type_tag();
    let same_shape = adapter.channel_count() == live.expected_channel_count();
    if adapter.address() != live.address() && same_shape && same_type {
        return Action::Repoint(live.address());
    }
    if !same_type {
        return Action::Rebuild(RebuildReason::TypeChanged {
            from: adapter.type_tag(),
            to: live.type_tag(),
        });
    }
    if !same_shape {
        return Action::Rebuild(RebuildReason::ShapeChanged {
            from: adapter.channel_count(),
            to: live.expected_channel_count(),
        });
    }
    Action::Keep
}

/// Name → adapter map plus throttle state and stream metadata.
pub struct BridgeRegistry {
    adapters: BTreeMap<String, BridgeAdapter>,
    catalogue: Catalogue,
    outlets: Arc<dyn OutletProvider>,
    context: StreamContext,
    throttle: Throttle,
    stats: ReconcileStats,
}

impl BridgeRegistry {
    /// Resolve every name in `names` and open one stream per variable.
    ///
    /// Duplicate names are exported once.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NoSuchVariable`] – a name is absent.
    /// - [`BridgeError::UnknownType`] – a variable cannot be exported.
    /// - [`BridgeError::InvalidHandle`] – the variable space is unusable.
    /// - [`BridgeError::Outlet`] – the provider refused a stream.
    ///
    /// No stream is opened unless every name resolves to an exportable type.
    pub fn new(
        names: &[String],
        catalogue: Catalogue,
        outlets: Arc<dyn OutletProvider>,
        context: StreamContext,
        skip_interval: u32,
    ) -> Result<Self> {
        let mut resolved = BTreeMap::new();
        for name in names {
            let descriptor = catalogue.resolve(name)?;
            stream_info_for(name, &descriptor, &context)?;
            resolved.insert(name.clone(), descriptor);
        }

        let mut adapters = BTreeMap::new();
        for (name, descriptor) in resolved {
            let adapter = build_adapter(&name, &descriptor, &context, outlets.as_ref())?;
            adapters.insert(name, adapter);
        }

        info!(
            streams = adapters.len(),
            skip = skip_interval,
            srate = context.sample_rate,
            source_id = %context.source_id,
            "bridge registry built"
        );
        Ok(Self {
            adapters,
            catalogue,
            outlets,
            context,
            throttle: Throttle::new(skip_interval),
            stats: ReconcileStats::default(),
        })
    }

    /// Bring every adapter in line with the live catalogue.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::MissingVariable`] – a monitored name vanished.
    /// - [`BridgeError::InvalidHandle`] – the variable space is unusable.
    /// - Any error of [`build_adapter`] during a rebuild.
    pub fn reconcile(&mut self) -> Result<()> {
        self.stats.cycles += 1;
        for (name, adapter) in self.adapters.iter_mut() {
            let live = self.catalogue.resolve(name).map_err(|e| match e {
                BridgeError::NoSuchVariable(name) => BridgeError::MissingVariable(name),
                other => other,
            })?;
            match plan(adapter, &live) {
                Action::Keep => {}
                Action::Repoint(address) => {
                    trace!(name = %name, ?address, "repointing adapter");
                    // SAFETY: `address` comes from a descriptor reported by
                    // the variable space for this very name, with the same
                    // type and element count the adapter was built for.
                    unsafe { adapter.set_address(address) };
                    self.stats.repoints += 1;
                }
                Action::Rebuild(reason) => {
                    info!(name = %name, ?reason, "rebuilding adapter");
                    *adapter =
                        build_adapter(name, &live, &self.context, self.outlets.as_ref())?;
                    self.stats.rebuilds += 1;
                }
            }
        }
        Ok(())
    }

    /// Run one processing cycle: reconcile, then send if the throttle
    /// allows. Returns `true` when samples were sent.
    pub fn process(&mut self) -> Result<bool> {
        self.reconcile()?;
        if !self.throttle.tick() {
            return Ok(false);
        }
        for adapter in self.adapters.values_mut() {
            adapter.send_frame();
        }
        self.stats.sends += 1;
        Ok(true)
    }

    /// Exported names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn adapter(&self, name: &str) -> Option<&BridgeAdapter> {
        self.adapters.get(name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn skip_interval(&self) -> u32 {
        self.throttle.skip_interval()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("adapters", &self.adapters)
            .field("context", &self.context)
            .field("throttle", &self.throttle)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::Receiver;
    use varstream_outlet::{BusMessage, SampleValues, StreamBus};
    use varstream_space::{SimVariableSpace, VarBuffer};
    use varstream_types::Complex32;

    struct Fixture {
        space: Arc<SimVariableSpace>,
        bus: StreamBus,
        rx: Receiver<BusMessage>,
    }

    impl Fixture {
        fn new(space: SimVariableSpace) -> Self {
            let bus = StreamBus::default();
            let rx = bus.subscribe();
            Self {
                space: Arc::new(space),
                bus,
                rx,
            }
        }

        fn registry(&self, names: &[&str], skip: u32) -> Result<BridgeRegistry> {
            let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
            BridgeRegistry::new(
                &names,
                Catalogue::new(self.space.clone()),
                Arc::new(self.bus.clone()),
                StreamContext::new(100.0, "rig"),
                skip,
            )
        }

        fn drain(&mut self) -> Vec<BusMessage> {
            std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
        }

        fn samples(&mut self) -> Vec<SampleValues> {
            self.drain()
                .into_iter()
                .filter_map(|m| match m {
                    BusMessage::Sample(frame) => Some(frame.values),
                    _ => None,
                })
                .collect()
        }
    }

    fn level_space() -> SimVariableSpace {
        SimVariableSpace::new().with("level", VarBuffer::Float32(vec![0.0; 4]))
    }

    #[test]
    fn reconcile_is_idempotent_on_unchanged_space() {
        let fx = Fixture::new(level_space().with("frame", VarBuffer::Int32(vec![0])));
        let mut registry = fx.registry(&["level", "frame"], 0).unwrap();
        for _ in 0..5 {
            registry.reconcile().unwrap();
        }
        let stats = registry.stats();
        assert_eq!(stats.cycles, 5);
        assert_eq!(stats.repoints, 0);
        assert_eq!(stats.rebuilds, 0);
    }

    #[test]
    fn moved_buffer_is_repointed_not_rebuilt() {
        let mut fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        let before = registry.adapter("level").unwrap().address();

        // The new buffer is allocated while the old one is alive, so the
        // address must differ.
        fx.space.insert("level", VarBuffer::Float32(vec![1.0, 2.0, 3.0, 4.0]));
        fx.drain();
        assert!(registry.process().unwrap());

        let stats = registry.stats();
        assert_eq!((stats.repoints, stats.rebuilds), (1, 0));
        assert_ne!(registry.adapter("level").unwrap().address(), before);
        assert_eq!(
            fx.samples(),
            vec![SampleValues::Float32(vec![1.0, 2.0, 3.0, 4.0])]
        );
    }

    #[test]
    fn type_change_rebuilds_with_doubled_channels() {
        let mut fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        fx.drain();

        fx.space
            .insert("level", VarBuffer::Complex(vec![Complex32::new(1.0, -1.0); 4]));
        registry.reconcile().unwrap();

        let stats = registry.stats();
        assert_eq!((stats.repoints, stats.rebuilds), (0, 1));
        let adapter = registry.adapter("level").unwrap();
        assert_eq!(adapter.channel_count(), 8);
        assert_eq!(adapter.type_tag(), TypeTag::DomainComplex);

        // New stream opened, old one closed.
        let messages = fx.drain();
        assert!(messages.iter().any(|m| matches!(
            m,
            BusMessage::StreamOpened { info, .. } if info.type_label == "VAR_COMPLEX" && info.channel_count == 8
        )));
        assert!(messages.iter().any(|m| matches!(m, BusMessage::StreamClosed { .. })));
    }

    #[test]
    fn resize_rebuilds() {
        let fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        // SAFETY: the registry only reads during `reconcile`/`process`, and
        // the growth is seen by the reconcile that follows.
        unsafe {
            fx.space.write("level", |b| {
                if let VarBuffer::Float32(v) = b {
                    v.push(0.0);
                }
            });
        }
        registry.reconcile().unwrap();
        assert_eq!(registry.stats().rebuilds, 1);
        assert_eq!(registry.adapter("level").unwrap().channel_count(), 5);
    }

    #[test]
    fn equal_representation_different_type_rebuilds() {
        let fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        // SAFETY: as above, the swap is seen by the next reconcile.
        unsafe {
            fx.space.write("level", |b| {
                if let VarBuffer::Float32(v) = b {
                    let samples = std::mem::take(v);
                    *b = VarBuffer::Real(samples);
                }
            });
        }
        registry.reconcile().unwrap();
        assert_eq!(registry.stats().rebuilds, 1);
        assert_eq!(registry.adapter("level").unwrap().type_tag(), TypeTag::DomainReal);
    }

    #[test]
    fn complex_with_same_channel_count_is_repointed() {
        let fx = Fixture::new(
            SimVariableSpace::new().with("spec", VarBuffer::Complex(vec![Complex32::default(); 3])),
        );
        let mut registry = fx.registry(&["spec"], 0).unwrap();
        fx.space
            .insert("spec", VarBuffer::Complex(vec![Complex32::default(); 3]));
        registry.reconcile().unwrap();
        let stats = registry.stats();
        assert_eq!((stats.repoints, stats.rebuilds), (1, 0));
    }

    #[test]
    fn vanished_variable_is_fatal() {
        let fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        fx.space.remove("level");
        assert_eq!(
            registry.process().unwrap_err(),
            BridgeError::MissingVariable("level".into())
        );
    }

    #[test]
    fn invalid_handle_propagates() {
        let fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 0).unwrap();
        fx.space.invalidate();
        assert_eq!(registry.reconcile().unwrap_err(), BridgeError::InvalidHandle);
    }

    #[test]
    fn construction_is_atomic() {
        let mut fx = Fixture::new(level_space().with("label", VarBuffer::Text("abc".into())));

        let err = fx.registry(&["level", "nope"], 0).unwrap_err();
        assert_eq!(err, BridgeError::NoSuchVariable("nope".into()));
        assert!(err.is_configuration());

        let err = fx.registry(&["level", "label"], 0).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownType { ref name, tag: TypeTag::Text } if name == "label"));

        assert!(fx.drain().is_empty(), "no stream may be opened by a failed build");
        assert!(fx.bus.open_streams().is_empty());
    }

    #[test]
    fn duplicate_names_export_once() {
        let fx = Fixture::new(level_space());
        let registry = fx.registry(&["level", "level"], 0).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["level"]);
    }

    #[test]
    fn throttle_sends_ceil_and_reconciles_every_cycle() {
        for k in 0..4u32 {
            for n in 0..10u64 {
                let fx = Fixture::new(level_space());
                let mut registry = fx.registry(&["level"], k).unwrap();
                for _ in 0..n {
                    registry.process().unwrap();
                }
                let stats = registry.stats();
                assert_eq!(stats.cycles, n);
                assert_eq!(stats.sends, n.div_ceil(u64::from(k) + 1), "k={k} n={n}");
            }
        }
    }

    #[test]
    fn level_with_skip_one_sends_even_cycles() {
        let mut fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 1).unwrap();
        fx.drain();

        let mut sent_on = Vec::new();
        for cycle in 0..6 {
            // SAFETY: written in place between cycles.
            unsafe {
                fx.space.write("level", |b| {
                    if let VarBuffer::Float32(v) = b {
                        v.fill(cycle as f32);
                    }
                });
            }
            if registry.process().unwrap() {
                sent_on.push(cycle);
            }
        }
        assert_eq!(sent_on, vec![0, 2, 4]);
        assert_eq!(
            fx.samples(),
            vec![
                SampleValues::Float32(vec![0.0; 4]),
                SampleValues::Float32(vec![2.0; 4]),
                SampleValues::Float32(vec![4.0; 4]),
            ]
        );
    }

    #[test]
    fn move_on_skipped_cycle_is_picked_up_by_next_send() {
        let mut fx = Fixture::new(level_space());
        let mut registry = fx.registry(&["level"], 2).unwrap();
        fx.drain();

        assert!(registry.process().unwrap());
        fx.space.insert("level", VarBuffer::Float32(vec![9.0; 4]));
        assert!(!registry.process().unwrap());

        let stats = registry.stats();
        assert_eq!((stats.repoints, stats.sends), (1, 1));

        assert!(!registry.process().unwrap());
        assert!(registry.process().unwrap());
        assert_eq!(registry.stats().repoints, 1);
        assert_eq!(
            fx.samples(),
            vec![
                SampleValues::Float32(vec![0.0; 4]),
                SampleValues::Float32(vec![9.0; 4]),
            ]
        );
    }

    #[test]
    fn spectrum_is_sent_interleaved() {
        let mut fx = Fixture::new(SimVariableSpace::new().with(
            "spec",
            VarBuffer::Complex(vec![
                Complex32::new(1.0, 2.0),
                Complex32::new(3.0, 4.0),
                Complex32::new(5.0, 6.0),
            ]),
        ));
        let mut registry = fx.registry(&["spec"], 0).unwrap();
        assert_eq!(registry.adapter("spec").unwrap().channel_count(), 6);
        registry.process().unwrap();
        assert_eq!(
            fx.samples(),
            vec![SampleValues::Float32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])]
        );
    }

    #[test]
    fn stream_metadata_comes_from_context() {
        let fx = Fixture::new(level_space());
        let registry = fx.registry(&["level"], 3).unwrap();
        let info = registry.adapter("level").unwrap().stream_info();
        assert_eq!(info.source_id, "rig");
        assert_eq!(info.nominal_srate, 100.0);
        assert_eq!(registry.skip_interval(), 3);
    }
}
