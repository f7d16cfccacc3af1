//! Adapter factory.
//!
//! [`build_adapter`] is the only place where a type tag is turned into a
//! stream. Unsupported tags fail with [`BridgeError::UnknownType`] before any
//! stream is opened.

use tracing::debug;
use varstream_outlet::OutletProvider;
use varstream_types::{BridgeError, Result, StreamInfo, VariableDescriptor};

use crate::adapter::{BridgeAdapter, SampleLayout};

/// Stream metadata shared by every adapter of one registry.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamContext {
    /// Nominal rate of every stream, in Hz.
    pub sample_rate: f64,
    /// Source identifier stamped on every stream; may be empty.
    pub source_id: String,
}

impl StreamContext {
    pub fn new(sample_rate: f64, source_id: impl Into<String>) -> Self {
        Self {
            sample_rate,
            source_id: source_id.into(),
        }
    }
}

/// Stream metadata for exporting `descriptor` under `name`.
///
/// # Errors
///
/// [`BridgeError::UnknownType`] when the descriptor's type cannot be
/// exported.
pub fn stream_info_for(
    name: &str,
    descriptor: &VariableDescriptor,
    context: &StreamContext,
) -> Result<StreamInfo> {
    let layout = layout_of(name, descriptor)?;
    Ok(StreamInfo {
        name: name.to_string(),
        type_label: layout.type_label().to_string(),
        channel_count: layout.channels_for(descriptor.element_count()),
        nominal_srate: context.sample_rate,
        channel_format: layout.channel_format(),
        source_id: context.source_id.clone(),
    })
}

/// Open a stream for `descriptor` and bind an adapter to it.
///
/// # Errors
///
/// - [`BridgeError::UnknownType`] – the type cannot be exported.
/// - [`BridgeError::Outlet`] – the provider refused the stream.
pub fn build_adapter(
    name: &str,
    descriptor: &VariableDescriptor,
    context: &StreamContext,
    outlets: &dyn OutletProvider,
) -> Result<BridgeAdapter> {
    let layout = layout_of(name, descriptor)?;
    let info = stream_info_for(name, descriptor, context)?;
    debug!(
        name,
        type_label = %info.type_label,
        channels = info.channel_count,
        "building adapter"
    );
    let outlet = outlets.create_outlet(info)?;
    Ok(BridgeAdapter::new(outlet, descriptor, layout))
}

fn layout_of(name: &str, descriptor: &VariableDescriptor) -> Result<SampleLayout> {
    SampleLayout::for_tag(descriptor.type_tag()).ok_or_else(|| BridgeError::UnknownType {
        name: name.to_string(),
        tag: descriptor.type_tag(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use varstream_outlet::{BusMessage, StreamBus};
    use varstream_types::{ChannelFormat, Complex32, TypeTag, VarAddress};

    fn ctx() -> StreamContext {
        StreamContext::new(100.0, "rig-1")
    }

    #[test]
    fn channel_counts_per_type() {
        let ints = [0i32; 5];
        let floats = [0f32; 5];
        let doubles = [0f64; 5];
        let complex = [Complex32::default(); 5];
        // SAFETY: every array outlives its descriptor and holds 5 elements.
        let cases = unsafe {
            [
                (VariableDescriptor::new(TypeTag::Int32, 5, VarAddress::from_ptr(ints.as_ptr())), 5, "VAR_INT"),
                (VariableDescriptor::new(TypeTag::Float32, 5, VarAddress::from_ptr(floats.as_ptr())), 5, "VAR_FLOAT"),
                (VariableDescriptor::new(TypeTag::Float64, 5, VarAddress::from_ptr(doubles.as_ptr())), 5, "VAR_DOUBLE"),
                (VariableDescriptor::new(TypeTag::DomainReal, 5, VarAddress::from_ptr(floats.as_ptr())), 5, "VAR_REAL"),
                (VariableDescriptor::new(TypeTag::DomainComplex, 5, VarAddress::from_ptr(complex.as_ptr())), 10, "VAR_COMPLEX"),
            ]
        };
        let bus = StreamBus::default();
        for (desc, channels, label) in cases {
            let adapter = build_adapter("v", &desc, &ctx(), &bus).unwrap();
            assert_eq!(adapter.channel_count(), channels);
            assert_eq!(adapter.stream_info().type_label, label);
            assert_eq!(adapter.stream_info().source_id, "rig-1");
            assert_eq!(adapter.stream_info().nominal_srate, 100.0);
            assert_eq!(adapter.type_tag(), desc.type_tag());
        }
    }

    #[test]
    fn complex_streams_are_float32() {
        // SAFETY: zero elements, nothing is ever read.
        let desc = unsafe { VariableDescriptor::new(TypeTag::DomainComplex, 0, VarAddress::NULL) };
        let info = stream_info_for("spec", &desc, &ctx()).unwrap();
        assert_eq!(info.channel_format, ChannelFormat::Float32);
        assert_eq!(info.channel_count, 0);
    }

    #[test]
    fn unknown_type_opens_no_stream() {
        let bus = StreamBus::default();
        let mut rx = bus.subscribe();
        // SAFETY: zero elements, nothing is ever read.
        let desc = unsafe { VariableDescriptor::new(TypeTag::Other(1000), 0, VarAddress::NULL) };
        let err = build_adapter("user", &desc, &ctx(), &bus).unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownType {
                name: "user".into(),
                tag: TypeTag::Other(1000)
            }
        );
        assert!(rx.try_recv().is_err());

        // SAFETY: as above.
        let text = unsafe { VariableDescriptor::new(TypeTag::Text, 0, VarAddress::NULL) };
        assert!(matches!(
            build_adapter("label", &text, &ctx(), &bus),
            Err(BridgeError::UnknownType { .. })
        ));
    }

    #[test]
    fn opened_stream_carries_metadata() {
        let bus = StreamBus::default();
        let mut rx = bus.subscribe();
        let values = [0f64; 2];
        // SAFETY: `values` outlives the adapter.
        let desc = unsafe { VariableDescriptor::new(TypeTag::Float64, 2, VarAddress::from_ptr(values.as_ptr())) };
        let _adapter = build_adapter("gain", &desc, &ctx(), &bus).unwrap();
        match rx.try_recv().unwrap() {
            BusMessage::StreamOpened { info, .. } => {
                assert_eq!(info.name, "gain");
                assert_eq!(info.channel_format, ChannelFormat::Double64);
                assert_eq!(info.channel_count, 2);
            }
            other => panic!("expected StreamOpened, got {other:?}"),
        }
    }
}
