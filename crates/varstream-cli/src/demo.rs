//! Simulated host pipeline.
//!
//! Publishes four variables into a [`SimVariableSpace`] and rewrites them
//! once per cycle, the way a signal-processing chain would:
//!
//! | Name | Type | Content |
//! |---|---|---|
//! | `level` | float32 × 4 | slowly oscillating channel levels |
//! | `spec` | complex × bins | rotating spectrum, reallocated periodically |
//! | `frame` | int32 × 1 | cycle counter |
//! | `gain` | float64 × 1 | constant |

use std::f32::consts::{FRAC_PI_4, TAU};
use std::sync::Arc;

use tracing::debug;
use varstream_space::{SimVariableSpace, VarBuffer};
use varstream_types::Complex32;

pub const LEVEL: &str = "level";
pub const SPECTRUM: &str = "spec";
pub const FRAME: &str = "frame";
pub const GAIN: &str = "gain";

pub struct DemoPipeline {
    space: Arc<SimVariableSpace>,
    bins: usize,
    realloc_every: u64,
}

impl DemoPipeline {
    pub fn new(spectrum_bins: u32, realloc_every: u64) -> Self {
        let bins = spectrum_bins as usize;
        let space = SimVariableSpace::new()
            .with(LEVEL, VarBuffer::Float32(vec![0.0; 4]))
            .with(SPECTRUM, VarBuffer::Complex(spectrum(bins, 0)))
            .with(FRAME, VarBuffer::Int32(vec![0]))
            .with(GAIN, VarBuffer::Float64(vec![1.0]));
        Self {
            space: Arc::new(space),
            bins,
            realloc_every,
        }
    }

    pub fn space(&self) -> Arc<SimVariableSpace> {
        Arc::clone(&self.space)
    }

    /// Produce the variable contents of `cycle`.
    ///
    /// Writes in place and frees the spectrum buffers retired by earlier
    /// reallocations.
    ///
    /// # Safety
    ///
    /// No processing cycle may read from [`space`][Self::space] while this
    /// runs, and every bridge reading it must reconcile before its next
    /// read. `BridgeRegistry::process` always does.
    pub unsafe fn advance(&self, cycle: u64) {
        let phase = (cycle % 20) as f32 / 20.0 * TAU;
        // SAFETY: the caller excludes concurrent cycles; no write resizes.
        unsafe {
            self.space.write(LEVEL, |b| {
                if let VarBuffer::Float32(v) = b {
                    for (ch, x) in v.iter_mut().enumerate() {
                        *x = 0.5 + 0.5 * (phase + ch as f32 * FRAC_PI_4).sin();
                    }
                }
            });
            self.space.write(FRAME, |b| {
                if let VarBuffer::Int32(v) = b {
                    v[0] = cycle as i32;
                }
            });
        }

        if self.realloc_every > 0 && cycle > 0 && cycle % self.realloc_every == 0 {
            debug!(cycle, "reallocating spectrum buffer");
            // SAFETY: no cycle is running and every bridge reconciles before
            // it reads again, so no stale address is dereferenced.
            let freed = unsafe { self.space.collect_retired() };
            if freed > 0 {
                debug!(freed, "freed retired spectrum buffers");
            }
            self.space.insert(SPECTRUM, VarBuffer::Complex(spectrum(self.bins, cycle)));
        } else {
            // SAFETY: same as the writes above.
            unsafe {
                self.space.write(SPECTRUM, |b| {
                    if let VarBuffer::Complex(v) = b {
                        let fresh = spectrum(v.len(), cycle);
                        v.copy_from_slice(&fresh);
                    }
                });
            }
        }
    }
}

fn spectrum(bins: usize, cycle: u64) -> Vec<Complex32> {
    let phase = (cycle % 64) as f32 / 64.0 * TAU;
    (0..bins)
        .map(|k| {
            let mag = 1.0 / (k as f32 + 1.0);
            let arg = phase * (k as f32 + 1.0);
            Complex32::new(mag * arg.cos(), mag * arg.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use varstream_space::VariableSpace;
    use varstream_types::TypeTag;

    fn advance(demo: &DemoPipeline, cycle: u64) {
        // SAFETY: no bridge reads the demo space in these tests.
        unsafe { demo.advance(cycle) }
    }

    #[test]
    fn publishes_four_variables() {
        let demo = DemoPipeline::new(8, 0);
        let space = demo.space();
        assert_eq!(space.len(), 4);
        assert_eq!(space.get_var(SPECTRUM).unwrap().expected_channel_count(), 16);
        assert_eq!(space.get_var(GAIN).unwrap().type_tag(), TypeTag::Float64);
    }

    #[test]
    fn advance_updates_in_place() {
        let demo = DemoPipeline::new(4, 0);
        let space = demo.space();
        let before = space.get_var(SPECTRUM).unwrap().address();
        advance(&demo, 5);
        assert_eq!(space.get(FRAME), Some(VarBuffer::Int32(vec![5])));
        assert_eq!(space.get_var(SPECTRUM).unwrap().address(), before);
    }

    #[test]
    fn spectrum_moves_on_realloc_cycles() {
        let demo = DemoPipeline::new(4, 3);
        let space = demo.space();
        let first = space.get_var(SPECTRUM).unwrap();
        advance(&demo, 1);
        advance(&demo, 2);
        assert_eq!(space.get_var(SPECTRUM).unwrap().address(), first.address());
        advance(&demo, 3);
        let moved = space.get_var(SPECTRUM).unwrap();
        assert_ne!(moved.address(), first.address());
        assert_eq!(moved.element_count(), first.element_count());
    }

    #[test]
    fn retired_spectra_are_freed_on_the_next_realloc() {
        let demo = DemoPipeline::new(4, 2);
        let space = demo.space();
        advance(&demo, 2);
        assert_eq!(space.retired_len(), 1);
        advance(&demo, 3);
        assert_eq!(space.retired_len(), 1);
        advance(&demo, 4);
        assert_eq!(space.retired_len(), 1, "old one freed, newest retired");
    }

    #[test]
    fn levels_stay_in_unit_range() {
        let demo = DemoPipeline::new(1, 0);
        for cycle in 0..40 {
            advance(&demo, cycle);
            if let Some(VarBuffer::Float32(v)) = demo.space().get(LEVEL) {
                assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
            }
        }
    }
}
