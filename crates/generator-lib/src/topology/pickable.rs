//! Weighted, flag-gated selection

use crate::flags::{FlagEngine, FlagGate};
use crate::models::TraceId;
use rand::Rng;

/// Default weight of tag sets, resource sets and latency profiles
pub const DEFAULT_WEIGHT: f64 = 1.0;

pub(crate) fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

pub(crate) fn is_default_weight(weight: &f64) -> bool {
    *weight == DEFAULT_WEIGHT
}

/// A weighted candidate guarded by a [`FlagGate`]
pub trait Pickable {
    fn weight(&self) -> f64;

    fn gate(&self) -> &FlagGate;

    fn should_generate(&self, flags: &FlagEngine) -> bool {
        self.gate().should_generate(flags)
    }
}

/// Position in `[0, 1]` used to walk the cumulative weights
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PickRatio(f64);

impl PickRatio {
    /// Derive the ratio from the low 8 bytes of a trace ID (big-endian), so
    /// every span of one trace makes the same choice
    pub fn from_trace_id(trace_id: &TraceId) -> Self {
        let mut low = [0u8; 8];
        low.copy_from_slice(&trace_id.as_bytes()[8..]);
        Self(u64::from_be_bytes(low) as f64 / u64::MAX as f64)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen::<f64>())
    }

    /// Clamped into `[0, 1]`
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Pick one active item by weight.
///
/// Items whose gate fails are skipped. Walking in order, the first item whose
/// cumulative weight exceeds `ratio * total` wins and the last active item
/// absorbs rounding. `None` means nothing was active.
pub fn pick<'a, P, I>(items: I, flags: &FlagEngine, ratio: PickRatio) -> Option<&'a P>
where
    P: Pickable + 'a,
    I: IntoIterator<Item = &'a P>,
{
    let active: Vec<&'a P> = items
        .into_iter()
        .filter(|item| item.should_generate(flags))
        .collect();

    let total: f64 = active.iter().map(|item| item.weight().max(0.0)).sum();
    let target = ratio.value() * total;

    let mut cumulative = 0.0;
    for item in &active {
        cumulative += item.weight().max(0.0);
        if cumulative > target {
            return Some(*item);
        }
    }
    active.last().copied()
}
