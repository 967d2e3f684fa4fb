//! Trace and metric generators
//!
//! Each generator instance belongs to exactly one scheduler task and owns
//! its RNG and sequence state; only the engine behind it is shared.

mod metric;
mod trace;


pub use metric::{evaluate, phase, LeakInput, MetricGenerator, PodBinding, ShapeState, DEFAULT_TICK};
pub use trace::TraceGenerator;
