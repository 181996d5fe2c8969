//! Utility modules: clock and pause seams.

pub mod clock;

pub use clock::{Clock, ManualClock, Pause, SystemClock, TokioPause};
