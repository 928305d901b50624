//! Channel layer: decoding the device byte stream and detecting prompts.
//!
//! This module owns the per-session text accumulator and the regex-based
//! detector that turns it into login signals and command states.

mod buffer;
mod detector;

pub use buffer::PatternBuffer;
pub use detector::{CommandScan, CommandState, Completion, Detector, Signal};
