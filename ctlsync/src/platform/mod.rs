//! Platform definitions.
//!
//! A platform bundles the vendor-specific pieces of the session engine:
//! prompt grammar, failure markers, the inspection command and the fixed
//! maintenance sequence.

mod definition;
pub mod sros;

pub use definition::PlatformDefinition;
