//! Pure classifiers over captured command output.

mod card;
mod sync;
mod vendor;

pub use card::{SlotFault, slot_health};
pub use sync::sync_verified;
pub use vendor::{VendorMatcher, VendorVerdict, is_target_vendor};
