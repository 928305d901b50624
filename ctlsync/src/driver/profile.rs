//! A validated platform paired with its compiled detector.

use crate::channel::Detector;
use crate::error::Result;
use crate::platform::PlatformDefinition;

/// Platform definition plus the detector compiled from it, shared by every
/// session of a run.
#[derive(Debug, Clone)]
pub struct Profile {
    platform: PlatformDefinition,
    detector: Detector,
}

impl Profile {
    /// Validate the platform and compile its patterns.
    pub fn new(platform: PlatformDefinition) -> Result<Self> {
        platform.validate()?;
        let detector = Detector::for_platform(&platform)?;
        Ok(Self { platform, detector })
    }

    /// The platform definition.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// The compiled detector.
    pub fn detector(&self) -> &Detector {
        &self.detector
    }
}
