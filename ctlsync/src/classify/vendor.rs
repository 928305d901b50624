//! Vendor compatibility from inspection output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ChannelError, Result};
use crate::platform::{PlatformDefinition, sros};

/// Vendor classification of inspection output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorVerdict {
    /// Signature found, no denial.
    Target,
    /// A denial matched; carries the matching text.
    NonTarget(String),
    /// Neither signatures nor denials matched.
    Ambiguous,
}

/// Allow/deny pattern matcher built from a platform definition.
#[derive(Debug, Clone)]
pub struct VendorMatcher {
    signatures: Vec<Regex>,
    denials: Vec<Regex>,
}

impl VendorMatcher {
    /// Compile the platform's vendor patterns.
    pub fn for_platform(platform: &PlatformDefinition) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| ChannelError::InvalidPattern(e).into()))
                .collect()
        };
        Ok(Self {
            signatures: compile(&platform.vendor_signatures)?,
            denials: compile(&platform.vendor_denials)?,
        })
    }

    /// Classify `output`. A denial always wins over a signature.
    pub fn verdict(&self, output: &str) -> VendorVerdict {
        if let Some(found) = self.denials.iter().find_map(|d| d.find(output)) {
            return VendorVerdict::NonTarget(found.as_str().to_string());
        }
        if self.signatures.iter().any(|s| s.is_match(output)) {
            VendorVerdict::Target
        } else {
            VendorVerdict::Ambiguous
        }
    }
}

static SROS_MATCHER: Lazy<VendorMatcher> = Lazy::new(|| {
    VendorMatcher::for_platform(&sros::platform()).expect("built-in SR OS vendor patterns")
});

/// Whether `show card` output comes from an SR OS controller. Unknown
/// output is not.
pub fn is_target_vendor(show_card_output: &str) -> bool {
    SROS_MATCHER.verdict(show_card_output) == VendorVerdict::Target
}
