//! Redundancy synchronization status.

use once_cell::sync::Lazy;
use regex::Regex;

static SYNCHRONIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)boot\s*/\s*config\s+sync\s+status\s*:\s*all\s+boot\s+environment\s+synchronized")
        .unwrap()
});

/// Whether `show redundancy synchronization` output reports that the boot
/// environment and configuration are fully synchronized.
pub fn sync_verified(output: &str) -> bool {
    SYNCHRONIZED.is_match(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronized() {
        assert!(sync_verified(
            "Boot/Config Sync Status : All boot environment synchronized"
        ));
        assert!(sync_verified(
            "Standby Status   : standby\nBoot/Config Sync Status      : All boot environment synchronized\n"
        ));
        assert!(sync_verified("boot/config sync status:ALL BOOT ENVIRONMENT SYNCHRONIZED"));
    }

    #[test]
    fn test_not_synchronized() {
        assert!(!sync_verified(
            "Boot/Config Sync Status      : Boot environment not synchronized"
        ));
        assert!(!sync_verified("Boot/Config Sync Mode : None"));
        assert!(!sync_verified(""));
    }
}
