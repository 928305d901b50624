//! Nokia SR OS platform definition.
//!
//! Covers the Classic CLI prompts seen on 7x50 controllers (`A:host#`,
//! `*A:host#` with unsaved changes, `A:host>config$` in a new context) and the
//! second line of MD-CLI prompts (`A:admin@host#`). The slot letter is the
//! active CPM.
//!
//! The maintenance sequence saves the configuration, then forces the standby
//! CPM to resynchronise configuration and boot environment, then checks the
//! redundancy status. The `admin` commands end with `Completed.` and may
//! redraw the prompt before that, so they use marker completion.

use std::time::Duration;

use crate::driver::CommandDescriptor;
use crate::platform::PlatformDefinition;

/// Platform name for Nokia SR OS.
pub const PLATFORM_NAME: &str = "nokia_sros";

/// Marker printed by successful `admin` operations.
pub const COMPLETED_MARKER: &str = "Completed.";

/// Device prompt grammar. The `prompt` group excludes the delimiter that may
/// precede a prompt printed on the same line as command output.
pub const PROMPT_PATTERN: &str = r"(?:^|[^\w])(?P<prompt>\*?[A-D]:[\w.@>-]+[#$])\s*$";

/// Command whose output is checked for boot/config synchronization.
pub const SYNC_CHECK_COMMAND: &str = "show redundancy synchronization";

/// Create the Nokia SR OS platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new(PLATFORM_NAME, PROMPT_PATTERN)
        .with_on_open_command("environment no more")
        .with_inspection(CommandDescriptor::any_prompt(
            "show card",
            Duration::from_secs(30),
        ))
        .with_maintenance_step(CommandDescriptor::marker(
            "admin save",
            COMPLETED_MARKER,
            Duration::from_secs(120),
        ))
        .with_maintenance_step(CommandDescriptor::marker(
            "admin save index detail",
            COMPLETED_MARKER,
            Duration::from_secs(180),
        ))
        .with_maintenance_step(CommandDescriptor::marker(
            "admin redundancy synchronize config",
            COMPLETED_MARKER,
            Duration::from_secs(420),
        ))
        .with_maintenance_step(CommandDescriptor::marker(
            "admin redundancy synchronize boot-env",
            COMPLETED_MARKER,
            Duration::from_secs(1800),
        ))
        .with_sync_check(CommandDescriptor::prompt(
            SYNC_CHECK_COMMAND,
            Duration::from_secs(60),
        ))
        // Failure markers; SR OS prefixes CLI errors with a severity
        .with_failure_pattern("Error")
        .with_failure_pattern("Failed")
        .with_failure_pattern("MINOR:")
        .with_failure_pattern("MAJOR:")
        .with_failure_pattern("CRITICAL:")
        .with_failure_pattern("Bad Command:")
        .with_failure_pattern("Unrecognized command")
        .with_vendor_signature(r"(?i)card\s+summary")
        .with_vendor_signature(r"(?i)provisioned\s+(?:type|card-type)")
        .with_vendor_signature(r"(?i)\b(?:up|down)/(?:active|standby)\b")
        .with_vendor_signature(r"(?i)\b(?:sfm|iom|imm|cpm)\d*-[\w-]+")
        .with_vendor_denial(r"(?i)unrecognized command")
        .with_vendor_denial(r"(?i)invalid command")
        .with_vendor_denial(r"(?i)unknown command")
        .with_vendor_denial(r"(?i)command not found")
        .with_vendor_denial(r"(?i)syntax error")
        .with_vendor_denial(r"(?i)invalid input")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Completion;

    #[test]
    fn test_nokia_sros_platform() {
        let platform = platform();
        assert_eq!(platform.name, "nokia_sros");
        assert!(platform.validate().is_ok());
        assert_eq!(platform.inspection.text, "show card");
        assert_eq!(platform.inspection.completion, Completion::AnyPrompt);
    }

    #[test]
    fn test_maintenance_sequence_order_and_timeouts() {
        let platform = platform();
        let steps: Vec<(&str, u64)> = platform
            .maintenance
            .iter()
            .map(|c| (c.text.as_str(), c.timeout.as_secs()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("admin save", 120),
                ("admin save index detail", 180),
                ("admin redundancy synchronize config", 420),
                ("admin redundancy synchronize boot-env", 1800),
                ("show redundancy synchronization", 60),
            ]
        );
    }

    #[test]
    fn test_admin_commands_require_marker() {
        let platform = platform();
        for step in platform.maintenance.iter().filter(|c| c.text.starts_with("admin")) {
            assert_eq!(step.completion, Completion::marker(COMPLETED_MARKER));
        }
        assert_eq!(
            platform.sync_check_command.as_deref(),
            Some(SYNC_CHECK_COMMAND)
        );
    }

    #[test]
    fn test_failure_patterns() {
        let platform = platform();
        for marker in ["MINOR:", "MAJOR:", "CRITICAL:", "Error", "Bad Command:"] {
            assert!(platform.failed_when_contains.contains(&marker.to_string()));
        }
    }
}
