//! Platform definition for vendor-specific configuration.

use std::time::Duration;

use crate::driver::CommandDescriptor;
use crate::error::{PlatformError, Result};

/// Everything vendor-specific the session engine needs: prompt grammar,
/// failure markers, terminal preparation, the inspection command and the
/// fixed maintenance sequence.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "nokia_sros").
    pub name: String,

    /// Device prompt pattern, matched against the last non-empty line.
    pub prompt_pattern: String,

    /// Substrings that mark a command as failed.
    pub failed_when_contains: Vec<String>,

    /// Commands sent once the session is ready (paging off etc.).
    pub on_open_commands: Vec<String>,

    /// Hardware inspection command.
    pub inspection: CommandDescriptor,

    /// Ordered maintenance sequence.
    pub maintenance: Vec<CommandDescriptor>,

    /// Command in `maintenance` whose output is checked for synchronization.
    pub sync_check_command: Option<String>,

    /// Patterns whose presence identifies the target vendor.
    pub vendor_signatures: Vec<String>,

    /// Patterns whose presence identifies a foreign vendor.
    pub vendor_denials: Vec<String>,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(name: impl Into<String>, prompt_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt_pattern: prompt_pattern.into(),
            failed_when_contains: vec![],
            on_open_commands: vec![],
            inspection: CommandDescriptor::any_prompt("", Duration::from_secs(30)),
            maintenance: vec![],
            sync_check_command: None,
            vendor_signatures: vec![],
            vendor_denials: vec![],
        }
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set the inspection command.
    pub fn with_inspection(mut self, command: CommandDescriptor) -> Self {
        self.inspection = command;
        self
    }

    /// Append a maintenance step.
    pub fn with_maintenance_step(mut self, command: CommandDescriptor) -> Self {
        self.maintenance.push(command);
        self
    }

    /// Append the synchronization check as the last maintenance step.
    pub fn with_sync_check(mut self, command: CommandDescriptor) -> Self {
        self.sync_check_command = Some(command.text.clone());
        self.maintenance.push(command);
        self
    }

    /// Add a vendor signature pattern.
    pub fn with_vendor_signature(mut self, pattern: impl Into<String>) -> Self {
        self.vendor_signatures.push(pattern.into());
        self
    }

    /// Add a foreign-vendor pattern.
    pub fn with_vendor_denial(mut self, pattern: impl Into<String>) -> Self {
        self.vendor_denials.push(pattern.into());
        self
    }

    /// Check the definition is usable.
    pub fn validate(&self) -> Result<()> {
        if self.inspection.text.trim().is_empty() {
            return Err(PlatformError::InvalidDefinition {
                message: format!("platform '{}' has no inspection command", self.name),
            }
            .into());
        }
        if let Some(sync) = &self.sync_check_command {
            if !self.maintenance.iter().any(|c| &c.text == sync) {
                return Err(PlatformError::InvalidDefinition {
                    message: format!("sync check '{sync}' is not part of the maintenance sequence"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Strip the command echo and the trailing prompt line from raw output.
    pub fn normalize_output(&self, raw: &str, command: &str) -> String {
        let output = match raw.find(command) {
            Some(pos) if raw[..pos].lines().count() <= 1 => &raw[pos + command.len()..],
            _ => raw,
        };
        let output = output.trim_start_matches(['\r', '\n']);

        match output.trim_end().rfind('\n') {
            Some(pos) => output[..pos].to_string(),
            None => String::new(),
        }
    }
}
