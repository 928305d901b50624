//! Response type for command execution results.

use std::time::Duration;

/// Response from a command execution.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// The command output (normalized - command echo and trailing prompt removed).
    pub result: String,

    /// The raw output before normalization.
    pub raw_result: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,

    /// Failure message if the command failed (based on failure patterns).
    pub failure_message: Option<String>,

    /// The command's budget ran out before it resolved.
    pub timed_out: bool,

    /// The channel failed before the command resolved.
    pub interrupted: bool,
}

impl Response {
    /// Create a new successful response.
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        raw_result: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            raw_result: raw_result.into(),
            elapsed,
            failure_message: None,
            timed_out: false,
            interrupted: false,
        }
    }

    /// Mark the response as failed.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Mark the response as timed out.
    pub fn with_timeout(mut self) -> Self {
        self.timed_out = true;
        self
    }

    /// Mark the response as cut short by a channel error.
    pub fn with_interruption(mut self, message: impl Into<String>) -> Self {
        self.interrupted = true;
        self.failure_message = Some(message.into());
        self
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none() && !self.timed_out && !self.interrupted
    }

    /// Check if the result contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.result.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure() {
        let ok = Response::new("admin save", "Completed.", "admin save\nCompleted.\nA:r#", Duration::ZERO);
        assert!(ok.is_success());
        assert!(ok.contains("Completed."));

        let failed = ok.clone().with_failure("MINOR:");
        assert!(!failed.is_success());

        let timed_out = ok.clone().with_timeout();
        assert!(!timed_out.is_success());
        assert!(timed_out.failure_message.is_none());

        let interrupted = ok.with_interruption("Channel error: Channel closed");
        assert!(!interrupted.is_success());
        assert!(interrupted.interrupted);
        assert_eq!(interrupted.raw_result, "admin save\nCompleted.\nA:r#");
    }
}
