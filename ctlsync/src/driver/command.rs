//! Static descriptions of the commands a session sends.

use std::time::Duration;

use crate::channel::Completion;

/// One command in a fixed sequence: its text, how completion is detected,
/// and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Text sent to the device (without line terminator).
    pub text: String,

    /// Completion-pattern class.
    pub completion: Completion,

    /// Budget for the whole command, from send to completion.
    pub timeout: Duration,
}

impl CommandDescriptor {
    /// Command finished by the trailing device prompt.
    pub fn prompt(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            completion: Completion::Prompt,
            timeout,
        }
    }

    /// Command that must print `marker` before the trailing prompt.
    pub fn marker(text: impl Into<String>, marker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            completion: Completion::marker(marker),
            timeout,
        }
    }

    /// Command finished by any trailing `#`/`>` prompt.
    pub fn any_prompt(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            completion: Completion::AnyPrompt,
            timeout,
        }
    }
}
