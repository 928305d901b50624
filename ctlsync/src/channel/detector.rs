//! Prompt and state detection over the accumulated session text.
//!
//! The detector never reads from the channel itself. Callers append to a
//! [`PatternBuffer`] and re-evaluate after every read.
//!
//! A command is complete when the last non-empty line ends with a device
//! prompt. Commands that print a terminal marker word (`Completed.`) also need
//! that marker somewhere before the prompt: SR OS can redraw the prompt while
//! an `admin` operation is still running, so a prompt alone does not finish
//! them. Failure markers are only judged for those marker commands; show
//! commands legitimately print words like `Failed` in their tables.

use regex::Regex;

use super::buffer::{last_line_span, last_non_empty_line};
use crate::error::{ChannelError, Result};
use crate::platform::PlatformDefinition;

/// What the login handshake is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `Are you sure you want to continue connecting (yes/no)?`
    HostKeyConfirmation,
    /// Password prompt.
    CredentialRequest,
    /// Explicit permission denial.
    PermissionDenied,
    /// The jump host's ssh client could not reach the device.
    Unreachable,
    /// A device prompt ends the buffer.
    Prompt,
    /// Nothing recognised yet.
    Pending,
}

/// How a command signals that it has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Trailing device prompt.
    Prompt,
    /// Trailing prompt of any kind (`#` or `>`); used while the vendor is
    /// still unknown.
    AnyPrompt,
    /// The marker word followed, eventually, by a trailing device prompt.
    Marker(String),
}

impl Completion {
    /// Marker completion, e.g. `Completion::marker("Completed.")`.
    pub fn marker(word: impl Into<String>) -> Self {
        Completion::Marker(word.into())
    }
}

/// Resolution of a running command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandState {
    /// Keep reading.
    Pending,
    /// Completion rule satisfied.
    Complete,
    /// A marker command's prompt came back carrying an explicit error
    /// marker and no completion marker.
    Failed(String),
}

/// Progress of [`Detector::advance`] over one command's output.
#[derive(Debug, Clone, Default)]
pub struct CommandScan {
    scanned: usize,
    marker_seen: bool,
    failure: Option<String>,
}

/// Regex-based classifier for session text.
#[derive(Debug, Clone)]
pub struct Detector {
    device_prompt: Regex,
    any_prompt: Regex,
    host_key: Regex,
    credential: Regex,
    denied: Regex,
    unreachable: Regex,
    failure_markers: Vec<String>,
}

impl Detector {
    /// Build a detector from a device prompt pattern and failure markers.
    ///
    /// `device_prompt` is matched against the last non-empty line and should
    /// be anchored at the end (`...#\s*$`).
    pub fn new(device_prompt: &str, failure_markers: Vec<String>) -> Result<Self> {
        let compile = |p: &str| Regex::new(p).map_err(ChannelError::InvalidPattern);
        Ok(Self {
            device_prompt: compile(device_prompt)?,
            any_prompt: compile(r"[>#]\s*$")?,
            host_key: compile(r"(?i)are you sure you want to continue connecting")?,
            credential: compile(r"(?i)password:\s*$")?,
            denied: compile(r"(?i)permission denied|access denied|authentication failed")?,
            unreachable: compile(
                r"(?i)connection refused|no route to host|connection timed out|could not resolve hostname|host is unreachable|connection closed by|connection to \S+ closed",
            )?,
            failure_markers,
        })
    }

    /// Build the detector for a platform definition.
    pub fn for_platform(platform: &PlatformDefinition) -> Result<Self> {
        Self::new(&platform.prompt_pattern, platform.failed_when_contains.clone())
    }

    /// Whether `line` ends with a device prompt.
    pub fn is_device_prompt(&self, line: &str) -> bool {
        self.device_prompt.is_match(line)
    }

    /// Whether `line` ends with any shell prompt (`#`, `>`, `$`).
    pub fn is_shell_prompt(&self, line: &str) -> bool {
        self.any_prompt.is_match(line) || line.trim_end().ends_with('$')
    }

    /// Byte offset in `line` where a trailing prompt starts.
    ///
    /// Patterns may consume a delimiter in front of the prompt; a capture
    /// group named `prompt` marks the prompt itself.
    fn prompt_start(pattern: &Regex, line: &str) -> Option<usize> {
        let caps = pattern.captures(line)?;
        let start = caps
            .name("prompt")
            .or_else(|| caps.get(0))
            .map(|m| m.start())?;
        Some(start)
    }

    /// Classify text seen during login.
    ///
    /// Denials and routing errors win over prompts so a trailing jump-host
    /// prompt after `Permission denied` is not mistaken for success.
    pub fn login_signal(&self, tail: &str) -> Signal {
        let last = last_non_empty_line(tail);
        if self.denied.is_match(tail) {
            Signal::PermissionDenied
        } else if self.unreachable.is_match(tail) {
            Signal::Unreachable
        } else if self.host_key.is_match(tail) {
            Signal::HostKeyConfirmation
        } else if self.credential.is_match(last) {
            Signal::CredentialRequest
        } else if self.is_device_prompt(last) || self.any_prompt.is_match(last) {
            Signal::Prompt
        } else {
            Signal::Pending
        }
    }

    /// Decide whether a command's captured output is finished.
    pub fn command_state(&self, text: &str, completion: &Completion) -> CommandState {
        self.advance(&mut CommandScan::default(), text, completion)
    }

    /// Incremental form of [`Detector::command_state`] for a growing buffer.
    ///
    /// Text in front of a matched prompt never changes once received, so it
    /// is searched for the marker and failure markers only once; `scan`
    /// remembers how far that search got.
    pub fn advance(&self, scan: &mut CommandScan, text: &str, completion: &Completion) -> CommandState {
        let (line_start, last) = last_line_span(text);
        let pattern = match completion {
            Completion::AnyPrompt => &self.any_prompt,
            Completion::Prompt | Completion::Marker(_) => &self.device_prompt,
        };
        let Some(prompt_start) = Self::prompt_start(pattern, last) else {
            return CommandState::Pending;
        };
        let limit = line_start + prompt_start;
        let before_prompt = &text[..limit];

        // A lone prompt with nothing in front of it is a late prompt from
        // the previous command, not this command's answer.
        if before_prompt.trim().is_empty() {
            return CommandState::Pending;
        }

        let Completion::Marker(marker) = completion else {
            return CommandState::Complete;
        };

        // Back off so a marker split across two reads is still found.
        let overlap = self
            .failure_markers
            .iter()
            .map(String::len)
            .chain([marker.len()])
            .max()
            .unwrap_or(0);
        let mut from = scan.scanned.min(limit).saturating_sub(overlap);
        while !text.is_char_boundary(from) {
            from -= 1;
        }
        let fresh = &text[from..limit];
        scan.scanned = scan.scanned.max(limit);

        if !scan.marker_seen && fresh.contains(marker.as_str()) {
            scan.marker_seen = true;
        }
        if scan.failure.is_none() {
            scan.failure = self.failure_marker(fresh).map(str::to_string);
        }

        if scan.marker_seen {
            CommandState::Complete
        } else if let Some(found) = &scan.failure {
            CommandState::Failed(found.clone())
        } else {
            CommandState::Pending
        }
    }

    /// First configured failure marker contained in `text`.
    pub fn failure_marker(&self, text: &str) -> Option<&str> {
        self.failure_markers
            .iter()
            .find(|m| text.contains(m.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sros;

    fn detector() -> Detector {
        Detector::for_platform(&sros::platform()).unwrap()
    }

    #[test]
    fn test_device_prompt_grammar() {
        let d = detector();
        assert!(d.is_device_prompt("A:router-1#"));
        assert!(d.is_device_prompt("*A:router-1# "));
        assert!(d.is_device_prompt("B:admin@node.lab#"));
        assert!(d.is_device_prompt("A:router>config>router$"));
        assert!(!d.is_device_prompt("user@jump:~$"));
        assert!(!d.is_device_prompt("A:router# admin save"));
        assert!(!d.is_device_prompt("<HUAWEI>"));
    }

    #[test]
    fn test_login_signals() {
        let d = detector();
        assert_eq!(
            d.login_signal("The authenticity of host '10.1.1.1' can't be established.\nAre you sure you want to continue connecting (yes/no)? "),
            Signal::HostKeyConfirmation
        );
        assert_eq!(d.login_signal("admin@10.1.1.1's password: "), Signal::CredentialRequest);
        assert_eq!(
            d.login_signal("Permission denied, please try again.\nadmin@10.1.1.1's password: "),
            Signal::PermissionDenied
        );
        assert_eq!(
            d.login_signal("ssh: connect to host 10.1.1.1 port 22: Connection refused\nuser@jump:~$ "),
            Signal::Unreachable
        );
        assert_eq!(d.login_signal("SR OS banner\n\nA:router-1# "), Signal::Prompt);
        assert_eq!(d.login_signal("Welcome\n"), Signal::Pending);
    }

    #[test]
    fn test_prompt_completion() {
        let d = detector();
        let out = "show card\n===\nCard Summary\n===\nA:router-1# ";
        assert_eq!(d.command_state(out, &Completion::Prompt), CommandState::Complete);

        let partial = "show card\n===\nCard Summary\n";
        assert_eq!(d.command_state(partial, &Completion::Prompt), CommandState::Pending);
    }

    #[test]
    fn test_lone_prompt_is_pending() {
        let d = detector();
        assert_eq!(d.command_state("A:router-1# ", &Completion::Prompt), CommandState::Pending);
        assert_eq!(d.command_state("\n\nA:router-1#", &Completion::Prompt), CommandState::Pending);
    }

    #[test]
    fn test_marker_before_prompt_completes() {
        let d = detector();
        let out = "admin save\nWriting configuration to cf3:/config.cfg\nSaving configuration .... Completed.\nA:router-1# ";
        assert_eq!(d.command_state(out, &Completion::marker("Completed.")), CommandState::Complete);
    }

    #[test]
    fn test_marker_on_same_line_as_prompt_completes() {
        let d = detector();
        let out = "admin redundancy synchronize config\nSyncing configuration......Completed.A:router-1#";
        assert_eq!(d.command_state(out, &Completion::marker("Completed.")), CommandState::Complete);
    }

    #[test]
    fn test_prompt_without_marker_stays_pending() {
        let d = detector();
        let completion = Completion::marker("Completed.");
        let mut out = String::from("admin redundancy synchronize boot-env\nSyncing boot/config files\nA:router-1# ");
        assert_eq!(d.command_state(&out, &completion), CommandState::Pending);

        out.push_str("\n...Completed.\nA:router-1# ");
        assert_eq!(d.command_state(&out, &completion), CommandState::Complete);
    }

    #[test]
    fn test_marker_after_prompt_does_not_count() {
        let d = detector();
        let out = "admin save\nA:router-1# Completed.";
        assert_eq!(d.command_state(out, &Completion::marker("Completed.")), CommandState::Pending);
    }

    #[test]
    fn test_error_marker_fails_marker_command() {
        let d = detector();
        let out = "admin save\nMINOR: CLI Could not save.\nA:router-1# ";
        assert_eq!(
            d.command_state(out, &Completion::marker("Completed.")),
            CommandState::Failed("MINOR:".into())
        );
    }

    #[test]
    fn test_any_prompt_accepts_foreign_vendor() {
        let d = detector();
        let out = "show card\n              ^\nError: Unrecognized command found at '^' position.\n<HUAWEI>";
        assert_eq!(d.command_state(out, &Completion::AnyPrompt), CommandState::Complete);
        assert_eq!(d.command_state(out, &Completion::Prompt), CommandState::Pending);
    }

    #[test]
    fn test_prompt_command_ignores_failure_words() {
        let d = detector();
        let out = "show redundancy synchronization\nLast Config Sync Failed : 2024/01/01\nA:router-1# ";
        assert_eq!(d.command_state(out, &Completion::Prompt), CommandState::Complete);
    }

    #[test]
    fn test_jump_host_fallback_is_unreachable() {
        let d = detector();
        assert_eq!(
            d.login_signal("\nConnection closed by 10.0.0.7 port 22\nroot@jump:~# "),
            Signal::Unreachable
        );
        assert_eq!(
            d.login_signal("\nConnection to 10.0.0.7 closed.\nroot@jump:~# "),
            Signal::Unreachable
        );
    }

    #[test]
    fn test_advance_scans_each_region_once() {
        let d = detector();
        let completion = Completion::marker("Completed.");
        let mut scan = CommandScan::default();
        let mut out = String::from("admin save index detail\n");
        for i in 0..50 {
            out.push_str(&format!("Saving index file {i} ...\n"));
            assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Pending);
        }
        out.push_str("Comp");
        assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Pending);
        out.push_str("leted.\nA:router-1# ");
        assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Complete);
        assert_eq!(scan.scanned, out.len() - "A:router-1# ".len());
    }

    #[test]
    fn test_advance_marker_split_across_reads() {
        let d = detector();
        let completion = Completion::marker("Completed.");
        let mut scan = CommandScan::default();
        let mut out = String::from("admin save\nSaving .... Compl\nA:router-1# ");
        assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Pending);
        out.push_str("\neted.\nA:router-1# ");
        // the redrawn prompt splits the word, so it must not count as a marker
        assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Pending);
    }

    #[test]
    fn test_advance_failure_seen_on_redrawn_prompt() {
        let d = detector();
        let completion = Completion::marker("Completed.");
        let mut scan = CommandScan::default();
        let mut out = String::from("admin save\nWriting configuration\nA:router-1# ");
        assert_eq!(d.advance(&mut scan, &out, &completion), CommandState::Pending);
        out.push_str("\nMINOR: CLI Could not save.\nA:router-1# ");
        assert_eq!(
            d.advance(&mut scan, &out, &completion),
            CommandState::Failed("MINOR:".into())
        );
    }
}
