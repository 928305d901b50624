//! Strictly ordered execution of a fixed command sequence.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::command::CommandDescriptor;
use super::response::Response;
use super::session::Session;
use crate::error::DriverError;
use crate::store::TranscriptSink;
use crate::transport::Transport;

/// Outcome of one sequence run.
#[derive(Debug, Default)]
pub struct SequenceReport {
    /// Commands that completed successfully, in order.
    pub executed: Vec<String>,

    /// Every response captured, including the failing one.
    pub responses: Vec<Response>,

    /// Set when the sequence stopped early.
    pub failure: Option<DriverError>,
}

impl SequenceReport {
    /// Whether every command completed.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Command the sequence stopped at.
    pub fn aborted_at(&self) -> Option<&str> {
        match &self.failure {
            Some(DriverError::SequenceAborted { command, .. }) => Some(command),
            _ => None,
        }
    }

    /// Response to `command`, if it ran.
    pub fn response_for(&self, command: &str) -> Option<&Response> {
        self.responses.iter().find(|r| r.command == command)
    }
}

/// Runs command sequences, writing each command's raw output to a
/// transcript before judging it.
pub struct Sequencer {
    transcript: Arc<dyn TranscriptSink>,
    delay: Duration,
}

impl Sequencer {
    pub fn new(transcript: Arc<dyn TranscriptSink>) -> Self {
        Self {
            transcript,
            delay: Duration::from_secs(1),
        }
    }

    /// Pause between consecutive commands.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Execute `commands` in order, stopping at the first failure.
    ///
    /// `label` identifies the device in the transcript.
    pub async fn run<T: Transport>(
        &self,
        session: &mut Session<T>,
        commands: &[CommandDescriptor],
        label: &str,
    ) -> SequenceReport {
        let mut report = SequenceReport::default();

        for (index, command) in commands.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let response = match session.exchange(command).await {
                Ok(response) => response,
                Err(e) => {
                    error!("{}: '{}' failed: {}", label, command.text, e);
                    self.record(label, &command.text, "");
                    report.failure = Some(abort(command, e.to_string()));
                    return report;
                }
            };

            self.record(label, &command.text, &response.raw_result);

            let cause = if response.timed_out {
                Some(DriverError::CommandTimeout {
                    command: command.text.clone(),
                    timeout: command.timeout,
                })
            } else {
                response
                    .failure_message
                    .as_ref()
                    .map(|message| DriverError::CommandFailed {
                        command: command.text.clone(),
                        message: message.clone(),
                    })
            };
            report.responses.push(response);

            if let Some(cause) = cause {
                error!("{}: {}", label, cause);
                report.failure = Some(abort(command, cause.to_string()));
                return report;
            }

            debug!("{}: '{}' completed", label, command.text);
            report.executed.push(command.text.clone());
        }

        info!("{}: {} commands completed", label, report.executed.len());
        report
    }

    fn record(&self, label: &str, command: &str, output: &str) {
        let entry = format!("--- COMMAND: {command} [{label}] ---\n{output}\n");
        if let Err(e) = self.transcript.write(&entry) {
            warn!("{}: transcript write failed: {}", label, e);
        }
    }
}

fn abort(command: &CommandDescriptor, message: String) -> DriverError {
    DriverError::SequenceAborted {
        command: command.text.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Completion;
    use crate::driver::Profile;
    use crate::platform::sros;
    use crate::store::MemoryTranscript;
    use crate::testing::{FakeTransport, Script};
    use secrecy::SecretString;

    const PROMPT: &str = "A:router-1# ";

    fn script() -> Script {
        Script::new(PROMPT)
            .on("ssh 10.0.0.1", "ssh 10.0.0.1\npassword: ")
            .on("pw", "\nA:router-1# ")
    }

    fn all_ok(script: Script) -> Script {
        script
            .on_command("admin save", "Completed.")
            .on_command("admin save index detail", "Completed.")
            .on_command("admin redundancy synchronize config", "Completed.")
            .on_command("admin redundancy synchronize boot-env", "Completed.")
            .on_command(
                "show redundancy synchronization",
                "Boot/Config Sync Status : All boot environment synchronized",
            )
    }

    async fn ready_session(script: Script) -> (Session<FakeTransport>, Arc<std::sync::Mutex<Vec<String>>>) {
        let transport = FakeTransport::new(script).with_login_command("ssh 10.0.0.1");
        let sent = transport.sent();
        let profile = Arc::new(Profile::new(sros::platform()).unwrap());
        let mut session = Session::new(transport, profile, "10.0.0.1");
        session
            .bootstrap(&SecretString::from("pw".to_string()), Duration::from_secs(60))
            .await
            .unwrap();
        (session, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sequence() {
        let (mut session, _) = ready_session(all_ok(script())).await;
        let transcript = Arc::new(MemoryTranscript::new());
        let sequencer = Sequencer::new(transcript.clone());
        let commands = sros::platform().maintenance;

        let report = sequencer.run(&mut session, &commands, "router-1").await;
        assert!(report.is_complete());
        assert_eq!(report.executed.len(), commands.len());
        assert!(
            report
                .response_for("show redundancy synchronization")
                .unwrap()
                .contains("All boot environment synchronized")
        );
        assert_eq!(transcript.contents().matches("--- COMMAND:").count(), commands.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_kth_failure() {
        let commands = sros::platform().maintenance;
        for k in 1..=commands.len() {
            if !matches!(commands[k - 1].completion, Completion::Marker(_)) {
                continue;
            }
            let failing = &commands[k - 1].text;
            let script = all_ok(script()).on_command(failing, "MAJOR: operation Failed");
            let (mut session, sent) = ready_session(script).await;
            let sequencer = Sequencer::new(Arc::new(MemoryTranscript::new()));

            let report = sequencer.run(&mut session, &commands, "router-1").await;

            assert_eq!(report.executed.len(), k - 1);
            assert_eq!(report.aborted_at(), Some(failing.as_str()));
            let sent = sent.lock().unwrap().clone();
            for later in &commands[k..] {
                assert!(!sent.contains(&later.text), "'{}' was sent after failure", later.text);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_and_keeps_transcript() {
        let script = all_ok(script()).on_command("admin redundancy synchronize config", "Syncing...");
        let (mut session, sent) = ready_session(script).await;
        let transcript = Arc::new(MemoryTranscript::new());
        let sequencer = Sequencer::new(transcript.clone());
        let commands = sros::platform().maintenance;

        let report = sequencer.run(&mut session, &commands, "router-1").await;

        assert_eq!(report.executed, vec!["admin save", "admin save index detail"]);
        assert!(matches!(
            report.failure,
            Some(DriverError::SequenceAborted { ref message, .. }) if message.contains("did not complete")
        ));
        assert!(transcript.contents().contains("Syncing..."));
        assert!(!sent.lock().unwrap().iter().any(|l| l.contains("boot-env")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_commands() {
        let (mut session, _) = ready_session(all_ok(script())).await;
        let sequencer =
            Sequencer::new(Arc::new(MemoryTranscript::new())).with_delay(Duration::from_secs(5));
        let commands = sros::platform().maintenance;

        let start = tokio::time::Instant::now();
        let report = sequencer.run(&mut session, &commands, "router-1").await;
        assert!(report.is_complete());
        assert!(start.elapsed() >= Duration::from_secs(5 * (commands.len() as u64 - 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_channel_keeps_partial_output() {
        let script = all_ok(script())
            .on("admin save", "admin save\nWriting configuration to cf3:/config.cfg\n")
            .hang_up_after("admin save");
        let (mut session, sent) = ready_session(script).await;
        let transcript = Arc::new(MemoryTranscript::new());
        let sequencer = Sequencer::new(transcript.clone());
        let commands = sros::platform().maintenance;

        let report = sequencer.run(&mut session, &commands, "router-1").await;

        assert!(report.executed.is_empty());
        assert_eq!(report.aborted_at(), Some("admin save"));
        assert!(report.response_for("admin save").unwrap().interrupted);
        assert!(
            transcript
                .contents()
                .contains("--- COMMAND: admin save [router-1] ---\nadmin save\nWriting configuration to cf3:/config.cfg")
        );
        assert!(!sent.lock().unwrap().iter().any(|l| l == "admin save index detail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_check_wording_does_not_abort() {
        let script = all_ok(script()).on_command(
            "show redundancy synchronization",
            "Last Config Sync Failed : never\nBoot/Config Sync Status : All boot environment synchronized",
        );
        let (mut session, _) = ready_session(script).await;
        let sequencer = Sequencer::new(Arc::new(MemoryTranscript::new()));
        let commands = sros::platform().maintenance;

        let report = sequencer.run(&mut session, &commands, "router-1").await;
        assert!(report.is_complete());
        assert_eq!(report.executed.len(), commands.len());
    }
}
