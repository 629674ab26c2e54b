//! Administrator notifications.

use crate::config::ToolCommand;
use crate::error::{IngestError, Result};
use crate::executor::{CommandExecutor, CommandRequest, failure_message};
use log::debug;

/// A plain-text message to the archive administrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

impl Notification {
    /// Returns the recipients as a single comma-separated list.
    #[must_use]
    pub fn recipient_list(&self) -> String {
        self.recipients.join(", ")
    }

    /// Renders the message with headers, ready for a mail transfer agent.
    #[must_use]
    pub fn to_message(&self, from: &str) -> String {
        format!(
            "From: {from}\nTo: {}\nSubject: {}\n\n{}\n",
            self.recipient_list(),
            self.subject,
            self.body
        )
    }
}

/// Delivers notifications.
#[cfg_attr(test, mockall::automock)]
pub trait Mailer {
    /// Sends `notification`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed over for
    /// delivery.
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Hands messages to a sendmail-compatible program on stdin.
pub struct SendmailMailer<'a, E: CommandExecutor> {
    executor: &'a E,
    command: &'a ToolCommand,
    from: &'a str,
}

impl<'a, E: CommandExecutor> SendmailMailer<'a, E> {
    /// Creates a mailer running `command` with `from` as sender.
    #[must_use]
    pub const fn new(executor: &'a E, command: &'a ToolCommand, from: &'a str) -> Self {
        Self {
            executor,
            command,
            from,
        }
    }
}

impl<E: CommandExecutor> Mailer for SendmailMailer<'_, E> {
    fn send(&self, notification: &Notification) -> Result<()> {
        let message = notification.to_message(self.from);
        let args = self.command.args_with(&[]);
        let request =
            CommandRequest::new(&self.command.program, &args).with_stdin(message.as_bytes());

        let output = self.executor.run(&request)?;
        if !output.status.success() {
            return Err(IngestError::Tool {
                tool: self.command.program.clone(),
                message: failure_message(&output),
            });
        }
        debug!("mailed {}", notification.recipient_list());
        Ok(())
    }
}
