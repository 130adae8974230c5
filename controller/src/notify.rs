use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use comfort_common::{Importance, Notifier, NotifyError};

/// Discord rejects messages longer than this many characters.
const DISCORD_CONTENT_LIMIT: usize = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

fn truncate_content(message: &str) -> &str {
    match message.char_indices().nth(DISCORD_CONTENT_LIMIT) {
        Some((cut, _)) => &message[..cut],
        None => message,
    }
}

pub struct DiscordNotifier {
    agent: ureq::Agent,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            webhook_url,
        }
    }

    /// `None` when `DISCORD_WEBHOOK_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("DISCORD_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(Self::new)
    }

    fn error(&self, message: impl Into<String>) -> NotifyError {
        NotifyError {
            channel: self.name(),
            message: message.into(),
        }
    }
}

impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn notify(&self, message: &str, _importance: Importance) -> Result<(), NotifyError> {
        let body = WebhookMessage {
            content: truncate_content(message),
        };
        match self.agent.post(&self.webhook_url).send_json(&body) {
            Ok(response) if matches!(response.status(), 200 | 204) => Ok(()),
            Ok(response) => Err(self.error(format!("unexpected status {}", response.status()))),
            Err(ureq::Error::Status(status, _)) => Err(self.error(format!("HTTP {status}"))),
            Err(ureq::Error::Transport(transport)) => Err(self.error(transport.kind().to_string())),
        }
    }
}

/// Always-on channel that writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, message: &str, importance: Importance) -> Result<(), NotifyError> {
        match importance {
            Importance::Normal => info!("notification:\n{message}"),
            Importance::Important => warn!("important notification:\n{message}"),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct NotifierSet {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn from_env() -> Self {
        let mut set = Self::default();
        set.add(Box::new(LogNotifier));
        if let Some(discord) = DiscordNotifier::from_env() {
            set.add(Box::new(discord));
        }
        set
    }

    pub fn add(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Sends to every channel; failures are logged and counted, never raised.
    pub fn send(&self, message: &str, importance: Importance) -> usize {
        let mut failures = 0;
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(message, importance) {
                warn!("failed to notify via {}: {err}", notifier.name());
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc};

    struct Recording {
        sent: Rc<RefCell<Vec<(String, Importance)>>>,
        fail: bool,
    }

    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn notify(&self, message: &str, importance: Importance) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError {
                    channel: self.name(),
                    message: "offline".to_string(),
                });
            }
            self.sent.borrow_mut().push((message.to_string(), importance));
            Ok(())
        }
    }

    #[test]
    fn failing_channel_does_not_stop_the_others() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut set = NotifierSet::default();
        set.add(Box::new(Recording {
            sent: Rc::clone(&sent),
            fail: true,
        }));
        set.add(Box::new(Recording {
            sent: Rc::clone(&sent),
            fail: false,
        }));
        set.add(Box::new(LogNotifier));

        let failures = set.send("aircon: `setAll` failed", Importance::Important);

        assert_eq!(failures, 1);
        assert_eq!(
            *sent.borrow(),
            vec![("aircon: `setAll` failed".to_string(), Importance::Important)]
        );
    }

    #[test]
    fn webhook_body_is_content_only() {
        let body = WebhookMessage { content: "PMV 0.42" };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "content": "PMV 0.42" })
        );
    }

    #[test]
    fn long_messages_are_cut_on_a_char_boundary() {
        let message = "温".repeat(DISCORD_CONTENT_LIMIT + 10);
        let cut = truncate_content(&message);
        assert_eq!(cut.chars().count(), DISCORD_CONTENT_LIMIT);
        assert_eq!(truncate_content("short"), "short");
    }
}
