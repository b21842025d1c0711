//! Invitation e-mails over SMTP

use anyhow::{Context, Result};
use lettre::{
    Message, SmtpTransport, Transport, message::Mailbox,
    transport::smtp::authentication::Credentials,
};

use crate::config::SmtpConfig;

/// Invitation details for one recipient
#[derive(Debug, Clone)]
pub struct Invitation<'a> {
    pub to_email: &'a str,
    pub to_name: &'a str,
    pub inviter: &'a str,
    pub plan_title: &'a str,
    pub plan_id: i64,
}

#[derive(Clone)]
struct Mailer {
    transport: SmtpTransport,
    from: Mailbox,
}

/// Sends mail when a relay is configured, otherwise only logs
#[derive(Clone, Default)]
pub struct Notifier {
    mailer: Option<Mailer>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Notifier {
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let Some(relay) = config.relay.as_deref().filter(|r| !r.trim().is_empty()) else {
            return Ok(Self::disabled());
        };

        let mut builder = SmtpTransport::relay(relay)
            .with_context(|| format!("Invalid SMTP relay {relay}"))?;
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from
            .as_deref()
            .or(config.username.as_deref())
            .context("smtp.from or smtp.username is required when smtp.relay is set")?;
        let from: Mailbox = format!("TourWithMe <{from}>")
            .parse()
            .context("Failed to parse from address")?;

        tracing::info!(relay, "SMTP notifications enabled");
        Ok(Self {
            mailer: Some(Mailer {
                transport: builder.build(),
                from,
            }),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Returns whether a mail was actually sent
    pub async fn send_invitation(&self, invitation: &Invitation<'_>) -> Result<bool> {
        let Some(mailer) = &self.mailer else {
            tracing::info!(
                to = invitation.to_email,
                plan_id = invitation.plan_id,
                "SMTP not configured, invitation not mailed"
            );
            return Ok(false);
        };

        let email = invitation_message(mailer.from.clone(), invitation)?;
        let transport = mailer.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("Mail task failed")?
            .context("Failed to send invitation email")?;

        tracing::info!(to = invitation.to_email, plan_id = invitation.plan_id, "sent invitation email");
        Ok(true)
    }
}

fn invitation_message(from: Mailbox, invitation: &Invitation<'_>) -> Result<Message> {
    let to: Mailbox = format!("{} <{}>", invitation.to_name, invitation.to_email)
        .parse()
        .context("Failed to parse to address")?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(format!("{} invited you to \"{}\"", invitation.inviter, invitation.plan_title))
        .body(format!(
            "Hi {},\n\n{} added you to the trip plan \"{}\" on TourWithMe.\n\
             Open your trip plans to see the itinerary and add activities.\n",
            invitation.to_name, invitation.inviter, invitation.plan_title
        ))
        .context("Failed to build invitation email")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Invitation<'static> {
        Invitation {
            to_email: "ravi@example.com",
            to_name: "Ravi",
            inviter: "Asha",
            plan_title: "Goa weekend",
            plan_id: 7,
        }
    }

    #[test]
    fn test_without_relay_is_disabled() {
        let notifier = Notifier::from_config(&SmtpConfig::default()).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn test_relay_requires_sender() {
        let config = SmtpConfig {
            relay: Some("smtp.example.com".into()),
            ..SmtpConfig::default()
        };
        assert!(Notifier::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_disabled_notifier_only_logs() {
        assert!(!Notifier::disabled().send_invitation(&invitation()).await.unwrap());
    }

    #[test]
    fn test_invitation_message() {
        let from: Mailbox = "TourWithMe <noreply@example.com>".parse().unwrap();
        let message = invitation_message(from, &invitation()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: Ravi <ravi@example.com>"));
        assert!(raw.contains("Goa weekend"));
    }
}
