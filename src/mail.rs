use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailConfig;

const SUBJECT: &str = "Verify your signature";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("delivery refused: {0}")]
    Refused(String),
}

/// Delivers verification links to signers.
pub trait Notifier: Send + Sync {
    fn send(&self, email: &str, name: &str, token: &str) -> Result<(), NotifyError>;

    /// Fails for addresses `send` could never deliver to.
    fn check_recipient(&self, email: &str) -> Result<(), NotifyError> {
        email.parse::<Address>()?;
        Ok(())
    }
}

pub fn verification_url(base_url: &str, token: &str) -> String {
    format!("{}/verify?token={}", base_url.trim_end_matches('/'), token)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn plain_body(name: &str, url: &str) -> String {
    format!(
        "Hello {name},\n\n\
         Thank you for signing our open letter. Please click the link below to verify your signature:\n\n\
         {url}\n\n\
         If you didn't sign this open letter, please ignore this email.\n\n\
         Best regards,\nThe Open Letter Team"
    )
}

fn html_body(name: &str, url: &str) -> String {
    [
        format!("<p>Hello {},</p>", escape_html(name)).as_str(),
        "<p>Thank you for signing our open letter. Please click the link below to <b>verify your signature</b>:</p>",
        format!("<p><a href=\"{url}\">{url}</a></p>").as_str(),
        "<p>If you didn't sign this open letter, please ignore this email.</p>",
        "<p>Best regards,<br>The Open Letter Team</p>",
    ]
    .concat()
}

pub fn build_email(
    from: &Mailbox,
    email: &str,
    name: &str,
    url: &str,
) -> Result<Message, NotifyError> {
    let to = Mailbox::new(Some(name.to_owned()), email.parse::<Address>()?);

    let message = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(SUBJECT)
        .multipart(MultiPart::alternative_plain_html(
            plain_body(name, url),
            html_body(name, url),
        ))?;

    Ok(message)
}

pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from: Mailbox,
    base_url: String,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig, base_url: &str) -> Result<Self, NotifyError> {
        let mut builder = SmtpTransport::from_url(&config.url)?;
        if let Some((username, password)) = &config.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from: config.from.parse()?,
            base_url: base_url.to_owned(),
        })
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, email: &str, name: &str, token: &str) -> Result<(), NotifyError> {
        let url = verification_url(&self.base_url, token);
        let message = build_email(&self.from, email, name, &url)?;

        let response = self.mailer.send(&message)?;
        info!(code = ?response.code(), "verification email sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub email: String,
    pub name: String,
    pub token: String,
}

/// Keeps notices in memory instead of delivering them.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<SentNotice>>,
    refuse: AtomicBool,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `send` fail.
    pub fn refuse_delivery(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token_for(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|notice| notice.email == email)
            .map(|notice| notice.token)
    }
}

impl Notifier for MemoryOutbox {
    fn send(&self, email: &str, name: &str, token: &str) -> Result<(), NotifyError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(NotifyError::Refused(format!("outbox closed for {email}")));
        }

        debug!(email, "notice queued in memory");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentNotice {
                email: email.to_owned(),
                name: name.to_owned(),
                token: token.to_owned(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_embeds_token() {
        assert_eq!(
            verification_url("https://letter.example.org/", "abc"),
            "https://letter.example.org/verify?token=abc"
        );
        assert_eq!(
            verification_url("http://localhost:3000", "abc"),
            "http://localhost:3000/verify?token=abc"
        );
    }

    #[test]
    fn bodies_carry_link_and_escape_name() {
        let url = "https://letter.example.org/verify?token=abc";

        let html = html_body("<script>Eve</script>", url);
        assert!(html.contains("&lt;script&gt;Eve&lt;/script&gt;"));
        assert!(html.contains(&format!("<a href=\"{url}\">")));

        let text = plain_body("Ada", url);
        assert!(text.starts_with("Hello Ada,"));
        assert!(text.contains(url));
    }

    #[test]
    fn message_is_addressed_to_signer() {
        let from: Mailbox = "Open Letter Team <letter@example.org>"
            .parse()
            .expect("valid mailbox");
        let message = build_email(
            &from,
            "ada@example.com",
            "Ada Lovelace",
            "https://x/verify?token=t",
        )
        .expect("message builds");

        let formatted = String::from_utf8(message.formatted()).expect("utf-8 headers");
        assert!(formatted.contains("ada@example.com"));
        assert!(formatted.contains("Subject: Verify your signature"));
    }

    #[test]
    fn malformed_recipient_is_rejected() {
        let from: Mailbox = "letter@example.org".parse().expect("valid mailbox");
        assert!(matches!(
            build_email(&from, "not an address", "Ada", "https://x"),
            Err(NotifyError::Address(_))
        ));
    }

    #[test]
    fn outbox_records_and_refuses() {
        let outbox = MemoryOutbox::new();
        outbox.send("ada@example.com", "Ada", "t1").expect("delivered");
        assert_eq!(outbox.token_for("ada@example.com").as_deref(), Some("t1"));

        outbox.refuse_delivery(true);
        assert!(outbox.send("bob@example.com", "Bob", "t2").is_err());
        assert_eq!(outbox.sent().len(), 1);
    }
}
