//! Delivery of password reset links.

use tracing::info;

/// A reset link addressed to one user.
#[derive(Clone, Debug)]
pub struct ResetEmail {
    pub to_email: String,
    pub link: String,
}

#[derive(Debug)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to send email: {}", self.0)
    }
}

impl std::error::Error for MailError {}

/// Reset link delivery abstraction.
pub trait ResetMailer: Send + Sync {
    /// Deliver the message or return an error; the caller logs failures.
    fn send(&self, message: &ResetEmail) -> Result<(), MailError>;
}

/// Local sender that logs the link instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl ResetMailer for LogMailer {
    fn send(&self, message: &ResetEmail) -> Result<(), MailError> {
        info!(
            to_email = %message.to_email,
            link = %message.link,
            "Password reset email (log delivery)"
        );
        Ok(())
    }
}
