//! Outbound mail boundary.

use crate::error::AppResult;
use async_trait::async_trait;

/// A plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Sends mail through an external provider.
///
/// The dispatcher only uses [`Mailer::send_stack_trace`], to notify operators
/// about recovered panics.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a message.
    async fn send(&self, mail: Mail) -> AppResult<()>;

    /// Sends a crash description to the operator mailbox.
    async fn send_stack_trace(&self, subject: &str, trace: &str) -> AppResult<()>;
}
