//! Outbound integrations: the rate-limited certificate lookup provider and
//! the email / chat delivery channels.

pub mod chat;
pub mod email;
pub mod lookup;

pub use chat::{ChatSender, WebhookChatService};
pub use email::{EmailSender, SmtpEmailService};
pub use lookup::{LookupProvider, LookupResult, RateLimitedClient};
