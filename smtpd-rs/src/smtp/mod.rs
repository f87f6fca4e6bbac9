//! SMTP receiver (RFC 5321)
//!
//! - [`server`]: accept loop, one task per connection
//! - [`context`]: live-session accounting and shutdown
//! - [`session`]: per-connection state machine
//! - [`connection`]: line reader and reply writer with the idle deadline
//! - [`commands`]: verb and argument parsing
//! - [`envelope`]: sender, recipients and body of one transaction
//! - [`response`]: reply codes and wire format

pub mod commands;
pub mod connection;
pub mod context;
pub mod envelope;
pub mod response;
pub mod server;
pub mod session;

pub use commands::{MailFrom, SmtpCommand};
pub use connection::{ReadLine, SmtpConnection, MAX_LINE_LENGTH};
pub use context::{ServerContext, SessionGuard};
pub use envelope::Envelope;
pub use response::Reply;
pub use server::SmtpServer;
pub use session::{CloseReason, DataLine, SmtpSession, SmtpState};
