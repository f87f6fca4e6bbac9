//! Utility modules
//!
//! - [`email`]: Email address shape checks and mailbox naming (RFC 5321)

pub mod email;

pub use email::{domain_of, mailbox_name, validate_address};
