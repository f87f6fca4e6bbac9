//! SMTP replies
//!
//! Every reply this server emits is a single `<code> <text>` line.

use crate::error::CommandError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub fn greeting(domain: &str) -> Self {
        Self::new(220, format!("{} ESMTP Service Ready", domain))
    }

    pub fn hello(domain: &str, client_domain: &str) -> Self {
        Self::new(250, format!("{} Hello {}", domain, client_domain))
    }

    pub fn start_data() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    pub fn accepted() -> Self {
        Self::new(250, "OK: Message accepted")
    }

    pub fn closing(domain: &str) -> Self {
        Self::new(221, format!("{} closing connection", domain))
    }

    /// Wire form, terminated by CRLF
    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::new(err.code(), err.to_string())
    }
}
