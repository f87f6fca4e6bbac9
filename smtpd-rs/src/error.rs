use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Timed out waiting for the peer")]
    Timeout,
}

impl From<::config::ConfigError> for SmtpdError {
    fn from(err: ::config::ConfigError) -> Self {
        SmtpdError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmtpdError>;

/// Protocol failures raised while handling a single command.
///
/// Every variant maps onto exactly one reply code, see [`CommandError::code`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Syntax error, command unrecognized")]
    Unrecognized,

    #[error("Line too long")]
    LineTooLong,

    #[error("Domain name required")]
    DomainRequired,

    #[error("Syntax error in parameters or arguments: {0}")]
    Syntax(String),

    #[error("Bad sequence of commands: {0}")]
    BadSequence(&'static str),

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Message exceeds fixed maximum message size (max {max} bytes)")]
    MessageTooLarge { max: usize },

    #[error("Requested action aborted: local error in processing")]
    DeliveryFailed,
}

impl CommandError {
    pub fn syntax(detail: impl Into<String>) -> Self {
        CommandError::Syntax(detail.into())
    }

    pub fn code(&self) -> u16 {
        match self {
            CommandError::Unrecognized | CommandError::LineTooLong | CommandError::DomainRequired => {
                500
            }
            CommandError::Syntax(_) => 501,
            CommandError::BadSequence(_) => 503,
            CommandError::TooManyRecipients { .. } | CommandError::MessageTooLarge { .. } => 552,
            CommandError::DeliveryFailed => 451,
        }
    }
}

impl From<SmtpdError> for CommandError {
    fn from(err: SmtpdError) -> Self {
        match err {
            SmtpdError::InvalidAddress(detail) => CommandError::Syntax(detail),
            _ => CommandError::DeliveryFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_codes() {
        assert_eq!(CommandError::Unrecognized.code(), 500);
        assert_eq!(CommandError::DomainRequired.code(), 500);
        assert_eq!(CommandError::syntax("bad").code(), 501);
        assert_eq!(CommandError::BadSequence("MAIL first").code(), 503);
        assert_eq!(CommandError::TooManyRecipients { max: 5 }.code(), 552);
        assert_eq!(CommandError::MessageTooLarge { max: 10 }.code(), 552);
        assert_eq!(CommandError::DeliveryFailed.code(), 451);
    }

    #[test]
    fn test_invalid_address_becomes_syntax_error() {
        let err: CommandError = SmtpdError::InvalidAddress("missing @".to_string()).into();
        assert_eq!(err, CommandError::Syntax("missing @".to_string()));
    }
}
