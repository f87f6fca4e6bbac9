use crate::error::CommandError;
use crate::utils::validate_address;
use tracing::warn;

/// One command line, classified by verb.
///
/// Arguments are kept verbatim; each handler validates its own.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    Mail(String),
    Rcpt(String),
    Data,
    Rset,
    Quit,
    Noop,
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Self {
        let (verb, args) = line
            .split_once(|c: char| c.is_ascii_whitespace())
            .unwrap_or((line, ""));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => SmtpCommand::Helo(args.to_string()),
            "EHLO" => SmtpCommand::Ehlo(args.to_string()),
            "MAIL" => SmtpCommand::Mail(args.to_string()),
            "RCPT" => SmtpCommand::Rcpt(args.to_string()),
            "DATA" => SmtpCommand::Data,
            "RSET" => SmtpCommand::Rset,
            "QUIT" => SmtpCommand::Quit,
            "NOOP" => SmtpCommand::Noop,
            _ => SmtpCommand::Unknown(verb.to_string()),
        }
    }

    pub fn verb(&self) -> &str {
        match self {
            SmtpCommand::Helo(_) => "HELO",
            SmtpCommand::Ehlo(_) => "EHLO",
            SmtpCommand::Mail(_) => "MAIL",
            SmtpCommand::Rcpt(_) => "RCPT",
            SmtpCommand::Data => "DATA",
            SmtpCommand::Rset => "RSET",
            SmtpCommand::Quit => "QUIT",
            SmtpCommand::Noop => "NOOP",
            SmtpCommand::Unknown(verb) => verb,
        }
    }
}

/// Parsed `MAIL FROM:<address> [KEY=VALUE ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFrom {
    pub address: String,
    /// Declared `SIZE=` parameter
    pub size: Option<usize>,
    /// Declared `BODY=` parameter, not interpreted
    pub body: Option<String>,
}

/// Parse the argument of a MAIL command.
///
/// The sender must be enclosed in angle brackets.
pub fn parse_mail_from(args: &str) -> Result<MailFrom, CommandError> {
    let rest = strip_prefix_ignore_case(args.trim_end(), "FROM:")
        .ok_or_else(|| CommandError::syntax("expected MAIL FROM:<address>"))?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);

    let rest = rest.strip_prefix('<').ok_or_else(|| {
        CommandError::syntax("sender address must be enclosed in angle brackets")
    })?;
    let (address, params) = rest
        .split_once('>')
        .ok_or_else(|| CommandError::syntax("unterminated sender address"))?;

    validate_address(address)?;

    let mut mail = MailFrom {
        address: address.to_string(),
        size: None,
        body: None,
    };

    if params.is_empty() {
        return Ok(mail);
    }

    let params = params
        .strip_prefix(' ')
        .ok_or_else(|| CommandError::syntax("expected space before MAIL parameters"))?;

    for param in params.split(' ').filter(|p| !p.is_empty()) {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| CommandError::syntax(format!("malformed MAIL parameter {}", param)))?;

        match key.to_ascii_uppercase().as_str() {
            "BODY" => mail.body = Some(value.to_string()),
            "SIZE" => {
                let invalid = || CommandError::syntax(format!("invalid SIZE value {}", value));
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let size = value.parse::<usize>().map_err(|_| invalid())?;
                mail.size = Some(size);
            }
            _ => warn!("Ignoring unrecognized MAIL parameter {}", key),
        }
    }

    Ok(mail)
}

/// Parse the argument of a RCPT command.
///
/// Unlike MAIL, angle brackets around the recipient are optional.
pub fn parse_rcpt_to(args: &str) -> Result<String, CommandError> {
    let rest = strip_prefix_ignore_case(args.trim_end(), "TO:")
        .ok_or_else(|| CommandError::syntax("expected RCPT TO:<address>"))?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);

    let address = match rest.strip_prefix('<') {
        Some(inner) => inner
            .strip_suffix('>')
            .ok_or_else(|| CommandError::syntax("unterminated recipient address"))?,
        None => rest,
    };

    if address.is_empty() {
        return Err(CommandError::syntax("recipient address required"));
    }

    validate_address(address)?;

    Ok(address.to_string())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
