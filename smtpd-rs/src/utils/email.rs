use crate::error::{Result, SmtpdError};

/// Maximum length of the local part of an address (RFC 5321 4.5.3.1.1)
pub const MAX_LOCAL_PART: usize = 64;

/// Maximum length of a domain (RFC 5321 4.5.3.1.2)
pub const MAX_DOMAIN: usize = 255;

/// Maximum length of a reverse-path or forward-path (RFC 5321 4.5.3.1.3)
pub const MAX_PATH: usize = 256;

/// Shape check for `local@domain`.
///
/// No DNS lookups and no mailbox existence checks are performed.
pub fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(SmtpdError::InvalidAddress("address is empty".to_string()));
    }

    if address.len() > MAX_PATH {
        return Err(SmtpdError::InvalidAddress(format!(
            "address longer than {} characters",
            MAX_PATH
        )));
    }

    if address
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
    {
        return Err(SmtpdError::InvalidAddress(
            "address contains illegal characters".to_string(),
        ));
    }

    let (local, domain) = address
        .rsplit_once('@')
        .ok_or_else(|| SmtpdError::InvalidAddress("address must contain @".to_string()))?;

    if local.is_empty() || domain.is_empty() {
        return Err(SmtpdError::InvalidAddress(
            "address parts cannot be empty".to_string(),
        ));
    }

    if local.len() > MAX_LOCAL_PART {
        return Err(SmtpdError::InvalidAddress(format!(
            "local part longer than {} characters",
            MAX_LOCAL_PART
        )));
    }

    if domain.len() > MAX_DOMAIN {
        return Err(SmtpdError::InvalidAddress(format!(
            "domain longer than {} characters",
            MAX_DOMAIN
        )));
    }

    Ok(())
}

/// Domain part of an already validated address
pub fn domain_of(address: &str) -> &str {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("")
}

/// Storage mailbox for a recipient: the lower-cased local part.
///
/// Quoting and characters that could escape a storage directory are stripped,
/// runs of dots collapse to one and dots at either end are dropped. The result
/// is empty when nothing usable is left.
pub fn mailbox_name(address: &str) -> String {
    let local = address
        .rsplit_once('@')
        .map(|(local, _)| local)
        .unwrap_or(address);

    let mut name = String::with_capacity(local.len());
    for c in local
        .trim_matches('"')
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
    {
        if c == '.' && (name.is_empty() || name.ends_with('.')) {
            continue;
        }
        name.extend(c.to_lowercase());
    }

    while name.ends_with('.') {
        name.pop();
    }
    name
}
