//! Recipient address parsing and normalization
//!
//! Free-text recipient lists (`"Alice <alice@x.com>, bob@y.org"`) are
//! split, validated and canonicalized before either backend sees them.
//! Invalid or empty entries are dropped silently; the address part is
//! lower-cased while the display name is preserved in the formatted form.

use crate::error::{Error, Result};
use email_address::EmailAddress;

/// A single validated recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// Lower-cased bare address, e.g. `alice@example.com`.
    pub address: String,
    /// Display form: `"Alice <alice@example.com>"` or the bare address.
    pub formatted: String,
}

/// Whether `raw` is a syntactically valid bare email address.
#[must_use]
pub fn is_valid_address(raw: &str) -> bool {
    raw.parse::<EmailAddress>().is_ok()
}

/// Split a free-text recipient list into validated addresses.
///
/// Entries that do not contain a valid address are dropped.
#[must_use]
pub fn parse_addresses(raw: &str) -> Vec<ParsedAddress> {
    raw.split([',', ';']).filter_map(parse_entry).collect()
}

fn parse_entry(entry: &str) -> Option<ParsedAddress> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    // "Name <addr>" or bare address.
    let (name, addr) = match (entry.find('<'), entry.rfind('>')) {
        (Some(start), Some(end)) if start < end => {
            let name = entry[..start].trim().trim_matches('"').trim();
            (name, entry[start + 1..end].trim())
        }
        _ => ("", entry),
    };

    if !is_valid_address(addr) {
        return None;
    }

    let address = addr.to_ascii_lowercase();
    let formatted = if name.is_empty() {
        address.clone()
    } else {
        format!("{name} <{address}>")
    };

    Some(ParsedAddress { address, formatted })
}

/// Join the valid formatted addresses of `raw` with `", "`.
///
/// # Errors
///
/// Returns [`Error::Validation`] when no entry validates.
pub fn normalize_recipients(raw: &str) -> Result<String> {
    let parsed = parse_addresses(raw);
    if parsed.is_empty() {
        return Err(Error::Validation(
            "to must include at least one valid email address".into(),
        ));
    }
    Ok(parsed
        .iter()
        .map(|a| a.formatted.as_str())
        .collect::<Vec<_>>()
        .join(", "))
}
