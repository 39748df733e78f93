//! Subdomain name canonicalization
//!
//! Sources return names in whatever shape their backing data has: wildcard
//! certificate entries, multi-line certificate SAN fields, mixed case, email
//! style `user@host` entries and the occasional bare IP address. Everything
//! downstream works on the canonical form produced here.

use std::collections::BTreeSet;

/// Maximum length of a DNS name in presentation form
const MAX_NAME_LEN: usize = 253;

/// Normalize raw source output into a deduplicated set of canonical names
///
/// Each raw entry may hold several names separated by newlines. Every
/// name is lowercased, trimmed, stripped of wildcard prefixes and the trailing
/// root dot, and has `@` replaced with `.`. Names that are empty, IP-like
/// (only digits and dots), contain whitespace, have empty labels or exceed
/// 253 characters are dropped.
///
/// Normalizing an already normalized set returns the same set.
///
/// # Example
///
/// ```
/// use subwatch_core::normalize;
///
/// let names = normalize(["*.API.example.com\nwww.example.com", "10.0.0.1"]);
/// assert_eq!(
///     names.into_iter().collect::<Vec<_>>(),
///     vec!["api.example.com", "www.example.com"]
/// );
/// ```
pub fn normalize<I>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    raw.into_iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split('\n')
                .filter_map(normalize_one)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Canonicalize a single name, or `None` if it is not a usable hostname
pub fn normalize_one(raw: &str) -> Option<String> {
    let mut name = raw.trim().to_lowercase().replace('@', ".");

    while let Some(rest) = name.strip_prefix("*.") {
        name = rest.to_string();
    }

    let name = name.trim_end_matches('.');

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return None;
    }

    // crt.sh reports certificates issued to bare addresses
    if name.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    if name.chars().any(char::is_whitespace) {
        return None;
    }

    if name.split('.').any(str::is_empty) {
        return None;
    }

    Some(name.to_string())
}

/// Validate and canonicalize a root domain supplied by an operator
///
/// Accepts RFC 1035 style names: at least two labels, each 1 to 63
/// characters of ASCII letters, digits and hyphens, not starting or ending
/// with a hyphen. Surrounding whitespace and a trailing dot are removed and
/// the result is lowercased.
pub fn canonical_root_domain(raw: &str) -> Result<String, crate::Error> {
    let domain = raw.trim().trim_end_matches('.').to_lowercase();

    if domain.is_empty() {
        return Err(crate::Error::invalid_input("Domain name cannot be empty"));
    }

    if domain.len() > MAX_NAME_LEN {
        return Err(crate::Error::invalid_input(format!(
            "Domain name too long: {} chars (max {})",
            domain.len(),
            MAX_NAME_LEN
        )));
    }

    if !domain.contains('.') {
        return Err(crate::Error::invalid_input(format!(
            "Domain name must have at least two labels: '{}'",
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::invalid_input(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::invalid_input(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(crate::Error::invalid_input(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::invalid_input(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(domain)
}
