use base64::prelude::*;

use crate::error::{Error, Result};

pub(crate) fn base64url<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// Returns true if `value` is a non-empty base64url string without padding.
pub(crate) fn is_base64url(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Converts a domain name to its lowercase ASCII-compatible encoding.
///
/// A leading `*.` wildcard label and a trailing full stop are preserved.
pub(crate) fn to_ace(domain: &str) -> Result<String> {
    let domain = domain.trim();

    let (wildcard, rest) = match domain.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, domain),
    };

    let (rest, trailing_dot) = match rest.strip_suffix('.') {
        Some(rest) => (rest, true),
        None => (rest, false),
    };

    let ace = match url::Host::parse(rest) {
        Ok(url::Host::Domain(ace)) => ace,
        Ok(_) => {
            return Err(Error::InvalidArgument(format!(
                "{domain} is an IP address, not a domain name"
            )))
        }
        Err(err) => {
            return Err(Error::InvalidArgument(format!(
                "invalid domain name {domain}: {err}"
            )))
        }
    };

    let mut out = String::with_capacity(ace.len() + 3);
    if wildcard {
        out.push_str("*.");
    }
    out.push_str(&ace);
    if trailing_dot {
        out.push('.');
    }

    Ok(out)
}
