//! The `dns-persist-01` challenge.
//!
//! Instead of a fresh token per validation, the domain owner publishes a long lived `TXT` record
//! that authorizes one CA to issue for one ACME account:
//!
//! ```text
//! _validation-persist.example.org.  TXT  "ca.example.com; accounturi=https://ca.example.com/acct/1"
//! ```
//!
//! The record can carry a `policy` (e.g. `wildcard`) and a `persistUntil` UNIX timestamp after
//! which the CA must no longer accept it.

use std::fmt::Write as _;

use time::OffsetDateTime;

use super::{Challenge, ChallengeKind, TypedChallenge};
use crate::{
    api::Identifier,
    error::{Error, Result},
    util::to_ace,
};

/// Label prepended to the domain to form the record name.
pub const RECORD_NAME_PREFIX: &str = "_validation-persist";

/// Persistent DNS challenge.
///
/// The CA lists the names it accepts as issuer in [`DnsPersist01::issuer_domain_names()`]. Pick
/// one and publish [`DnsPersist01::build_record_value()`] under [`DnsPersist01::rr_name()`].
#[derive(Debug, Clone)]
pub struct DnsPersist01 {
    challenge: Challenge,
}

impl DnsPersist01 {
    /// Returns the name of the `TXT` record for `identifier`.
    ///
    /// A wildcard identifier maps to the record of its base domain, so `*.example.org` and
    /// `example.org` share `_validation-persist.example.org.`. Fails for non-DNS identifiers.
    pub fn rr_name(&self, identifier: &Identifier) -> Result<String> {
        record_name(identifier)
    }

    /// Issuer names the CA accepts, in the CA's order.
    ///
    /// Names are normalized to lowercase ASCII without a trailing dot.
    pub fn issuer_domain_names(&self) -> Result<Vec<String>> {
        self.challenge
            .api_challenge()
            .issuer_domain_names
            .unwrap_or_default()
            .iter()
            .map(|name| {
                normalize_issuer(name).map_err(|_| {
                    Error::ProtocolViolation(format!(
                        "challenge {} has an invalid issuer domain name {name:?}",
                        self.challenge.location()
                    ))
                })
            })
            .collect()
    }

    /// URL of the account the record authorizes.
    pub fn account_uri(&self) -> &str {
        self.challenge.account().location()
    }

    /// Builds the record value authorizing `issuer` to issue for this account.
    pub fn build_record_value(&self, issuer: &str) -> Result<String> {
        self.build_record_value_with(issuer, None, None)
    }

    /// Builds the record value with an optional `policy` and `persistUntil` UNIX timestamp.
    ///
    /// An empty policy is left out. The timestamp is written as is.
    pub fn build_record_value_with(
        &self,
        issuer: &str,
        policy: Option<&str>,
        persist_until: Option<i64>,
    ) -> Result<String> {
        record_value(issuer, self.account_uri(), policy, persist_until)
    }

    /// Like [`DnsPersist01::build_record_value_with()`], with the expiry given as a date.
    pub fn build_record_value_until(
        &self,
        issuer: &str,
        policy: Option<&str>,
        persist_until: OffsetDateTime,
    ) -> Result<String> {
        self.build_record_value_with(issuer, policy, Some(persist_until.unix_timestamp()))
    }
}

impl TypedChallenge for DnsPersist01 {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

impl ChallengeKind for DnsPersist01 {
    const TYPE: &'static str = "dns-persist-01";

    fn from_challenge(challenge: Challenge) -> Result<Self> {
        Ok(Self { challenge })
    }
}

/// `_validation-persist.<domain>.` with the domain in ASCII form.
pub(crate) fn record_name(identifier: &Identifier) -> Result<String> {
    let domain = identifier.domain()?;
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    let domain = to_ace(domain.trim_end_matches('.'))?;

    Ok(format!("{RECORD_NAME_PREFIX}.{domain}."))
}

pub(crate) fn record_value(
    issuer: &str,
    account_uri: &str,
    policy: Option<&str>,
    persist_until: Option<i64>,
) -> Result<String> {
    let issuer = normalize_issuer(issuer)?;
    let mut value = format!("{issuer}; accounturi={account_uri}");

    if let Some(policy) = policy.filter(|policy| !policy.is_empty()) {
        value.push_str("; policy=");
        value.push_str(policy);
    }

    if let Some(persist_until) = persist_until {
        // writing to a String cannot fail
        let _ = write!(value, "; persistUntil={persist_until}");
    }

    Ok(value)
}

fn normalize_issuer(name: &str) -> Result<String> {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);

    if name.is_empty() {
        return Err(Error::InvalidArgument("empty issuer domain name".to_owned()));
    }

    to_ace(name)
}
