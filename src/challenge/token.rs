//! Challenges proven with a key authorization, the CA's token joined with the account key's
//! thumbprint.

use sha2::{Digest as _, Sha256};

use super::{Challenge, ChallengeKind, TypedChallenge};
use crate::{
    acc::AcmeKey,
    api::Identifier,
    error::{Error, Result},
    jws,
    util::{base64url, is_base64url},
};

/// HTTP challenge, see [RFC 8555 §8.3].
///
/// The key authorization must be served under:
///
/// ```text
/// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
/// ```
///
/// The challenge will be accessed over HTTP (not HTTPS), for obvious reasons.
///
/// ```no_run
/// use std::{fs, time::Duration};
///
/// use acme::{challenge::{Http01, TypedChallenge as _}, order::Authorization, RetryPolicy};
///
/// async fn web_authorize(auth: &Authorization) -> eyre::Result<()> {
///     let challenge = auth.find_challenge::<Http01>()?.unwrap();
///
///     // Assuming our web server's root is under /var/www
///     let path = format!("/var/www/.well-known/acme-challenge/{}", challenge.token());
///     fs::write(&path, challenge.authorization()?)?;
///
///     challenge.trigger().await?;
///     challenge
///         .challenge()
///         .wait_for_completion(&RetryPolicy::new(Duration::from_secs(60)))
///         .await?;
///
///     Ok(())
/// }
/// ```
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
#[derive(Debug, Clone)]
pub struct Http01 {
    challenge: Challenge,
    token: String,
}

impl Http01 {
    /// Returns the token, a unique identifier of the challenge.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the content of the file to serve under the token's name.
    pub fn authorization(&self) -> Result<String> {
        key_authorization(&self.token, self.challenge.account().key())
    }
}

impl TypedChallenge for Http01 {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

impl ChallengeKind for Http01 {
    const TYPE: &'static str = "http-01";

    fn from_challenge(challenge: Challenge) -> Result<Self> {
        let token = token_of(&challenge)?;
        Ok(Self { challenge, token })
    }
}

/// DNS challenge, see [RFC 8555 §8.4].
///
/// The digest must be published in a `TXT` record:
///
/// ```text
/// _acme-challenge.<domain-to-be-proven>.  TXT  <digest>
/// ```
///
/// [RFC 8555 §8.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.4
#[derive(Debug, Clone)]
pub struct Dns01 {
    challenge: Challenge,
    token: String,
}

impl Dns01 {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the name of the `TXT` record for `identifier`.
    pub fn rr_name(&self, identifier: &Identifier) -> Result<String> {
        let domain = identifier.domain()?;
        let domain = domain.strip_prefix("*.").unwrap_or(domain);
        Ok(format!("_acme-challenge.{}.", domain.trim_end_matches('.')))
    }

    /// Returns the content of the `TXT` record.
    ///
    /// The DNS digest is not the same as the HTTP key authorization.
    pub fn digest(&self) -> Result<String> {
        let key_auth = key_authorization(&self.token, self.challenge.account().key())?;
        Ok(base64url(&Sha256::digest(key_auth)))
    }
}

impl TypedChallenge for Dns01 {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

impl ChallengeKind for Dns01 {
    const TYPE: &'static str = "dns-01";

    fn from_challenge(challenge: Challenge) -> Result<Self> {
        let token = token_of(&challenge)?;
        Ok(Self { challenge, token })
    }
}

/// TLS-ALPN challenge, see [RFC 8737 §3].
///
/// A certificate must be served when a TLS connection is made with the ALPN protocol
/// "acme-tls/1". It must contain a single dNSName SAN with the domain being validated, as well as
/// an `acmeIdentifier` extension containing [`TlsAlpn01::acme_validation()`].
///
/// [RFC 8737 §3]: https://datatracker.ietf.org/doc/html/rfc8737#section-3
#[derive(Debug, Clone)]
pub struct TlsAlpn01 {
    challenge: Challenge,
    token: String,
}

impl TlsAlpn01 {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// SHA-256 digest of the key authorization.
    pub fn acme_validation(&self) -> Result<[u8; 32]> {
        let key_auth = key_authorization(&self.token, self.challenge.account().key())?;
        Ok(Sha256::digest(key_auth).into())
    }
}

impl TypedChallenge for TlsAlpn01 {
    fn challenge(&self) -> &Challenge {
        &self.challenge
    }
}

impl ChallengeKind for TlsAlpn01 {
    const TYPE: &'static str = "tls-alpn-01";

    fn from_challenge(challenge: Challenge) -> Result<Self> {
        let token = token_of(&challenge)?;
        Ok(Self { challenge, token })
    }
}

fn token_of(challenge: &Challenge) -> Result<String> {
    match challenge.api_challenge().token {
        Some(token) if is_base64url(&token) => Ok(token),
        Some(token) => Err(Error::ProtocolViolation(format!(
            "challenge {} has a malformed token {token:?}",
            challenge.location()
        ))),
        None => Err(Error::ProtocolViolation(format!(
            "challenge {} has no token",
            challenge.location()
        ))),
    }
}

/// `<token>.<thumbprint>` as defined in [RFC 8555 §8.1].
///
/// [RFC 8555 §8.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.1
fn key_authorization(token: &str, key: &AcmeKey) -> Result<String> {
    Ok(format!("{token}.{}", jws::thumbprint(key)?))
}
