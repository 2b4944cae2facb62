//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use ecdsa::signature::Signer as _;
use eyre::eyre;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{acc::AcmeKey, util::base64url};

/// JWT Protected Header scheme as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// resource.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtectedHeader {
    /// Algorithm.
    ///
    /// > An ACME server MUST implement the "ES256" signature algorithm (RFC 7518).
    alg: String,

    /// Replay nonce, base64url encoded, as defined in [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    nonce: String,

    /// Target URL of the request, see [RFC 8555 §6.4].
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    url: String,

    /// JSON Web Key. Mutually exclusive with `kid` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Key ID. Mutually exclusive with `jwk` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new_jwk(jwk: Jwk, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: Some(jwk),
            ..Default::default()
        }
    }

    pub(crate) fn new_kid(kid: &str, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            kid: Some(kid.to_owned()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct Jwk {
    alg: String,
    crv: String,
    kty: String,
    #[serde(rename = "use")]
    _use: String,
    x: String,
    y: String,
}

impl TryFrom<&AcmeKey> for Jwk {
    type Error = eyre::Error;

    fn try_from(a: &AcmeKey) -> eyre::Result<Self> {
        let point = a.signing_key().verifying_key().to_encoded_point(false);

        let x = point.x().ok_or_else(|| eyre!("public key has no x coordinate"))?;
        let y = point.y().ok_or_else(|| eyre!("public key has no y coordinate"))?;

        Ok(Jwk {
            alg: "ES256".to_owned(),
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            _use: "sig".to_owned(),
            x: base64url(x),
            y: base64url(y),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct JwkThumb {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl From<&Jwk> for JwkThumb {
    fn from(a: &Jwk) -> Self {
        JwkThumb {
            crv: a.crv.clone(),
            kty: a.kty.clone(),
            x: a.x.clone(),
            y: a.y.clone(),
        }
    }
}

/// JWK thumbprint of the account key as defined in [RFC 7638], base64url encoded.
///
/// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
pub(crate) fn thumbprint(key: &AcmeKey) -> eyre::Result<String> {
    let jwk = Jwk::try_from(key)?;
    let jwk_json = serde_json::to_string(&JwkThumb::from(&jwk))?;
    Ok(base64url(&Sha256::digest(jwk_json)))
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Signs `payload` for a request to `url`.
///
/// The key ID is used when the key has one, otherwise the public key is embedded. A `None` payload
/// produces a POST-as-GET request, whose payload is the empty string.
pub(crate) fn sign<T: Serialize + ?Sized>(
    url: &str,
    nonce: String,
    key: &AcmeKey,
    payload: Option<&T>,
) -> eyre::Result<String> {
    let protected = match key.key_id() {
        Some(kid) => JwsProtectedHeader::new_kid(kid, url, nonce),
        None => JwsProtectedHeader::new_jwk(Jwk::try_from(key)?, url, nonce),
    };

    let protected = base64url(&serde_json::to_string(&protected)?);

    let payload = match payload {
        Some(payload) => base64url(&serde_json::to_string(payload)?),
        None => String::new(),
    };

    let to_sign = format!("{protected}.{payload}");
    let signature: p256::ecdsa::Signature = key
        .signing_key()
        .try_sign(to_sign.as_bytes())
        .map_err(|err| eyre!("failed to sign JWS: {err}"))?;

    let jws = FlattenedJsonJws {
        protected,
        payload,
        signature: base64url(&signature.to_bytes()),
    };

    Ok(serde_json::to_string(&jws)?)
}
