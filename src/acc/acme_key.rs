use eyre::WrapErr as _;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use zeroize::Zeroizing;

/// P-256 account key, plus the account URL once the CA assigned one.
#[derive(Clone, Debug)]
pub(crate) struct AcmeKey {
    signing_key: p256::ecdsa::SigningKey,

    /// Set once we contacted the ACME API to figure out the key ID.
    key_id: Option<String>,
}

impl AcmeKey {
    pub(crate) fn new() -> AcmeKey {
        Self::from_key(crate::cert::create_p256_key())
    }

    pub(crate) fn from_pem(pem: &str) -> eyre::Result<AcmeKey> {
        let pri_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(pem)
            .wrap_err("failed to read account key PEM")?;
        Ok(Self::from_key(pri_key))
    }

    fn from_key(signing_key: p256::ecdsa::SigningKey) -> AcmeKey {
        AcmeKey {
            signing_key,
            key_id: None,
        }
    }

    pub(crate) fn to_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("private_key_to_pem")
    }

    pub(crate) fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }

    pub(crate) fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub(crate) fn set_key_id(&mut self, kid: String) {
        self.key_id = Some(kid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_round_trip_keeps_key() {
        let key = AcmeKey::new();
        let pem = key.to_pem().unwrap();
        let loaded = AcmeKey::from_pem(&pem).unwrap();

        assert_eq!(
            key.signing_key().verifying_key(),
            loaded.signing_key().verifying_key()
        );
        assert!(loaded.key_id().is_none());
    }

    #[test]
    fn garbage_pem_fails() {
        assert!(AcmeKey::from_pem("not a key").is_err());
    }
}
