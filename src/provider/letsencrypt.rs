use url::Url;

use super::{alias_path, is_alias_for, parse_url, AcmeProvider};
use crate::error::{Error, Result};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Let's Encrypt.
///
/// - `acme://letsencrypt.org` is the production directory. Not appropriate for testing or
///   development.
/// - `acme://letsencrypt.org/staging` is the staging directory. Use it for testing and
///   development. It doesn't issue "valid" certificates and has relaxed rate limits.
#[derive(Debug, Clone, Default)]
pub struct LetsEncryptProvider;

impl AcmeProvider for LetsEncryptProvider {
    fn accepts(&self, server_uri: &Url) -> bool {
        is_alias_for(server_uri, "letsencrypt.org")
    }

    fn resolve(&self, server_uri: &Url) -> Result<Url> {
        match alias_path(server_uri) {
            "" | "/v02" => parse_url(LETSENCRYPT_URL),
            "/staging" | "/v02/staging" => parse_url(LETSENCRYPT_STAGING_URL),
            path => Err(Error::InvalidConfiguration(format!(
                "unknown Let's Encrypt directory {path}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(uri: &str) -> Result<Url> {
        LetsEncryptProvider.resolve(&Url::parse(uri).unwrap())
    }

    #[test]
    fn aliases() {
        assert_eq!(resolve("acme://letsencrypt.org").unwrap().as_str(), LETSENCRYPT_URL);
        assert_eq!(resolve("acme://letsencrypt.org/").unwrap().as_str(), LETSENCRYPT_URL);
        assert_eq!(
            resolve("acme://letsencrypt.org/staging").unwrap().as_str(),
            LETSENCRYPT_STAGING_URL
        );
        assert!(matches!(
            resolve("acme://letsencrypt.org/nope"),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
