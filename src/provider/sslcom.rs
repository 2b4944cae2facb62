use url::Url;

use super::{alias_path, is_alias_for, parse_url, AcmeProvider};
use crate::error::{Error, Result};

const SSLCOM_ECC_URL: &str = "https://acme.ssl.com/sslcom-dv-ecc";
const SSLCOM_RSA_URL: &str = "https://acme.ssl.com/sslcom-dv-rsa";
const SSLCOM_STAGING_ECC_URL: &str = "https://acme-try.ssl.com/sslcom-dv-ecc";
const SSLCOM_STAGING_RSA_URL: &str = "https://acme-try.ssl.com/sslcom-dv-rsa";

/// SSL.com.
///
/// `acme://ssl.com` issues from the ECC hierarchy, `acme://ssl.com/rsa` from the RSA one. Prefix
/// the path with `/staging` for the test environment, e.g. `acme://ssl.com/staging/rsa`.
#[derive(Debug, Clone, Default)]
pub struct SslComProvider;

impl AcmeProvider for SslComProvider {
    fn accepts(&self, server_uri: &Url) -> bool {
        is_alias_for(server_uri, "ssl.com")
    }

    fn resolve(&self, server_uri: &Url) -> Result<Url> {
        match alias_path(server_uri) {
            "" | "/ecc" => parse_url(SSLCOM_ECC_URL),
            "/rsa" => parse_url(SSLCOM_RSA_URL),
            "/staging" | "/staging/ecc" => parse_url(SSLCOM_STAGING_ECC_URL),
            "/staging/rsa" => parse_url(SSLCOM_STAGING_RSA_URL),
            path => Err(Error::InvalidConfiguration(format!(
                "unknown SSL.com directory {path}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(uri: &str) -> Result<Url> {
        SslComProvider.resolve(&Url::parse(uri).unwrap())
    }

    #[test]
    fn aliases() {
        assert_eq!(resolve("acme://ssl.com").unwrap().as_str(), SSLCOM_ECC_URL);
        assert_eq!(resolve("acme://ssl.com/ecc").unwrap().as_str(), SSLCOM_ECC_URL);
        assert_eq!(resolve("acme://ssl.com/rsa").unwrap().as_str(), SSLCOM_RSA_URL);
        assert_eq!(
            resolve("acme://ssl.com/staging").unwrap().as_str(),
            SSLCOM_STAGING_ECC_URL
        );
        assert_eq!(
            resolve("acme://ssl.com/staging/rsa/").unwrap().as_str(),
            SSLCOM_STAGING_RSA_URL
        );
        assert!(matches!(
            resolve("acme://ssl.com/dsa"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn only_own_alias() {
        assert!(SslComProvider.accepts(&Url::parse("acme://ssl.com/rsa").unwrap()));
        assert!(!SslComProvider.accepts(&Url::parse("https://acme.ssl.com/sslcom-dv-rsa").unwrap()));
        assert!(!SslComProvider.accepts(&Url::parse("acme://letsencrypt.org").unwrap()));
    }
}
