use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Directory object for ACME client self-configuration.
///
/// See [RFC 8555 §7.1.1].
///
/// # Example JSON
///
/// ```json
/// {
///   "newNonce": "https://example.com/acme/new-nonce",
///   "newAccount": "https://example.com/acme/new-account",
///   "newOrder": "https://example.com/acme/new-order",
///   "newAuthz": "https://example.com/acme/new-authz",
///   "revokeCert": "https://example.com/acme/revoke-cert",
///   "keyChange": "https://example.com/acme/key-change",
///   "renewalInfo": "https://example.com/acme/renewal-info",
///   "meta": {
///     "termsOfService": "https://example.com/acme/terms/2017-5-30",
///     "website": "https://www.example.com/",
///     "caaIdentities": ["example.com"],
///     "externalAccountRequired": false,
///     "profiles": {
///       "classic": "The same profile you're accustomed to",
///       "shortlived": "A short-lived cert profile, without actual enforcement"
///     }
///   }
/// }
/// ```
///
/// [RFC 8555 §7.1.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// URL for new nonce requests.
    pub new_nonce: String,

    /// URL for new account requests.
    pub new_account: String,

    /// URL for new order requests.
    pub new_order: String,

    /// URL for new authorization requests.
    ///
    /// If the ACME server does not implement [pre-authorization], it MUST omit the `newAuthz` field
    /// of the directory.
    ///
    /// [pre-authorization]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_authz: Option<String>,

    /// URL for certificate revocation requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,

    /// URL for key change requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_change: Option<String>,

    /// URL for ACME Renewal Information ([RFC 9773]).
    ///
    /// [RFC 9773]: https://datatracker.ietf.org/doc/html/rfc9773
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// <https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.6>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    /// URL identifying the current terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    /// URL locating a website providing more information about the ACME server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// The hostnames that the ACME server recognizes as referring to itself for the purposes of
    /// Certification Authority Authorization (CAA) record validation as defined in [RFC 6844].
    ///
    /// [RFC 6844]: https://datatracker.ietf.org/doc/html/rfc6844
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caa_identities: Option<Vec<String>>,

    /// If true, then the CA requires that all newAccount requests include an
    /// `externalAccountBinding` field associating the new account with an external account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_required: Option<bool>,

    /// Present if the CA offers short-term automatic renewal ([RFC 8739]).
    ///
    /// [RFC 8739]: https://datatracker.ietf.org/doc/html/rfc8739
    #[serde(rename = "auto-renewal", skip_serializing_if = "Option::is_none")]
    pub auto_renewal: Option<AutoRenewalMeta>,

    /// Certificate profiles offered by the CA, mapped to a human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles: Option<BTreeMap<String, String>>,

    /// If true, the CA accepts authorizations through ancestor domains ([RFC 9444]).
    ///
    /// [RFC 9444]: https://datatracker.ietf.org/doc/html/rfc9444
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain_auth_allowed: Option<bool>,
}

/// Auto-renewal capabilities of the CA.
///
/// See [RFC 8739 §3.1.1](https://datatracker.ietf.org/doc/html/rfc8739#section-3.1.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoRenewalMeta {
    /// Minimum acceptable value for the certificate lifetime, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_lifetime: Option<u64>,

    /// Maximum time span between start and end of auto-renewal, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u64>,

    /// Whether the certificate may be fetched with an unauthenticated GET.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_certificate_get: Option<bool>,
}

impl DirectoryMeta {
    pub fn external_account_required(&self) -> bool {
        self.external_account_required.unwrap_or(false)
    }

    pub fn is_auto_renewal_enabled(&self) -> bool {
        self.auto_renewal.is_some()
    }

    pub fn is_auto_renewal_get_allowed(&self) -> bool {
        self.auto_renewal
            .as_ref()
            .and_then(|ar| ar.allow_certificate_get)
            .unwrap_or(false)
    }

    /// Returns true if the CA offers any certificate profile.
    pub fn is_profile_allowed(&self) -> bool {
        self.profiles
            .as_ref()
            .is_some_and(|profiles| !profiles.is_empty())
    }

    /// Returns true if the CA offers the named certificate profile.
    pub fn is_named_profile_allowed(&self, profile: &str) -> bool {
        self.profiles
            .as_ref()
            .is_some_and(|profiles| profiles.contains_key(profile))
    }

    pub fn is_subdomain_auth_allowed(&self) -> bool {
        self.subdomain_auth_allowed.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_capabilities() {
        let dir: Directory = serde_json::from_str(
            r#"{
                "newNonce": "https://example.com/acme/new-nonce",
                "newAccount": "https://example.com/acme/new-account",
                "newOrder": "https://example.com/acme/new-order",
                "renewalInfo": "https://example.com/acme/renewal-info",
                "meta": {
                    "auto-renewal": {
                        "min-lifetime": 86400,
                        "max-duration": 31536000,
                        "allow-certificate-get": true
                    },
                    "profiles": { "classic": "Classic", "shortlived": "Short" },
                    "subdomainAuthAllowed": true
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            dir.renewal_info.as_deref(),
            Some("https://example.com/acme/renewal-info")
        );
        assert!(dir.key_change.is_none());

        let meta = dir.meta.unwrap();
        assert!(meta.is_auto_renewal_enabled());
        assert!(meta.is_auto_renewal_get_allowed());
        assert_eq!(meta.auto_renewal.as_ref().unwrap().min_lifetime, Some(86400));
        assert!(meta.is_profile_allowed());
        assert!(meta.is_named_profile_allowed("shortlived"));
        assert!(!meta.is_named_profile_allowed("tlsserver"));
        assert!(meta.is_subdomain_auth_allowed());
        assert!(!meta.external_account_required());
    }

    #[test]
    fn empty_meta_allows_nothing() {
        let meta = DirectoryMeta::default();
        assert!(!meta.is_auto_renewal_enabled());
        assert!(!meta.is_auto_renewal_get_allowed());
        assert!(!meta.is_profile_allowed());
        assert!(!meta.is_named_profile_allowed("classic"));
        assert!(!meta.is_subdomain_auth_allowed());
    }
}
