use serde::{Deserialize, Serialize};

use crate::{api, poll::Status};

/// An ACME challenge object.
///
/// Represents a server's offer to validate a client's possession of an identifier in a specific
/// way.
///
/// See [RFC 8555 §7.1.5].
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "url": "https://acme-staging-v02.api.letsencrypt.org/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
///   "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
/// }
/// ```
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Type of challenge encoded in the object.
    #[serde(rename = "type")]
    pub _type: String,

    /// URL to which a response can be posted.
    pub url: String,

    /// Status of this challenge.
    #[serde(default)]
    pub status: Status,

    /// Time at which the server validated this challenge.
    ///
    /// Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,

    /// Error that occurred while the server was validating the challenge, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    /// Token of key-authorization based challenges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Issuer domain names offered in a `dns-persist-01` challenge.
    #[serde(
        rename = "issuer-domain-names",
        skip_serializing_if = "Option::is_none"
    )]
    pub issuer_domain_names: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_persist_challenge() {
        let chall: Challenge = serde_json::from_str(
            r#"{
                "type": "dns-persist-01",
                "url": "https://example.com/acme/chall/1",
                "status": "pending",
                "issuer-domain-names": ["CA.Example.com.", "ca.example.net"]
            }"#,
        )
        .unwrap();

        assert_eq!(chall._type, "dns-persist-01");
        assert!(chall.token.is_none());
        assert_eq!(chall.issuer_domain_names.unwrap().len(), 2);
    }

    #[test]
    fn invalid_challenge_error() {
        let chall: Challenge = serde_json::from_str(
            r#"{
                "type": "http-01",
                "url": "https://example.com/acme/chall/2",
                "status": "invalid",
                "token": "abc",
                "error": {
                    "type": "urn:ietf:params:acme:error:connection",
                    "detail": "connection refused"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(chall.status, Status::Invalid);
        assert_eq!(chall.error.unwrap().acme_error(), Some("connection"));
    }
}
