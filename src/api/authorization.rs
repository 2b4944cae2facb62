use serde::{Deserialize, Serialize};

use crate::{api, poll::Status};

// {
//   "identifier": {
//     "type": "dns",
//     "value": "acmetest.algesten.se"
//   },
//   "status": "pending",
//   "expires": "2019-01-09T08:26:43Z",
//   "challenges": [
//     {
//       "type": "http-01",
//       "status": "pending",
//       "url": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
//       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
//     },
//     {
//       "type": "dns-persist-01",
//       "status": "pending",
//       "url": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789599",
//       "issuer-domain-names": ["ca.example.com"]
//     }
//   ]
// }
/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Authorization identifier.
    pub identifier: api::Identifier,

    /// Authorization status.
    #[serde(default)]
    pub status: Status,

    /// The timestamp after which the server will consider this authorization invalid.
    ///
    /// Uses RFC 3339 format.
    ///
    /// This field is required for objects with "valid" in the "status" field.
    pub expires: Option<String>,

    /// Returns the challenges related to the identifier.
    ///
    /// - For pending authorizations, the challenges that the client can fulfill in order to prove
    ///   possession of the identifier.
    /// - For valid authorizations, the challenge that was validated.
    /// - For invalid authorizations, the challenge that was attempted and failed.
    #[serde(default)]
    pub challenges: Vec<api::Challenge>,

    /// This field MUST be present and true for authorizations created as a result of a newOrder
    /// request containing a DNS identifier with a value that was a wildcard domain name. For other
    /// authorizations, it MUST be absent. Wildcard domain names are described in §7.1.3.
    pub wildcard: Option<bool>,

    /// Present and true if the authorization covers subdomains ([RFC 9444]).
    ///
    /// [RFC 9444]: https://datatracker.ietf.org/doc/html/rfc9444
    #[serde(rename = "subdomainAuthAllowed")]
    pub subdomain_auth_allowed: Option<bool>,
}

impl Authorization {
    /// Returns true if authorization was created for a wildcard domain.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard.unwrap_or(false)
    }

    /// Returns the first challenge of the given type, if one is present.
    pub fn challenge(&self, _type: &str) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == _type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_authorization() {
        let auth: Authorization = serde_json::from_str(
            r#"{
                "identifier": { "type": "dns", "value": "example.org" },
                "status": "valid",
                "expires": "2025-01-09T08:26:43Z",
                "challenges": [],
                "subdomainAuthAllowed": true
            }"#,
        )
        .unwrap();

        assert_eq!(auth.status, Status::Valid);
        assert_eq!(auth.subdomain_auth_allowed, Some(true));
        assert!(!auth.is_wildcard());
        assert!(auth.challenge("dns-persist-01").is_none());
    }
}
