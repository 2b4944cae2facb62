//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

mod account;
mod authorization;
mod challenge;
mod directory;
mod finalize;
mod identifier;
mod order;

pub use self::{
    account::Account,
    authorization::Authorization,
    challenge::Challenge,
    directory::{AutoRenewalMeta, Directory, DirectoryMeta},
    finalize::Finalize,
    identifier::Identifier,
    order::{AutoRenewal, NewOrder, Order},
};

/// A problem document as defined in [RFC 7807], used by ACME for all error responses.
///
/// See [RFC 8555 §6.7].
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
/// [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default = "Problem::about_blank")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// HTTP status code, as reported in the document or taken from the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    fn about_blank() -> String {
        "about:blank".to_owned()
    }

    /// Returns the short error name, e.g. `badNonce` for
    /// `urn:ietf:params:acme:error:badNonce`.
    pub fn acme_error(&self) -> Option<&str> {
        self._type
            .strip_prefix("urn:ietf:params:acme:error:")
            .or_else(|| self._type.strip_prefix("urn:acme:error:"))
    }

    /// Returns true if problem type is "badNonce".
    pub fn is_bad_nonce(&self) -> bool {
        self.acme_error() == Some("badNonce") || self._type == "badNonce"
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type)?,
            _ => write!(f, "{}", self._type)?,
        }

        if let Some(subproblems) = &self.subproblems {
            for sub in subproblems {
                write!(f, " ({sub})")?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<identifier::Identifier>,
}

impl fmt::Display for Subproblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(identifier) = &self.identifier {
            write!(f, "{}: ", identifier.value)?;
        }

        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_nonce_detection() {
        let problem: Problem = serde_json::from_str(
            r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"JWS has an invalid anti-replay nonce","status":400}"#,
        )
        .unwrap();

        assert!(problem.is_bad_nonce());
        assert_eq!(problem.acme_error(), Some("badNonce"));
        assert_eq!(problem.status, Some(400));

        let problem = Problem {
            _type: "urn:ietf:params:acme:error:malformed".to_owned(),
            ..Default::default()
        };
        assert!(!problem.is_bad_nonce());
    }

    #[test]
    fn problem_with_subproblems() {
        let problem: Problem = serde_json::from_str(
            r#"{
                "type": "urn:ietf:params:acme:error:malformed",
                "detail": "Some of the identifiers requested were rejected",
                "subproblems": [
                    {
                        "type": "urn:ietf:params:acme:error:rejectedIdentifier",
                        "detail": "This CA will not issue for \"example.net\"",
                        "identifier": { "type": "dns", "value": "example.net" }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            problem.to_string(),
            "urn:ietf:params:acme:error:malformed: Some of the identifiers requested were rejected \
             (example.net: urn:ietf:params:acme:error:rejectedIdentifier: \
             This CA will not issue for \"example.net\")"
        );
    }

    #[test]
    fn missing_type_is_about_blank() {
        let problem: Problem = serde_json::from_str(r#"{"detail":"oops"}"#).unwrap();
        assert_eq!(problem._type, "about:blank");
    }
}
