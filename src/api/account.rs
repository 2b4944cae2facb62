use serde::{Deserialize, Serialize};

use crate::poll::Status;

/// An ACME account resource.
///
/// Represents a set of metadata associated with an account.
///
/// See [RFC 8555 §7.1.2].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "valid",
///   "contact": [
///     "mailto:cert-admin@example.com",
///     "mailto:admin@example.com"
///   ],
///   "termsOfServiceAgreed": true,
///   "orders": "https://example.com/acme/acct/evOfKhNU60wg/orders"
/// }
/// ```
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,

    /// Flattened JWS binding the account to an account in a non-ACME system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_return_existing: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
}

impl Account {
    pub fn is_status_valid(&self) -> bool {
        self.status == Some(Status::Valid)
    }

    pub fn is_status_deactivated(&self) -> bool {
        self.status == Some(Status::Deactivated)
    }

    pub fn is_status_revoked(&self) -> bool {
        self.status == Some(Status::Revoked)
    }

    pub fn terms_of_service_agreed(&self) -> bool {
        self.terms_of_service_agreed.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_payload() {
        let acc = Account {
            contact: Some(vec!["mailto:cert-admin@example.com".to_owned()]),
            terms_of_service_agreed: Some(true),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&acc).unwrap(),
            r#"{"contact":["mailto:cert-admin@example.com"],"termsOfServiceAgreed":true}"#
        );
    }

    #[test]
    fn account_status() {
        let acc: Account = serde_json::from_str(r#"{"status":"deactivated"}"#).unwrap();
        assert!(acc.is_status_deactivated());
        assert!(!acc.is_status_valid());
        assert!(!acc.terms_of_service_agreed());
    }
}
