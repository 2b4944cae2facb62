use serde::{Deserialize, Serialize};

use crate::{api, error::Error, poll::Status};

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track the progress of that order
/// through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "acmetest.algesten.se"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub identifiers: Vec<api::Identifier>,

    /// Requested start of validity. Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Requested end of validity. Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    #[serde(default)]
    pub authorizations: Vec<String>,

    #[serde(default)]
    pub finalize: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Certificate URL of an auto-renewed (STAR) order.
    #[serde(rename = "star-certificate", skip_serializing_if = "Option::is_none")]
    pub star_certificate: Option<String>,

    #[serde(rename = "auto-renewal", skip_serializing_if = "Option::is_none")]
    pub auto_renewal: Option<AutoRenewal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

impl Order {
    /// Returns all domains associated with this order.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .filter(|identifier| identifier.is_type_dns())
            .map(|identifier| identifier.value.as_str())
            .collect()
    }

    // Let's Encrypt was observed to return domains in alternate order which
    // may flip primary with SAN(s).
    //
    // This overwrites self without changing the order of the identifiers.
    pub(crate) fn overwrite(&mut self, mut from_api: Self) -> crate::Result<()> {
        if !self.identifiers.is_empty() {
            if from_api.identifiers.len() != self.identifiers.len()
                || from_api
                    .identifiers
                    .iter()
                    .any(|id| !self.identifiers.contains(id))
            {
                return Err(Error::ProtocolViolation(format!(
                    "order identifier mismatch: had {:?} and got {:?}",
                    self.identifiers, from_api.identifiers
                )));
            }

            from_api.identifiers = std::mem::take(&mut self.identifiers);
        }

        *self = from_api;
        Ok(())
    }
}

/// Payload of a newOrder request.
///
/// See [RFC 8555 §7.4].
///
/// [RFC 8555 §7.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub identifiers: Vec<api::Identifier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    #[serde(rename = "auto-renewal", skip_serializing_if = "Option::is_none")]
    pub auto_renewal: Option<AutoRenewal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Auto-renewal parameters of an order.
///
/// See [RFC 8739 §3.1.1](https://datatracker.ietf.org/doc/html/rfc8739#section-3.1.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoRenewal {
    /// Earliest validity of the first certificate. Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Latest validity of the last certificate. Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    /// Validity of each certificate, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<u64>,

    /// Pre-dating of each certificate, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_adjust: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_certificate_get: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with(domains: &[&str]) -> Order {
        Order {
            identifiers: domains
                .iter()
                .map(|d| api::Identifier::dns(d).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn overwrite_keeps_submitted_order() {
        let mut order = order_with(&["b.example.com", "a.example.com"]);
        let mut from_api = order_with(&["a.example.com", "b.example.com"]);
        from_api.status = Status::Pending;

        order.overwrite(from_api).unwrap();
        assert_eq!(order.domains(), ["b.example.com", "a.example.com"]);
        assert_eq!(order.status, Status::Pending);
    }

    #[test]
    fn overwrite_accepts_case_echo() {
        let mut order = order_with(&["www.example.com", "bücher.example.com"]);
        let from_api = Order {
            identifiers: vec![
                api::Identifier::new("dns", "XN--BCHER-KVA.example.com"),
                api::Identifier::new("dns", "WWW.Example.com"),
            ],
            status: Status::Ready,
            ..Default::default()
        };

        order.overwrite(from_api).unwrap();
        assert_eq!(order.domains(), ["www.example.com", "xn--bcher-kva.example.com"]);
        assert_eq!(order.status, Status::Ready);
    }

    #[test]
    fn overwrite_rejects_mismatch() {
        let mut order = order_with(&["a.example.com"]);
        let from_api = order_with(&["c.example.com"]);

        assert!(matches!(
            order.overwrite(from_api),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn new_order_omits_unset_fields() {
        let new_order = NewOrder {
            identifiers: vec![api::Identifier::dns("example.org").unwrap()],
            auto_renewal: Some(AutoRenewal {
                lifetime: Some(604800),
                ..Default::default()
            }),
            profile: Some("shortlived".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&new_order).unwrap(),
            r#"{"identifiers":[{"type":"dns","value":"example.org"}],"auto-renewal":{"lifetime":604800},"profile":"shortlived"}"#
        );
    }
}
