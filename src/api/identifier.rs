use std::{
    borrow::Cow,
    hash::{Hash, Hasher},
    net::IpAddr,
};

use serde::{Deserialize, Serialize};

use crate::{error::Error, util::to_ace};

/// Identifier type for domain names.
pub const TYPE_DNS: &str = "dns";

/// Identifier type for IP addresses.
pub const TYPE_IP: &str = "ip";

/// An identifier a certificate can be issued for.
///
/// Domain values built with [`Identifier::dns()`] are stored in their lowercase
/// ASCII-compatible encoding. Two identifiers are equal when their type and normalized value are
/// equal, so a domain echoed by the CA in another case or as an IDN still matches.
///
/// See [RFC 8555 §9.7.7] and [RFC 8738].
///
/// [RFC 8555 §9.7.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.7
/// [RFC 8738]: https://datatracker.ietf.org/doc/html/rfc8738
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,

    /// Ancestor domain for subdomain authorization ([RFC 9444]).
    ///
    /// [RFC 9444]: https://datatracker.ietf.org/doc/html/rfc9444
    #[serde(rename = "ancestorDomain", skip_serializing_if = "Option::is_none")]
    pub ancestor_domain: Option<String>,
}

impl Identifier {
    /// Creates a domain identifier.
    ///
    /// Wildcards (`*.example.org`) and IDNs are accepted; IDNs are ACE encoded.
    pub fn dns(domain: &str) -> crate::Result<Self> {
        Ok(Self {
            _type: TYPE_DNS.to_owned(),
            value: to_ace(domain)?,
            ancestor_domain: None,
        })
    }

    /// Creates an IP address identifier.
    pub fn ip(addr: IpAddr) -> Self {
        Self {
            _type: TYPE_IP.to_owned(),
            value: addr.to_string(),
            ancestor_domain: None,
        }
    }

    /// Creates an identifier of an arbitrary type, taking the value verbatim.
    pub fn new(_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            _type: _type.into(),
            value: value.into(),
            ancestor_domain: None,
        }
    }

    /// Requests authorization for this domain through one of its ancestor domains.
    ///
    /// Only valid for domain identifiers.
    pub fn with_ancestor_domain(mut self, ancestor: &str) -> crate::Result<Self> {
        if !self.is_type_dns() {
            return Err(Error::InvalidArgument(format!(
                "ancestor domain requires a dns identifier, got {}",
                self._type
            )));
        }

        self.ancestor_domain = Some(to_ace(ancestor)?);
        Ok(self)
    }

    pub fn is_type_dns(&self) -> bool {
        self._type == TYPE_DNS
    }

    pub fn is_type_ip(&self) -> bool {
        self._type == TYPE_IP
    }

    /// Returns the ACE encoded domain name.
    ///
    /// Fails with [`Error::ProtocolViolation`] if this is not a domain identifier.
    pub fn domain(&self) -> crate::Result<&str> {
        if !self.is_type_dns() {
            return Err(Error::ProtocolViolation(format!(
                "expected dns identifier, but found {} identifier {}",
                self._type, self.value
            )));
        }

        Ok(&self.value)
    }

    /// Returns the IP address.
    ///
    /// Fails with [`Error::ProtocolViolation`] if this is not an IP identifier.
    pub fn ip_address(&self) -> crate::Result<IpAddr> {
        if !self.is_type_ip() {
            return Err(Error::ProtocolViolation(format!(
                "expected ip identifier, but found {} identifier {}",
                self._type, self.value
            )));
        }

        self.value
            .parse()
            .map_err(|_| Error::ProtocolViolation(format!("bad ip address {}", self.value)))
    }

    /// Value used for equality: domains in lowercase ACE form without a trailing dot.
    fn normalized_value(&self) -> Cow<'_, str> {
        if !self.is_type_dns() {
            return Cow::Borrowed(&self.value);
        }

        let value = self.value.trim_end_matches('.');
        if value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"-.*_".contains(&b))
        {
            return Cow::Borrowed(value);
        }

        match to_ace(value) {
            Ok(ace) => Cow::Owned(ace),
            Err(_) => Cow::Owned(value.to_lowercase()),
        }
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self._type == other._type && self.normalized_value() == other.normalized_value()
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self._type.hash(state);
        self.normalized_value().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn dns_is_normalized() {
        let id = Identifier::dns("WWW.Example.ORG").unwrap();
        assert_eq!(id.value, "www.example.org");
        assert_eq!(id, Identifier::dns("www.example.org").unwrap());

        let id = Identifier::dns("*.Bücher.example").unwrap();
        assert_eq!(id.value, "*.xn--bcher-kva.example");
    }

    #[test]
    fn equality_normalizes_domains() {
        let ours = Identifier::dns("bücher.example.org").unwrap();

        assert_eq!(ours, Identifier::new("dns", "XN--BCHER-KVA.Example.ORG"));
        assert_eq!(ours, Identifier::new("dns", "Bücher.example.org."));
        assert_ne!(ours, Identifier::new("ip", "xn--bcher-kva.example.org"));

        let from_ca: Identifier =
            serde_json::from_str(r#"{"type":"dns","value":"WWW.Example.org"}"#).unwrap();
        assert_eq!(from_ca, Identifier::dns("www.example.org").unwrap());

        let set = [from_ca].into_iter().collect::<std::collections::HashSet<_>>();
        assert!(set.contains(&Identifier::dns("www.example.org").unwrap()));
    }

    #[test]
    fn equality_ignores_ancestor() {
        let a = Identifier::dns("foo.example.org").unwrap();
        let b = a.clone().with_ancestor_domain("example.org").unwrap();
        assert_eq!(a, b);
        assert_eq!(b.ancestor_domain.as_deref(), Some("example.org"));
    }

    #[test]
    fn type_accessors() {
        let ip = Identifier::ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 10)));
        assert!(ip.is_type_ip());
        assert_eq!(ip.ip_address().unwrap().to_string(), "127.0.0.10");
        assert!(matches!(ip.domain(), Err(Error::ProtocolViolation(_))));
        assert!(ip.with_ancestor_domain("example.org").is_err());

        let dns = Identifier::dns("example.org").unwrap();
        assert_eq!(dns.domain().unwrap(), "example.org");
        assert!(matches!(dns.ip_address(), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn serializes_wire_format() {
        let id = Identifier::dns("foo.example.org")
            .unwrap()
            .with_ancestor_domain("example.org")
            .unwrap();

        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            r#"{"type":"dns","value":"foo.example.org","ancestorDomain":"example.org"}"#
        );
    }
}
