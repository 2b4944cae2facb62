use std::io::{BufReader, Cursor};

use der::{
    asn1::{Ia5String, OctetString},
    oid::AssociatedOid as _,
    Decode as _, DecodePem as _,
};
use eyre::{eyre, WrapErr as _};
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use time::OffsetDateTime;
use x509_cert::{
    builder::{Builder, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, AuthorityKeyIdentifier, SubjectAltName},
    name::Name,
};
use zeroize::Zeroizing;

use crate::{api::Identifier, util::base64url};

/// Make a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Creates a CSR for `identifiers` and signs it with `signer`.
///
/// The first domain is picked for the CSR's Common Name (CN). All identifiers are added to a
/// Subject Alternative Name (SAN) extension.
pub(crate) fn create_csr(
    signer: &p256::ecdsa::SigningKey,
    identifiers: &[Identifier],
) -> eyre::Result<x509_cert::request::CertReq> {
    let subject = match identifiers.iter().find(|id| id.is_type_dns()) {
        Some(primary) => format!("CN={}", primary.value)
            .parse::<Name>()
            .wrap_err("build subject")?,
        None => Name::default(),
    };

    let names = identifiers
        .iter()
        .map(|id| -> eyre::Result<GeneralName> {
            if id.is_type_dns() {
                Ok(GeneralName::DnsName(Ia5String::new(&id.value)?))
            } else {
                let ip = id.ip_address().map_err(|err| eyre!("{err}"))?;
                let octets = match ip {
                    std::net::IpAddr::V4(ip) => ip.octets().to_vec(),
                    std::net::IpAddr::V6(ip) => ip.octets().to_vec(),
                };
                Ok(GeneralName::IpAddress(OctetString::new(octets)?))
            }
        })
        .collect::<eyre::Result<Vec<_>>>()?;

    if names.is_empty() {
        return Err(eyre!("no identifiers for CSR"));
    }

    let mut csr = CsrBuilder::new(subject, signer).wrap_err("csr builder")?;
    csr.add_extension(&SubjectAltName(names))
        .wrap_err("add SAN extension")?;

    csr.build::<p256::ecdsa::DerSignature>()
        .wrap_err("build csr")
}

/// Encapsulated certificate and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl Certificate {
    pub(crate) fn new(private_key_pem: Zeroizing<String>, certificate: String) -> Self {
        Certificate {
            private_key_pem,
            certificate,
        }
    }

    pub fn parse(private_key_pem: Zeroizing<String>, certificate: String) -> eyre::Result<Self> {
        // validate certificate
        x509_cert::Certificate::from_pem(certificate.as_str())?;

        // validate private key
        ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&private_key_pem)?;

        Ok(Certificate {
            private_key_pem,
            certificate,
        })
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The private key in DER encoding.
    pub fn private_key_der(&self) -> eyre::Result<Vec<u8>> {
        let private_key =
            ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&self.private_key_pem)?;
        let der = private_key.to_pkcs8_der()?;
        Ok(der.as_bytes().to_vec())
    }

    /// The issued certificate file in PEM format.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The issued certificate chain in DER format.
    pub fn certificate_chain(&self) -> eyre::Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.certificate()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn end_entity(&self) -> eyre::Result<x509_cert::Certificate> {
        let cert_chain = self.certificate_chain()?;
        let cert_ee = cert_chain
            .first() // EE cert is first
            .ok_or_else(|| eyre!("no certificates in chain"))?;

        Ok(x509_cert::Certificate::from_der(cert_ee)?)
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It's up to the ACME API provider to decide how long an issued certificate is valid.
    /// Let's Encrypt sets the validity to 90 days. This function reports 89 days for newly
    /// issued cert, since it counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> eyre::Result<i64> {
        let cert = self.end_entity()?;

        let not_after = cert.tbs_certificate.validity.not_after.to_system_time();
        let diff = OffsetDateTime::from(not_after) - OffsetDateTime::now_utc();

        Ok(diff.whole_days())
    }

    /// Returns the ACME Renewal Information identifier of the end entity certificate.
    ///
    /// This is the value to pass as `replaces` when ordering the successor of this certificate.
    ///
    /// See [RFC 9773 §4.1](https://datatracker.ietf.org/doc/html/rfc9773#section-4.1).
    pub fn renewal_unique_identifier(&self) -> eyre::Result<String> {
        let cert = self.end_entity()?;
        let tbs = &cert.tbs_certificate;

        let aki = tbs
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == AuthorityKeyIdentifier::OID)
            .ok_or_else(|| eyre!("certificate has no authority key identifier"))?;

        let aki = AuthorityKeyIdentifier::from_der(aki.extn_value.as_bytes())
            .wrap_err("decode authority key identifier")?;

        let key_id = aki
            .key_identifier
            .ok_or_else(|| eyre!("authority key identifier has no key identifier"))?;

        Ok(format!(
            "{}.{}",
            base64url(key_id.as_bytes()),
            base64url(tbs.serial_number.as_bytes())
        ))
    }
}
