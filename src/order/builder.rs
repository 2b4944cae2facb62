use std::time::Duration;

use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use super::Order;
use crate::{
    acc::Account,
    api::{self, Identifier},
    cert::Certificate,
    error::{Error, Result},
    session::Resource,
};

/// Collects the parameters of a new order.
///
/// Created by [`Account::new_order()`]. At least one identifier must be added before calling
/// [`OrderBuilder::create()`].
///
/// ```no_run
/// # async fn order(account: &acme::Account) -> acme::Result<acme::order::Order> {
/// account
///     .new_order()
///     .domains(["example.org", "www.example.org"])?
///     .profile("shortlived")
///     .create()
///     .await
/// # }
/// ```
///
/// A validity period (`notBefore`/`notAfter`) and auto-renewal exclude each other.
#[derive(Debug)]
pub struct OrderBuilder {
    account: Account,
    identifiers: Vec<Identifier>,
    not_before: Option<OffsetDateTime>,
    not_after: Option<OffsetDateTime>,
    auto_renewal: bool,
    auto_renewal_start: Option<OffsetDateTime>,
    auto_renewal_end: Option<OffsetDateTime>,
    auto_renewal_lifetime: Option<Duration>,
    auto_renewal_lifetime_adjust: Option<Duration>,
    auto_renewal_get: bool,
    profile: Option<String>,
    replaces: Option<String>,
}

impl OrderBuilder {
    pub(crate) fn new(account: Account) -> Self {
        Self {
            account,
            identifiers: Vec::new(),
            not_before: None,
            not_after: None,
            auto_renewal: false,
            auto_renewal_start: None,
            auto_renewal_end: None,
            auto_renewal_lifetime: None,
            auto_renewal_lifetime_adjust: None,
            auto_renewal_get: false,
            profile: None,
            replaces: None,
        }
    }

    /// Adds a domain name. Wildcards and IDNs are accepted.
    pub fn domain(self, domain: &str) -> Result<Self> {
        Ok(self.identifier(Identifier::dns(domain)?))
    }

    pub fn domains<I, S>(mut self, domains: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for domain in domains {
            self = self.domain(domain.as_ref())?;
        }

        Ok(self)
    }

    /// Adds an identifier. Duplicates are ignored.
    pub fn identifier(mut self, identifier: Identifier) -> Self {
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }

        self
    }

    pub fn identifiers<I>(self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
    {
        identifiers.into_iter().fold(self, Self::identifier)
    }

    /// Requests a certificate that is not valid before `not_before`.
    pub fn not_before(mut self, not_before: OffsetDateTime) -> Result<Self> {
        self.reject_auto_renewal("notBefore")?;
        self.not_before = Some(not_before);
        Ok(self)
    }

    /// Requests a certificate that is not valid after `not_after`.
    pub fn not_after(mut self, not_after: OffsetDateTime) -> Result<Self> {
        self.reject_auto_renewal("notAfter")?;
        self.not_after = Some(not_after);
        Ok(self)
    }

    /// Requests short-term automatic renewal certificates, see [RFC 8739].
    ///
    /// [RFC 8739]: https://datatracker.ietf.org/doc/html/rfc8739
    pub fn auto_renewal(mut self) -> Result<Self> {
        if self.not_before.is_some() || self.not_after.is_some() {
            return Err(Error::InvalidArgument(
                "auto-renewal cannot be combined with notBefore/notAfter".to_owned(),
            ));
        }

        self.auto_renewal = true;
        Ok(self)
    }

    /// Sets the start of the auto-renewal period. Implies [`OrderBuilder::auto_renewal()`].
    pub fn auto_renewal_start(self, start: OffsetDateTime) -> Result<Self> {
        let mut builder = self.auto_renewal()?;
        builder.auto_renewal_start = Some(start);
        Ok(builder)
    }

    /// Sets the end of the auto-renewal period. Implies [`OrderBuilder::auto_renewal()`].
    pub fn auto_renewal_end(self, end: OffsetDateTime) -> Result<Self> {
        let mut builder = self.auto_renewal()?;
        builder.auto_renewal_end = Some(end);
        Ok(builder)
    }

    /// Sets the validity of each short-term certificate. Implies [`OrderBuilder::auto_renewal()`].
    pub fn auto_renewal_lifetime(self, lifetime: Duration) -> Result<Self> {
        let mut builder = self.auto_renewal()?;
        builder.auto_renewal_lifetime = Some(lifetime);
        Ok(builder)
    }

    /// Sets how much the certificates' validity periods overlap. Implies
    /// [`OrderBuilder::auto_renewal()`].
    pub fn auto_renewal_lifetime_adjust(self, adjust: Duration) -> Result<Self> {
        let mut builder = self.auto_renewal()?;
        builder.auto_renewal_lifetime_adjust = Some(adjust);
        Ok(builder)
    }

    /// Allows fetching the short-term certificates with unauthenticated GET requests. Implies
    /// [`OrderBuilder::auto_renewal()`].
    pub fn auto_renewal_enable_get(self) -> Result<Self> {
        let mut builder = self.auto_renewal()?;
        builder.auto_renewal_get = true;
        Ok(builder)
    }

    /// Requests a certificate profile advertised by the CA.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Marks the order as replacement of the certificate with ARI identifier `replaces`.
    pub fn replaces(mut self, replaces: impl Into<String>) -> Self {
        self.replaces = Some(replaces.into());
        self
    }

    /// Marks the order as replacement of `certificate`.
    pub fn replaces_certificate(self, certificate: &Certificate) -> Result<Self> {
        let id = certificate
            .renewal_unique_identifier()
            .map_err(|err| Error::InvalidArgument(format!("cannot identify certificate: {err}")))?;

        Ok(self.replaces(id))
    }

    /// Checks the order against the CA's capabilities and submits it.
    pub async fn create(self) -> Result<Order> {
        if self.identifiers.is_empty() {
            return Err(Error::InvalidArgument(
                "an order needs at least one identifier".to_owned(),
            ));
        }

        let session = self.account.session().clone();
        let meta = session.metadata().await?;

        if self.auto_renewal && !meta.is_auto_renewal_enabled() {
            return Err(Error::CapabilityUnsupported("auto-renewal".to_owned()));
        }

        if self.auto_renewal_get && !meta.is_auto_renewal_get_allowed() {
            return Err(Error::CapabilityUnsupported(
                "auto-renewal certificate GET".to_owned(),
            ));
        }

        if self.replaces.is_some()
            && session
                .resource_url_optional(Resource::RenewalInfo)
                .await?
                .is_none()
        {
            return Err(Error::CapabilityUnsupported("renewal information".to_owned()));
        }

        if let Some(profile) = &self.profile {
            if !meta.is_profile_allowed() {
                return Err(Error::CapabilityUnsupported("profiles".to_owned()));
            }

            if !meta.is_named_profile_allowed(profile) {
                return Err(Error::CapabilityUnsupported(format!("profile {profile}")));
            }
        }

        if self
            .identifiers
            .iter()
            .any(|id| id.ancestor_domain.is_some())
            && !meta.is_subdomain_auth_allowed()
        {
            return Err(Error::CapabilityUnsupported(
                "subdomain authorization".to_owned(),
            ));
        }

        let new_order = self.new_order_payload()?;
        let url = session.resource_url(Resource::NewOrder).await?;

        log::debug!("Create order for {:?}", new_order.identifiers);

        let res = self.account.post(&url, &new_order).await?;
        let location = res.expect_location()?;
        let from_api = res.json::<api::Order>()?;

        let mut api_order = api::Order {
            identifiers: self.identifiers,
            ..Default::default()
        };
        api_order.overwrite(from_api)?;

        Ok(Order::new(self.account, location, api_order))
    }

    fn new_order_payload(&self) -> Result<api::NewOrder> {
        let auto_renewal = if self.auto_renewal {
            Some(api::AutoRenewal {
                start_date: self.auto_renewal_start.map(rfc3339).transpose()?,
                end_date: self.auto_renewal_end.map(rfc3339).transpose()?,
                lifetime: self.auto_renewal_lifetime.map(|d| d.as_secs()),
                lifetime_adjust: self.auto_renewal_lifetime_adjust.map(|d| d.as_secs()),
                allow_certificate_get: self.auto_renewal_get.then_some(true),
            })
        } else {
            None
        };

        Ok(api::NewOrder {
            identifiers: self.identifiers.clone(),
            not_before: self.not_before.map(rfc3339).transpose()?,
            not_after: self.not_after.map(rfc3339).transpose()?,
            auto_renewal,
            replaces: self.replaces.clone(),
            profile: self.profile.clone(),
        })
    }

    fn reject_auto_renewal(&self, field: &str) -> Result<()> {
        if self.auto_renewal {
            return Err(Error::InvalidArgument(format!(
                "{field} cannot be combined with auto-renewal"
            )));
        }

        Ok(())
    }
}

fn rfc3339(date: OffsetDateTime) -> Result<String> {
    date.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| Error::InvalidArgument(format!("cannot format date {date}: {err}")))
}
