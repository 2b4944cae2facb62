//! Order life cycle.
//!
//! An order goes through a life cycle of different states that require various actions by the
//! user:
//!
//! 1. Create the order with [`Account::new_order()`], which returns an [`OrderBuilder`].
//! 2. Prove control over each identifier through the order's [`Authorization`]s, by fulfilling
//!    one of their challenges. The order then becomes `ready`.
//! 3. Finalize the order by submitting a CSR. The order is `processing` until the CA issues the
//!    certificate and it becomes `valid`.
//! 4. Download the certificate.
//!
//! The CA might "remember" for a time that you already control an identifier, which means you
//! might not need to prove control every time. Use [`Authorization::need_challenge()`] to check.
//!
//! [`Account::new_order()`]: crate::Account::new_order()

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use der::Encode as _;
use eyre::WrapErr as _;
use parking_lot::RwLock;
use pkcs8::EncodePrivateKey as _;

use crate::{
    acc::Account,
    api,
    cert::{create_csr, Certificate},
    error::{Error, Result},
    poll::{poll_until, Pollable, RetryPolicy, Status},
};

mod auth;
mod builder;

pub use self::{auth::Authorization, builder::OrderBuilder};

/// An order for a certificate.
#[derive(Debug, Clone)]
pub struct Order {
    inner: Arc<OrderInner>,
}

#[derive(Debug)]
struct OrderInner {
    account: Account,
    location: String,
    api_order: RwLock<api::Order>,
}

impl Order {
    pub(crate) fn new(account: Account, location: String, api_order: api::Order) -> Self {
        Self {
            inner: Arc::new(OrderInner {
                account,
                location,
                api_order: RwLock::new(api_order),
            }),
        }
    }

    /// Fetches the order at `location`.
    pub(crate) async fn bind(account: Account, location: &str) -> Result<Self> {
        let order = Self::new(account, location.to_owned(), api::Order::default());
        order.update().await?;
        Ok(order)
    }

    pub fn account(&self) -> &Account {
        &self.inner.account
    }

    pub fn location(&self) -> &str {
        &self.inner.location
    }

    pub fn status(&self) -> Status {
        self.inner.api_order.read().status
    }

    /// Identifiers of the order, in the order they were submitted.
    pub fn identifiers(&self) -> Vec<api::Identifier> {
        self.inner.api_order.read().identifiers.clone()
    }

    pub fn expires(&self) -> Option<String> {
        self.inner.api_order.read().expires.clone()
    }

    pub fn not_before(&self) -> Option<String> {
        self.inner.api_order.read().not_before.clone()
    }

    pub fn not_after(&self) -> Option<String> {
        self.inner.api_order.read().not_after.clone()
    }

    /// Error that caused the order to become invalid.
    pub fn error(&self) -> Option<api::Problem> {
        self.inner.api_order.read().error.clone()
    }

    pub fn profile(&self) -> Option<String> {
        self.inner.api_order.read().profile.clone()
    }

    /// ARI identifier of the certificate this order replaces.
    pub fn replaces(&self) -> Option<String> {
        self.inner.api_order.read().replaces.clone()
    }

    /// Auto-renewal parameters, if this is an auto-renewal order.
    pub fn auto_renewal(&self) -> Option<api::AutoRenewal> {
        self.inner.api_order.read().auto_renewal.clone()
    }

    /// Returns true if the CA issues short-term certificates for this order.
    pub fn is_auto_renewing(&self) -> bool {
        self.inner.api_order.read().auto_renewal.is_some()
    }

    /// URL of the issued certificate.
    ///
    /// For auto-renewal orders, this is the URL of the always current short-term certificate.
    pub fn certificate_url(&self) -> Option<String> {
        let api_order = self.inner.api_order.read();

        api_order
            .certificate
            .clone()
            .or_else(|| api_order.star_certificate.clone())
    }

    /// Returns a copy of the order's API object.
    ///
    /// Useful for debugging.
    pub fn api_order(&self) -> api::Order {
        self.inner.api_order.read().clone()
    }

    /// Fetches the authorizations of the order.
    ///
    /// There is one authorization per identifier. If the order includes identifiers that have
    /// been authorized before, this list might contain a mix of valid and not yet valid ones.
    pub async fn authorizations(&self) -> Result<Vec<Authorization>> {
        let urls = self.inner.api_order.read().authorizations.clone();

        let mut authorizations = Vec::with_capacity(urls.len());
        for url in urls {
            authorizations.push(Authorization::bind(self.inner.account.clone(), &url).await?);
        }

        Ok(authorizations)
    }

    /// Fetches the current state of the order from the CA.
    ///
    /// Returns the `Retry-After` duration if the CA sent one.
    pub async fn update(&self) -> Result<Option<Duration>> {
        let res = self.inner.account.post_as_get(self.location()).await?;
        self.set_api_order(res.json()?)?;
        Ok(res.retry_after())
    }

    /// Waits until all authorizations are valid and the order can be finalized.
    ///
    /// Also returns when the order reaches a final status, e.g. `invalid`.
    pub async fn wait_until_ready(&self, policy: &RetryPolicy) -> Result<Status> {
        poll_until(
            self,
            |status| status == Status::Ready || status.is_final(),
            policy,
        )
        .await
    }

    /// Waits until the CA has issued the certificate or failed to.
    pub async fn wait_for_completion(&self, policy: &RetryPolicy) -> Result<Status> {
        poll_until(self, Status::is_final, policy).await
    }

    /// Finalizes the order by submitting a CSR for its identifiers.
    ///
    /// The CSR is signed with `signing_key`, the key of the certificate to be issued. The order
    /// then goes into a `processing` status, use [`Order::wait_for_completion()`] to wait for
    /// the certificate.
    pub async fn finalize(&self, signing_key: &p256::ecdsa::SigningKey) -> Result<()> {
        let (identifiers, finalize_url) = {
            let api_order = self.inner.api_order.read();
            (api_order.identifiers.clone(), api_order.finalize.clone())
        };

        if finalize_url.is_empty() {
            return Err(Error::ProtocolViolation(format!(
                "order {} has no finalize URL",
                self.location()
            )));
        }

        let csr = create_csr(signing_key, &identifiers)?;

        // this is not the same as PEM.
        let csr_der = csr.to_der().wrap_err("encode CSR")?;

        log::debug!("Finalize order {}", self.location());

        // if the CSR is invalid, we will get a 4xx code back
        let res = self
            .inner
            .account
            .post(&finalize_url, &api::Finalize::from_der(&csr_der))
            .await?;

        self.set_api_order(res.json()?)
    }

    /// Downloads the issued certificate.
    ///
    /// `signing_key` is the key the order was finalized with. It is bundled with the certificate.
    pub async fn download_certificate(
        &self,
        signing_key: &p256::ecdsa::SigningKey,
    ) -> Result<Certificate> {
        let url = self.certificate_url().ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "order {} has no certificate (status: {})",
                self.location(),
                self.status()
            ))
        })?;

        let res = self.inner.account.post_as_get(&url).await?;

        let signing_key_pem = signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("encode certificate key")?;

        Ok(Certificate::new(signing_key_pem, res.text()))
    }

    fn set_api_order(&self, from_api: api::Order) -> Result<()> {
        self.inner.api_order.write().overwrite(from_api)
    }
}

#[async_trait]
impl Pollable for Order {
    async fn update(&self) -> Result<Option<Duration>> {
        Order::update(self).await
    }

    fn status(&self) -> Status {
        Order::status(self)
    }

    fn location(&self) -> &str {
        Order::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cert::create_p256_key,
        challenge::{DnsPersist01, TypedChallenge as _},
        test::with_mock_ca,
    };

    fn fast() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(10)).with_initial_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn issue_with_dns_persist() {
        let server = with_mock_ca();
        let account = server.account().await;

        let order = account
            .new_order()
            .domain("example.org")
            .unwrap()
            .create()
            .await
            .unwrap();
        assert_eq!(order.status(), Status::Pending);
        assert_eq!(order.location(), format!("{}/acme/order/1", server.base));

        let authorizations = order.authorizations().await.unwrap();
        assert_eq!(authorizations.len(), 1);
        let auth = &authorizations[0];
        assert!(auth.need_challenge());

        let challenge = auth.find_challenge::<DnsPersist01>().unwrap().unwrap();
        assert_eq!(
            challenge.rr_name(&auth.identifier()).unwrap(),
            "_validation-persist.example.org."
        );
        let issuer = &challenge.issuer_domain_names().unwrap()[0];
        assert_eq!(
            challenge.build_record_value(issuer).unwrap(),
            format!("ca.example.com; accounturi={}", account.location())
        );

        challenge.trigger().await.unwrap();
        assert_eq!(
            challenge.challenge().wait_for_completion(&fast()).await.unwrap(),
            Status::Valid
        );

        assert_eq!(auth.wait_for_completion(&fast()).await.unwrap(), Status::Valid);
        assert_eq!(order.wait_until_ready(&fast()).await.unwrap(), Status::Ready);

        let key = create_p256_key();
        order.finalize(&key).await.unwrap();
        assert_eq!(order.status(), Status::Processing);
        assert_eq!(order.wait_for_completion(&fast()).await.unwrap(), Status::Valid);

        let cert = order.download_certificate(&key).await.unwrap();
        assert_eq!("CERT HERE", cert.certificate());
        assert!(!cert.private_key().is_empty());
    }

    #[tokio::test]
    async fn identifiers_keep_submitted_order() {
        let server = with_mock_ca();
        let account = server.account().await;

        // the mock CA lists identifiers in reverse
        let order = account
            .new_order()
            .domains(["b.example.org", "a.example.org", "b.example.org"])
            .unwrap()
            .create()
            .await
            .unwrap();

        let domains = order
            .identifiers()
            .into_iter()
            .map(|id| id.value)
            .collect::<Vec<_>>();
        assert_eq!(domains, ["b.example.org", "a.example.org"]);

        order.update().await.unwrap();
        assert_eq!(order.identifiers().len(), 2);
        assert_eq!(order.identifiers()[0].value, "b.example.org");
    }

    #[tokio::test]
    async fn bind_existing_order() {
        let server = with_mock_ca();
        let account = server.account().await;

        let created = account
            .new_order()
            .domain("example.org")
            .unwrap()
            .create()
            .await
            .unwrap();

        let bound = account.bind_order(created.location()).await.unwrap();
        assert_eq!(bound.identifiers(), created.identifiers());
        assert!(bound.certificate_url().is_none());

        let err = bound
            .download_certificate(&create_p256_key())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
