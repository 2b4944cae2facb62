use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;

use crate::{
    acc::Account,
    api,
    challenge::{Challenge, ChallengeKind, TypedChallenge},
    error::Result,
    poll::{poll_until, Pollable, RetryPolicy, Status},
};

/// An authorization ([ownership proof]) for an identifier.
///
/// Each authorization for an order must be progressed to a valid state before the ACME API
/// will issue a certificate.
///
/// Authorizations may or may not be required depending on previous orders against the same
/// ACME account. The ACME API decides if the authorization is needed.
///
/// The CA offers several challenges per authorization, fulfilling one of them is enough.
///
/// [ownership proof]: ../index.html#domain-ownership
#[derive(Debug, Clone)]
pub struct Authorization {
    inner: Arc<AuthorizationInner>,
}

#[derive(Debug)]
struct AuthorizationInner {
    account: Account,
    location: String,
    api_auth: RwLock<api::Authorization>,
}

impl Authorization {
    /// Fetches the authorization at `location`.
    pub(crate) async fn bind(account: Account, location: &str) -> Result<Self> {
        let res = account.post_as_get(location).await?;
        let api_auth = res.json::<api::Authorization>()?;

        Ok(Self {
            inner: Arc::new(AuthorizationInner {
                account,
                location: location.to_owned(),
                api_auth: RwLock::new(api_auth),
            }),
        })
    }

    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// Identifier this authorization is for.
    ///
    /// For wildcard orders, the value is the domain without the `*.` label.
    pub fn identifier(&self) -> api::Identifier {
        self.inner.api_auth.read().identifier.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.api_auth.read().status
    }

    pub fn expires(&self) -> Option<String> {
        self.inner.api_auth.read().expires.clone()
    }

    pub fn is_wildcard(&self) -> bool {
        self.inner.api_auth.read().is_wildcard()
    }

    /// Returns true if the authorization also covers subdomains of the identifier.
    pub fn is_subdomain_auth_allowed(&self) -> bool {
        self.inner
            .api_auth
            .read()
            .subdomain_auth_allowed
            .unwrap_or(false)
    }

    /// Whether we actually need to do the authorization. This might not be needed if we have
    /// proven ownership of the domain recently in a previous order.
    pub fn need_challenge(&self) -> bool {
        self.status() != Status::Valid
    }

    /// Returns a copy of the authorization's API object.
    ///
    /// Useful for debugging.
    pub fn api_auth(&self) -> api::Authorization {
        self.inner.api_auth.read().clone()
    }

    /// All challenges the CA offers, in the CA's order.
    pub fn challenges(&self) -> Vec<Challenge> {
        self.inner
            .api_auth
            .read()
            .challenges
            .iter()
            .map(|c| Challenge::new(self.inner.account.clone(), c.clone()))
            .collect()
    }

    /// Returns the first challenge of type `challenge_type`.
    pub fn find_challenge_by_type(&self, challenge_type: &str) -> Option<Challenge> {
        self.inner
            .api_auth
            .read()
            .challenge(challenge_type)
            .map(|c| Challenge::new(self.inner.account.clone(), c.clone()))
    }

    /// Returns the first challenge handled by `T`.
    ///
    /// ```no_run
    /// use acme::{challenge::Dns01, order::Authorization};
    ///
    /// async fn dns_authorize(auth: &Authorization) -> eyre::Result<()> {
    ///     let challenge = auth.find_challenge::<Dns01>()?.unwrap();
    ///     let record = challenge.rr_name(&auth.identifier())?;
    ///     // route_53_set_record(&record, "TXT", challenge.digest()?);
    ///     Ok(())
    /// }
    /// ```
    pub fn find_challenge<T: ChallengeKind>(&self) -> Result<Option<T>> {
        let api_challenge = self
            .inner
            .api_auth
            .read()
            .challenges
            .iter()
            .find(|c| T::acceptable(&c._type))
            .cloned();

        api_challenge
            .map(|c| T::from_challenge(Challenge::new(self.inner.account.clone(), c)))
            .transpose()
    }

    /// All challenges wrapped in their typed form.
    ///
    /// The session's provider decides which type handles a challenge. Challenges of unknown types
    /// are returned as generic [`Challenge`]s.
    pub fn typed_challenges(&self) -> Result<Vec<Box<dyn TypedChallenge>>> {
        let provider = self.inner.account.session().provider();

        self.challenges()
            .into_iter()
            .map(|challenge| {
                Ok(provider
                    .create_challenge(challenge.clone())?
                    .unwrap_or_else(|| Box::new(challenge) as Box<dyn TypedChallenge>))
            })
            .collect()
    }

    /// Fetches the current state from the CA.
    ///
    /// Returns the `Retry-After` duration if the CA sent one.
    pub async fn update(&self) -> Result<Option<Duration>> {
        let res = self.inner.account.post_as_get(self.location()).await?;
        *self.inner.api_auth.write() = res.json()?;
        Ok(res.retry_after())
    }

    /// Gives up the authorization, e.g. after the identifier changed hands.
    pub async fn deactivate(&self) -> Result<()> {
        log::debug!("Deactivate authorization {}", self.location());

        let res = self
            .inner
            .account
            .post(self.location(), &json!({ "status": "deactivated" }))
            .await?;

        *self.inner.api_auth.write() = res.json()?;
        Ok(())
    }

    /// Waits until the authorization reaches a final status, e.g. `valid`.
    pub async fn wait_for_completion(&self, policy: &RetryPolicy) -> Result<Status> {
        poll_until(self, Status::is_final, policy).await
    }
}

#[async_trait]
impl Pollable for Authorization {
    async fn update(&self) -> Result<Option<Duration>> {
        Authorization::update(self).await
    }

    fn status(&self) -> Status {
        Authorization::status(self)
    }

    fn location(&self) -> &str {
        Authorization::location(self)
    }
}
