//! Challenges offered by the CA to prove control over an identifier.
//!
//! A [`Challenge`] is the generic resource. The typed wrappers add what a client needs to set up
//! the proof for one challenge type:
//!
//! - [`Http01`]: a file served over HTTP.
//! - [`Dns01`]: a `TXT` record under `_acme-challenge`.
//! - [`TlsAlpn01`]: a certificate served for the `acme-tls/1` ALPN protocol.
//! - [`DnsPersist01`]: a persistent `TXT` record naming the CA and the account.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    acc::Account,
    api,
    error::Result,
    poll::{poll_until, Pollable, RetryPolicy, Status},
};

mod dns_persist;
mod token;

pub use self::{
    dns_persist::{DnsPersist01, RECORD_NAME_PREFIX},
    token::{Dns01, Http01, TlsAlpn01},
};

/// A challenge resource of an authorization.
#[derive(Debug, Clone)]
pub struct Challenge {
    inner: Arc<ChallengeInner>,
}

#[derive(Debug)]
struct ChallengeInner {
    account: Account,
    location: String,
    api_challenge: RwLock<api::Challenge>,
}

impl Challenge {
    pub(crate) fn new(account: Account, api_challenge: api::Challenge) -> Self {
        Self {
            inner: Arc::new(ChallengeInner {
                account,
                location: api_challenge.url.clone(),
                api_challenge: RwLock::new(api_challenge),
            }),
        }
    }

    /// Fetches the challenge at `location`.
    pub(crate) async fn bind(account: Account, location: &str) -> Result<Self> {
        let res = account.post_as_get(location).await?;
        let mut api_challenge = res.json::<api::Challenge>()?;
        api_challenge.url = location.to_owned();

        Ok(Self::new(account, api_challenge))
    }

    pub fn account(&self) -> &Account {
        &self.inner.account
    }

    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// Challenge type, e.g. `http-01`.
    pub fn challenge_type(&self) -> String {
        self.inner.api_challenge.read()._type.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.api_challenge.read().status
    }

    /// Time at which the CA validated this challenge.
    pub fn validated(&self) -> Option<String> {
        self.inner.api_challenge.read().validated.clone()
    }

    /// Error the CA reported while validating this challenge.
    pub fn error(&self) -> Option<api::Problem> {
        self.inner.api_challenge.read().error.clone()
    }

    /// Returns a copy of the challenge's API object.
    ///
    /// Useful for debugging.
    pub fn api_challenge(&self) -> api::Challenge {
        self.inner.api_challenge.read().clone()
    }

    /// Fetches the current state from the CA.
    ///
    /// Returns the `Retry-After` duration if the CA sent one.
    pub async fn update(&self) -> Result<Option<Duration>> {
        let res = self.inner.account.post_as_get(self.location()).await?;
        self.set_api_challenge(res.json()?);
        Ok(res.retry_after())
    }

    /// Waits until the CA has validated the challenge or failed to.
    ///
    /// Returns the final status. The reason of a failed validation is in [`Challenge::error()`].
    pub async fn wait_for_completion(&self, policy: &RetryPolicy) -> Result<Status> {
        poll_until(self, Status::is_final, policy).await
    }

    /// Tells the CA to validate the challenge, sending `response` as payload.
    pub(crate) async fn trigger_with(&self, response: Map<String, Value>) -> Result<()> {
        log::debug!("Triggering challenge {}", self.location());

        let res = self
            .inner
            .account
            .post(self.location(), &Value::Object(response))
            .await?;

        self.set_api_challenge(res.json()?);
        Ok(())
    }

    fn set_api_challenge(&self, mut api_challenge: api::Challenge) {
        if api_challenge.url.is_empty() {
            api_challenge.url = self.inner.location.clone();
        }

        *self.inner.api_challenge.write() = api_challenge;
    }
}

#[async_trait]
impl Pollable for Challenge {
    async fn update(&self) -> Result<Option<Duration>> {
        Challenge::update(self).await
    }

    fn status(&self) -> Status {
        Challenge::status(self)
    }

    fn location(&self) -> &str {
        Challenge::location(self)
    }
}

/// Challenges of types this client has no special support for are handled generically.
impl TypedChallenge for Challenge {
    fn challenge(&self) -> &Challenge {
        self
    }
}

/// A challenge of a type this client knows how to fulfil.
#[async_trait]
pub trait TypedChallenge: fmt::Debug + Send + Sync {
    /// The underlying challenge resource.
    fn challenge(&self) -> &Challenge;

    /// Adds the fields of this challenge type to the response that triggers validation.
    ///
    /// Most challenge types respond with an empty object.
    fn prepare_response(&self, response: &mut Map<String, Value>) -> Result<()> {
        let _ = response;
        Ok(())
    }

    fn challenge_type(&self) -> String {
        self.challenge().challenge_type()
    }

    fn status(&self) -> Status {
        self.challenge().status()
    }

    /// Tells the CA the proof is in place and it should validate the challenge.
    async fn trigger(&self) -> Result<()> {
        let mut response = Map::new();
        self.prepare_response(&mut response)?;
        self.challenge().trigger_with(response).await
    }
}

/// A challenge type that can be created from a generic [`Challenge`].
pub trait ChallengeKind: TypedChallenge + Sized + 'static {
    /// Challenge type as sent by the CA.
    const TYPE: &'static str;

    /// Returns true if challenges of `challenge_type` are handled by this type.
    fn acceptable(challenge_type: &str) -> bool {
        challenge_type == Self::TYPE
    }

    fn from_challenge(challenge: Challenge) -> Result<Self>;
}

/// Maps challenge types to their typed wrappers.
#[derive(Debug, Clone)]
pub struct ChallengeRegistry {
    kinds: Vec<Kind>,
}

#[derive(Debug, Clone, Copy)]
struct Kind {
    challenge_type: &'static str,
    acceptable: fn(&str) -> bool,
    create: fn(Challenge) -> Result<Box<dyn TypedChallenge>>,
}

impl ChallengeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { kinds: Vec::new() }
    }

    /// Adds `T` with a lower priority than the types already registered.
    pub fn register<T: ChallengeKind>(&mut self) -> &mut Self {
        self.kinds.push(Kind {
            challenge_type: T::TYPE,
            acceptable: T::acceptable,
            create: create_boxed::<T>,
        });
        self
    }

    /// Challenge types of this registry, in priority order.
    pub fn challenge_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|kind| kind.challenge_type)
    }

    /// Wraps `challenge` in the first registered type accepting it.
    ///
    /// Returns `None` if no registered type accepts the challenge.
    pub fn create(&self, challenge: Challenge) -> Result<Option<Box<dyn TypedChallenge>>> {
        let challenge_type = challenge.challenge_type();

        match self
            .kinds
            .iter()
            .find(|kind| (kind.acceptable)(&challenge_type))
        {
            Some(kind) => (kind.create)(challenge).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Http01>()
            .register::<Dns01>()
            .register::<TlsAlpn01>()
            .register::<DnsPersist01>();
        registry
    }
}

fn create_boxed<T: ChallengeKind>(challenge: Challenge) -> Result<Box<dyn TypedChallenge>> {
    Ok(Box::new(T::from_challenge(challenge)?))
}
