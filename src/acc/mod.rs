use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::{
    api,
    challenge::Challenge,
    connection::Response,
    error::Result,
    order::{Authorization, Order, OrderBuilder},
    session::Session,
};

mod acme_key;

pub(crate) use self::acme_key::AcmeKey;

#[derive(Debug)]
struct AccountInner {
    session: Session,
    acme_key: AcmeKey,
    location: String,
    api_account: RwLock<api::Account>,
}

/// Account with an ACME provider.
///
/// Accounts are created using [`Session::register_account()`] and consist of contact addresses
/// and a private key for signing requests to the ACME API.
///
/// This library uses elliptic curve P-256 for accessing the account.
///
/// The advantages of using elliptic curve cryptography are that the signed requests against the
/// ACME lib are small and that the public key can be derived from the private key.
#[derive(Debug, Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

impl Account {
    pub(crate) fn new(
        session: Session,
        acme_key: AcmeKey,
        location: String,
        api_account: api::Account,
    ) -> Self {
        Self {
            inner: Arc::new(AccountInner {
                session,
                acme_key,
                location,
                api_account: RwLock::new(api_account),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Account URL, also used as key ID of signed requests.
    pub fn location(&self) -> &str {
        &self.inner.location
    }

    pub(crate) fn key(&self) -> &AcmeKey {
        &self.inner.acme_key
    }

    /// Private key for this account.
    ///
    /// The key is an elliptic curve private key.
    pub fn acme_private_key_pem(&self) -> Result<Zeroizing<String>> {
        Ok(self.inner.acme_key.to_pem()?)
    }

    /// Returns a copy of the account's API object.
    ///
    /// Useful for debugging.
    pub fn api_account(&self) -> api::Account {
        self.inner.api_account.read().clone()
    }

    /// Fetches the current state of the account from the CA.
    pub async fn update(&self) -> Result<()> {
        let res = self.post_as_get(self.location()).await?;
        *self.inner.api_account.write() = res.json()?;
        Ok(())
    }

    /// Starts a new order to issue a certificate for this account.
    ///
    /// Every created order is a new order with the ACME API provider, even when the identifiers
    /// are exactly the same.
    pub fn new_order(&self) -> OrderBuilder {
        OrderBuilder::new(self.clone())
    }

    /// Loads an existing order of this account.
    pub async fn bind_order(&self, location: &str) -> Result<Order> {
        Order::bind(self.clone(), location).await
    }

    /// Loads an existing authorization of this account.
    pub async fn bind_authorization(&self, location: &str) -> Result<Authorization> {
        Authorization::bind(self.clone(), location).await
    }

    /// Loads an existing challenge of this account.
    pub async fn bind_challenge(&self, location: &str) -> Result<Challenge> {
        Challenge::bind(self.clone(), location).await
    }

    /// Sends a signed request with `claims` as payload.
    pub(crate) async fn post<T>(&self, url: &str, claims: &T) -> Result<Response>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.inner
            .session
            .connect()
            .await?
            .send_signed_request(url, claims, &self.inner.acme_key)
            .await
    }

    /// Fetches `url` with a POST-as-GET request.
    pub(crate) async fn post_as_get(&self, url: &str) -> Result<Response> {
        self.inner
            .session
            .connect()
            .await?
            .send_signed_post_as_get(url, &self.inner.acme_key)
            .await
    }
}
