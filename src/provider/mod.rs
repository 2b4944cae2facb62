//! CA specific behaviour, selected by the session's server URI.
//!
//! A provider maps the server URI to a directory URL, builds the HTTP client and creates typed
//! challenges. [`GenericProvider`] serves any `http(s)` directory URL. The other providers accept
//! `acme://` aliases for well known CAs.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use url::Url;

use crate::{
    api,
    challenge::{Challenge, ChallengeRegistry, TypedChallenge},
    connector::client_builder,
    error::{Error, Result},
    session::Session,
    settings::NetworkSettings,
};

mod letsencrypt;
mod pebble;
mod sslcom;

pub use self::{letsencrypt::LetsEncryptProvider, pebble::PebbleProvider, sslcom::SslComProvider};

/// Scheme of CA aliases, like `acme://letsencrypt.org/staging`.
pub const ALIAS_SCHEME: &str = "acme";

/// Adapts the engine to one CA or family of CAs.
#[async_trait]
pub trait AcmeProvider: fmt::Debug + Send + Sync {
    /// Returns true if this provider serves `server_uri`.
    fn accepts(&self, server_uri: &Url) -> bool;

    /// Maps `server_uri` to the URL of the CA's directory.
    fn resolve(&self, server_uri: &Url) -> Result<Url>;

    /// Builds the HTTP client for a session.
    fn create_http_client(&self, settings: &NetworkSettings) -> Result<reqwest::Client> {
        Ok(client_builder(settings)?.build()?)
    }

    /// Fetches the directory of `server_uri`.
    ///
    /// Returns `None` if the CA confirmed the directory `session` already holds is current.
    async fn directory(&self, session: &Session, server_uri: &Url) -> Result<Option<api::Directory>> {
        let url = self.resolve(server_uri)?;
        let validators = session.directory_validators();

        let res = session
            .connect()
            .await?
            .send_directory_request(url.as_str(), &validators)
            .await?;

        match res {
            Some(res) => {
                let directory = res.json::<api::Directory>()?;
                session.set_directory_validators(res.validators());
                Ok(Some(directory))
            }
            None => {
                log::debug!("Directory {url} not modified");
                Ok(None)
            }
        }
    }

    /// Wraps `challenge` in the type that handles its challenge type.
    ///
    /// Returns `None` if no challenge type matches.
    fn create_challenge(&self, challenge: Challenge) -> Result<Option<Box<dyn TypedChallenge>>> {
        ChallengeRegistry::default().create(challenge)
    }
}

/// Serves any directory given by its `http` or `https` URL.
#[derive(Debug, Clone, Default)]
pub struct GenericProvider;

impl AcmeProvider for GenericProvider {
    fn accepts(&self, server_uri: &Url) -> bool {
        matches!(server_uri.scheme(), "http" | "https")
    }

    fn resolve(&self, server_uri: &Url) -> Result<Url> {
        Ok(server_uri.clone())
    }
}

/// Ordered list of providers. The first one accepting a URI wins.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AcmeProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Adds `provider` with a lower priority than the providers already registered.
    pub fn register(&mut self, provider: Arc<dyn AcmeProvider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub fn find(&self, server_uri: &Url) -> Result<Arc<dyn AcmeProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.accepts(server_uri))
            .cloned()
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!("no ACME provider accepts {server_uri}"))
            })
    }
}

impl Default for ProviderRegistry {
    /// Registry of the built-in providers.
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(LetsEncryptProvider))
            .register(Arc::new(SslComProvider))
            .register(Arc::new(PebbleProvider::new()))
            .register(Arc::new(GenericProvider));
        registry
    }
}

/// Returns true if `server_uri` is an alias with host `host`.
fn is_alias_for(server_uri: &Url, host: &str) -> bool {
    server_uri.scheme() == ALIAS_SCHEME && server_uri.host_str() == Some(host)
}

/// Path of an alias without its trailing slash.
fn alias_path(server_uri: &Url) -> &str {
    server_uri.path().trim_end_matches('/')
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| Error::InvalidConfiguration(format!("bad URL {url}: {err}")))
}
