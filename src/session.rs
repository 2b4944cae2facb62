use std::{fmt, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use url::Url;

use crate::{
    acc::{Account, AcmeKey},
    api,
    connection::Connection,
    connector::{default_user_agent, HttpConnector},
    error::{Error, Result},
    nonce::NonceStore,
    provider::{AcmeProvider, ProviderRegistry},
    settings::NetworkSettings,
};

/// Resources a CA lists in its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    NewNonce,
    NewAccount,
    NewOrder,
    NewAuthz,
    RevokeCert,
    KeyChange,
    RenewalInfo,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::NewNonce => "newNonce",
            Resource::NewAccount => "newAccount",
            Resource::NewOrder => "newOrder",
            Resource::NewAuthz => "newAuthz",
            Resource::RevokeCert => "revokeCert",
            Resource::KeyChange => "keyChange",
            Resource::RenewalInfo => "renewalInfo",
        })
    }
}

/// Cache validators of the last directory response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Validators {
    pub(crate) etag: Option<String>,
    pub(crate) last_modified: Option<String>,
}

/// Entry point for accessing an ACME API.
///
/// A session binds the CA's directory, the network settings and the replay nonce of all requests
/// made through it. Sessions are cheap to clone and can be shared between tasks.
///
/// The server URI is either the `http(s)` URL of a directory, or an alias such as
/// `acme://letsencrypt.org/staging` that a provider resolves to one.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    server_uri: Url,
    provider: Arc<dyn AcmeProvider>,
    settings: NetworkSettings,
    user_agent: &'static str,
    nonce: NonceStore,
    directory: RwLock<Option<Arc<api::Directory>>>,
    validators: Mutex<Validators>,
    shared: OnceCell<Arc<HttpConnector>>,
}

impl Session {
    /// Creates a session with default network settings.
    pub fn new(server_uri: &str) -> Result<Self> {
        Self::with_settings(server_uri, NetworkSettings::new())
    }

    pub fn with_settings(server_uri: &str, settings: NetworkSettings) -> Result<Self> {
        Self::with_registry(server_uri, &ProviderRegistry::default(), settings)
    }

    /// Creates a session using the first provider of `registry` that accepts `server_uri`.
    pub fn with_registry(
        server_uri: &str,
        registry: &ProviderRegistry,
        settings: NetworkSettings,
    ) -> Result<Self> {
        let server_uri = parse_server_uri(server_uri)?;
        let provider = registry.find(&server_uri)?;
        Self::build(server_uri, provider, settings)
    }

    /// Creates a session served by `provider`.
    pub fn with_provider(
        server_uri: &str,
        provider: Arc<dyn AcmeProvider>,
        settings: NetworkSettings,
    ) -> Result<Self> {
        let server_uri = parse_server_uri(server_uri)?;

        if !provider.accepts(&server_uri) {
            return Err(Error::InvalidConfiguration(format!(
                "provider {provider:?} does not accept {server_uri}"
            )));
        }

        Self::build(server_uri, provider, settings)
    }

    fn build(
        server_uri: Url,
        provider: Arc<dyn AcmeProvider>,
        settings: NetworkSettings,
    ) -> Result<Self> {
        // reject malformed aliases before the first request
        let directory_url = provider.resolve(&server_uri)?;
        log::debug!("Session for {server_uri} uses directory {directory_url}");

        Ok(Self {
            inner: Arc::new(SessionInner {
                server_uri,
                provider,
                settings,
                user_agent: default_user_agent(),
                nonce: NonceStore::new(),
                directory: RwLock::new(None),
                validators: Mutex::new(Validators::default()),
                shared: OnceCell::new(),
            }),
        })
    }

    pub fn server_uri(&self) -> &Url {
        &self.inner.server_uri
    }

    pub fn provider(&self) -> &Arc<dyn AcmeProvider> {
        &self.inner.provider
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.inner.settings
    }

    pub fn nonce_store(&self) -> &NonceStore {
        &self.inner.nonce
    }

    /// Returns the directory, fetching it on first use.
    pub async fn directory(&self) -> Result<Arc<api::Directory>> {
        let cached = self.inner.directory.read().clone();

        match cached {
            Some(directory) => Ok(directory),
            None => self.refresh_directory().await,
        }
    }

    /// Fetches the directory again, keeping the cached one if the CA reports it unchanged.
    pub async fn refresh_directory(&self) -> Result<Arc<api::Directory>> {
        let fetched = self
            .inner
            .provider
            .directory(self, &self.inner.server_uri)
            .await?;

        if let Some(directory) = fetched {
            let directory = Arc::new(directory);
            *self.inner.directory.write() = Some(Arc::clone(&directory));
            return Ok(directory);
        }

        let cached = self.inner.directory.read().clone();
        cached.ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "directory of {} reported as unchanged before it was fetched",
                self.inner.server_uri
            ))
        })
    }

    /// Capabilities the CA advertises in its directory.
    pub async fn metadata(&self) -> Result<api::DirectoryMeta> {
        Ok(self.directory().await?.meta.clone().unwrap_or_default())
    }

    /// Returns the URL of `resource`.
    ///
    /// Fails with [`Error::CapabilityUnsupported`] if the CA does not offer it.
    pub async fn resource_url(&self, resource: Resource) -> Result<String> {
        self.resource_url_optional(resource)
            .await?
            .ok_or_else(|| Error::CapabilityUnsupported(format!("directory has no {resource}")))
    }

    /// Returns the URL of `resource`, or `None` if the CA does not offer it.
    pub async fn resource_url_optional(&self, resource: Resource) -> Result<Option<String>> {
        let dir = self.directory().await?;

        let url = match resource {
            Resource::NewNonce => Some(&dir.new_nonce),
            Resource::NewAccount => Some(&dir.new_account),
            Resource::NewOrder => Some(&dir.new_order),
            Resource::NewAuthz => dir.new_authz.as_ref(),
            Resource::RevokeCert => dir.revoke_cert.as_ref(),
            Resource::KeyChange => dir.key_change.as_ref(),
            Resource::RenewalInfo => dir.renewal_info.as_ref(),
        };

        Ok(url.cloned())
    }

    /// Returns the HTTP connector for the next operation.
    ///
    /// With client reuse enabled, all callers share one connector that is created on first use.
    /// Otherwise every call creates a new one.
    pub async fn connector(&self) -> Result<Arc<HttpConnector>> {
        if !self.inner.settings.is_client_reuse_enabled() {
            return self.create_connector().map(Arc::new);
        }

        let connector = self
            .inner
            .shared
            .get_or_try_init(|| async { self.create_connector().map(Arc::new) })
            .await?;

        Ok(Arc::clone(connector))
    }

    fn create_connector(&self) -> Result<HttpConnector> {
        let client = self
            .inner
            .provider
            .create_http_client(&self.inner.settings)?;

        log::trace!("Created HTTP client for {}", self.inner.server_uri);

        Ok(HttpConnector::new(
            self.inner.settings.clone(),
            client,
            self.inner.user_agent,
        ))
    }

    /// Opens a connection for one logical operation.
    pub async fn connect(&self) -> Result<Connection> {
        Ok(Connection::new(self.clone(), self.connector().await?))
    }

    pub(crate) fn directory_validators(&self) -> Validators {
        if self.inner.directory.read().is_none() {
            return Validators::default();
        }

        self.inner.validators.lock().clone()
    }

    pub(crate) fn set_directory_validators(&self, validators: Validators) {
        *self.inner.validators.lock() = validators;
    }

    /// Registers an account with a newly generated key.
    ///
    /// The key is an elliptic curve P-256 key. Export it with
    /// [`Account::acme_private_key_pem()`] to load the account later.
    pub async fn register_account(&self, contact: Option<Vec<String>>) -> Result<Account> {
        let acme_key = AcmeKey::new();
        self.upsert_account(acme_key, contact).await
    }

    /// Logs into an account with a key in PEM format, creating the account if needed.
    pub async fn load_account(
        &self,
        private_key_pem: &str,
        contact: Option<Vec<String>>,
    ) -> Result<Account> {
        let acme_key = AcmeKey::from_pem(private_key_pem)?;
        self.upsert_account(acme_key, contact).await
    }

    /// Logs into an existing account, failing if the CA does not know the key.
    pub async fn load_existing_account(&self, private_key_pem: &str) -> Result<Account> {
        let acme_key = AcmeKey::from_pem(private_key_pem)?;

        let acc = api::Account {
            only_return_existing: Some(true),
            ..Default::default()
        };

        self.new_account(acme_key, &acc).await
    }

    async fn upsert_account(
        &self,
        acme_key: AcmeKey,
        contact: Option<Vec<String>>,
    ) -> Result<Account> {
        // Prepare making a call to newAccount. This is fine to do both for new
        // keys and existing. For existing ones RFC 8555 §7.3.1 says to return a 200 with
        // the Location header set to the key ID (kid).
        let acc = api::Account {
            contact,
            terms_of_service_agreed: Some(true),
            ..Default::default()
        };

        self.new_account(acme_key, &acc).await
    }

    async fn new_account(&self, mut acme_key: AcmeKey, acc: &api::Account) -> Result<Account> {
        let url = self.resource_url(Resource::NewAccount).await?;

        let res = self
            .connect()
            .await?
            .send_signed_request(&url, acc, &acme_key)
            .await?;

        let kid = res.expect_location()?;
        log::debug!("Key ID is: {kid}");
        let api_account = res.json::<api::Account>()?;

        // fill in the server returned key ID
        acme_key.set_key_id(kid.clone());

        Ok(Account::new(self.clone(), acme_key, kid, api_account))
    }
}

fn parse_server_uri(server_uri: &str) -> Result<Url> {
    Url::parse(server_uri)
        .map_err(|err| Error::InvalidConfiguration(format!("bad server URI {server_uri}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::with_mock_ca;

    #[tokio::test]
    async fn fetch_directory_once() {
        let server = with_mock_ca();
        let session = Session::new(&server.dir_url).unwrap();

        let dir = session.directory().await.unwrap();
        assert_eq!(dir.new_nonce, format!("{}/acme/new-nonce", server.base));

        let again = session.directory().await.unwrap();
        assert!(Arc::ptr_eq(&dir, &again));
        assert_eq!(server.ca.directory_fetches(), 1);

        let meta = session.metadata().await.unwrap();
        assert_eq!(meta.caa_identities.as_deref().unwrap(), ["testdir.org"]);
        assert!(meta.is_profile_allowed());
    }

    #[tokio::test]
    async fn unchanged_directory_is_kept() {
        let server = with_mock_ca();
        let session = Session::new(&server.dir_url).unwrap();

        let dir = session.directory().await.unwrap();
        let refreshed = session.refresh_directory().await.unwrap();

        assert!(Arc::ptr_eq(&dir, &refreshed));
        assert_eq!(server.ca.directory_fetches(), 2);
        assert_eq!(server.ca.directory_not_modified(), 1);
    }

    #[tokio::test]
    async fn missing_resources() {
        let server = with_mock_ca();
        let session = Session::new(&server.minimal_dir_url).unwrap();

        assert!(session
            .resource_url_optional(Resource::RenewalInfo)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            session.resource_url(Resource::KeyChange).await,
            Err(Error::CapabilityUnsupported(_))
        ));
        assert!(session.resource_url(Resource::NewOrder).await.is_ok());
        assert!(!session.metadata().await.unwrap().is_auto_renewal_enabled());
    }

    #[tokio::test]
    async fn shared_connector_is_created_once() {
        let mut settings = NetworkSettings::new();
        settings.set_client_reuse_enabled(true);
        let session = Session::with_settings("https://example.com/dir", settings).unwrap();

        let tasks = (0..8)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.connector().await.unwrap() })
            })
            .collect::<Vec<_>>();

        let mut connectors = Vec::new();
        for task in tasks {
            connectors.push(task.await.unwrap());
        }

        assert!(connectors.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn connectors_are_not_shared_by_default() {
        let session = Session::new("https://example.com/dir").unwrap();

        let a = session.connector().await.unwrap();
        let b = session.connector().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.user_agent(), default_user_agent());
    }

    #[test]
    fn bad_server_uris() {
        assert!(matches!(
            Session::new("not a uri"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Session::new("ftp://example.com/dir"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Session::new("acme://letsencrypt.org/v3"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn register_and_reload_account() {
        let server = with_mock_ca();
        let session = Session::new(&server.dir_url).unwrap();

        let acc = session
            .register_account(Some(vec!["mailto:foo@bar.com".to_owned()]))
            .await
            .unwrap();
        assert_eq!(acc.location(), format!("{}/acme/acct/1", server.base));

        let pem = acc.acme_private_key_pem().unwrap();
        let existing = session.load_existing_account(&pem).await.unwrap();
        assert_eq!(existing.location(), acc.location());
        assert_eq!(server.ca.nonce_requests(), 1);
        assert_eq!(server.ca.rejected_nonces(), 0);
    }
}
