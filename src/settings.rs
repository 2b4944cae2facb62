use std::{env, fmt, time::Duration};

use url::Url;

use crate::error::{Error, Result};

/// Environment variable that switches response compression off when set to anything but `true`.
pub const COMPRESSION_ENV: &str = "ACME_GZIP_COMPRESSION";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Network settings for the connection to the ACME server.
///
/// Settings compare and hash by value, so they can serve as a cache key for configured transports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkSettings {
    proxy: Option<Url>,
    timeout: Duration,
    credentials: Option<ProxyCredentials>,
    compression: bool,
    client_reuse: bool,
}

impl NetworkSettings {
    /// Creates settings with defaults.
    ///
    /// No proxy, a 30 second timeout, no proxy credentials, no client reuse. Compression is
    /// enabled unless the [`COMPRESSION_ENV`] environment variable says otherwise.
    pub fn new() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            credentials: None,
            compression: compression_from_env(env::var(COMPRESSION_ENV).ok().as_deref()),
            client_reuse: false,
        }
    }

    /// Proxy that all requests are routed through, if any.
    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// Routes all requests through `proxy`. `None` connects directly.
    pub fn set_proxy(&mut self, proxy: Option<Url>) {
        self.proxy = proxy;
    }

    /// Timeout of a single network request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the timeout of a single network request.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if `timeout` is zero.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "timeout must be positive".to_owned(),
            ));
        }

        self.timeout = timeout;
        Ok(())
    }

    /// Credentials presented to the proxy.
    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Option<ProxyCredentials>) {
        self.credentials = credentials;
    }

    /// Whether responses may be gzip compressed.
    pub fn is_compression_enabled(&self) -> bool {
        self.compression
    }

    pub fn set_compression_enabled(&mut self, compression: bool) {
        self.compression = compression;
    }

    /// Whether a session shares one HTTP client across all of its requests.
    ///
    /// Disabled by default, in which case each logical operation gets its own client.
    pub fn is_client_reuse_enabled(&self) -> bool {
        self.client_reuse
    }

    pub fn set_client_reuse_enabled(&mut self, client_reuse: bool) {
        self.client_reuse = client_reuse;
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Username and password for proxy basic authentication.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyCredentials {
    username: String,
    password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Unset means enabled, otherwise only a case-insensitive `true` enables compression.
fn compression_from_env(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(value) => value.trim().eq_ignore_ascii_case("true"),
    }
}
