use std::sync::OnceLock;

use reqwest::{header::USER_AGENT, redirect, Method};

use crate::{error::Result, settings::NetworkSettings};

static DEFAULT_USER_AGENT: OnceLock<String> = OnceLock::new();

/// Returns the user agent sent with every request.
pub fn default_user_agent() -> &'static str {
    DEFAULT_USER_AGENT.get_or_init(|| {
        format!(
            "{}/{} Rust",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    })
}

/// Prepares a client builder from the network settings.
///
/// Providers that need a custom trust store start from this builder so the caller's proxy,
/// timeout and compression settings still apply.
pub fn client_builder(settings: &NetworkSettings) -> Result<reqwest::ClientBuilder> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.timeout())
        .timeout(settings.timeout())
        .gzip(settings.is_compression_enabled())
        .redirect(redirect::Policy::none());

    builder = match settings.proxy() {
        Some(proxy_url) => {
            let mut proxy = reqwest::Proxy::all(proxy_url.clone())?;

            if let Some(credentials) = settings.credentials() {
                proxy = proxy.basic_auth(credentials.username(), credentials.password());
            }

            builder.proxy(proxy)
        }

        None => builder.no_proxy(),
    };

    Ok(builder)
}

/// A configured HTTP client.
///
/// Depending on [`NetworkSettings::is_client_reuse_enabled()`], a connector is either created for
/// each logical operation or shared by all operations of a session.
#[derive(Debug)]
pub struct HttpConnector {
    settings: NetworkSettings,
    client: reqwest::Client,
    user_agent: &'static str,
}

impl HttpConnector {
    pub fn new(settings: NetworkSettings, client: reqwest::Client, user_agent: &'static str) -> Self {
        Self {
            settings,
            client,
            user_agent,
        }
    }

    /// Starts a request that carries the user agent and the configured timeout.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(USER_AGENT, self.user_agent)
            .timeout(self.settings.timeout())
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    pub fn user_agent(&self) -> &'static str {
        self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::settings::ProxyCredentials;

    #[test]
    fn user_agent_names_crate_and_version() {
        let agent = default_user_agent();
        assert!(agent.starts_with("acme-engine/"));
        assert!(agent.contains(env!("CARGO_PKG_VERSION")));
        assert!(std::ptr::eq(agent, default_user_agent()));
    }

    #[test]
    fn request_carries_agent_and_timeout() {
        let mut settings = NetworkSettings::new();
        settings.set_timeout(Duration::from_secs(7)).unwrap();

        let client = client_builder(&settings).unwrap().build().unwrap();
        let connector = HttpConnector::new(settings, client, default_user_agent());

        let req = connector
            .request(Method::GET, "https://example.com/acme/directory")
            .build()
            .unwrap();

        assert_eq!(
            req.headers().get(USER_AGENT).unwrap(),
            default_user_agent()
        );
        assert_eq!(req.timeout(), Some(&Duration::from_secs(7)));
    }

    #[test]
    fn proxy_settings_build() {
        let mut settings = NetworkSettings::new();
        settings.set_proxy(Some("http://198.51.100.1:8080".parse().unwrap()));
        settings.set_credentials(Some(ProxyCredentials::new("user", "pass")));

        client_builder(&settings).unwrap().build().unwrap();
    }
}
