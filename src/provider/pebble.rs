use std::path::PathBuf;

use url::Url;

use super::{is_alias_for, parse_url, AcmeProvider};
#[cfg(any(feature = "rustls-tls", feature = "native-tls"))]
use crate::connector::client_builder;
use crate::{
    error::{Error, Result},
    settings::NetworkSettings,
};

/// Environment variable naming the Pebble root certificate file.
pub const PEBBLE_MINICA_PEM_ENV: &str = "PEBBLE_MINICA_PEM";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 14000;

/// [Pebble], the ACME test server.
///
/// - `acme://pebble` is `https://localhost:14000/dir`.
/// - `acme://pebble:14001` changes the port.
/// - `acme://pebble/pebble.example.com` or `acme://pebble/pebble.example.com:14001` changes the
///   host, and optionally the port.
///
/// Pebble serves its API with a certificate from its own test CA. The root certificate is read
/// from the first readable file of: `$PEBBLE_MINICA_PEM`, `pebble.minica.pem` in the working
/// directory, and `/etc/pebble/pebble.minica.pem`.
///
/// [Pebble]: https://github.com/letsencrypt/pebble
#[derive(Debug, Clone)]
pub struct PebbleProvider {
    trust_anchors: Vec<PathBuf>,
}

impl PebbleProvider {
    pub fn new() -> Self {
        let mut trust_anchors = Vec::new();

        if let Some(path) = std::env::var_os(PEBBLE_MINICA_PEM_ENV) {
            trust_anchors.push(PathBuf::from(path));
        }

        trust_anchors.push(PathBuf::from("pebble.minica.pem"));
        trust_anchors.push(PathBuf::from("/etc/pebble/pebble.minica.pem"));

        Self::with_trust_anchors(trust_anchors)
    }

    /// Uses the first loadable file of `trust_anchors` as root certificate.
    pub fn with_trust_anchors(trust_anchors: Vec<PathBuf>) -> Self {
        Self { trust_anchors }
    }

    pub fn trust_anchors(&self) -> &[PathBuf] {
        &self.trust_anchors
    }

    /// Reads the root certificates of the first candidate file that holds any.
    fn load_trust_anchor(&self) -> Result<Vec<Vec<u8>>> {
        for path in &self.trust_anchors {
            let pem = match std::fs::read(path) {
                Ok(pem) => pem,
                Err(err) => {
                    log::warn!("Cannot read Pebble root certificate {}: {err}", path.display());
                    continue;
                }
            };

            let certs = rustls_pemfile::certs(&mut pem.as_slice())
                .map(|res| res.map(|cert| cert.to_vec()))
                .collect::<Result<Vec<_>, _>>();

            match certs {
                Ok(certs) if !certs.is_empty() => {
                    log::debug!("Using Pebble root certificate {}", path.display());
                    return Ok(certs);
                }
                Ok(_) => log::warn!("No certificate in {}", path.display()),
                Err(err) => log::warn!("Bad Pebble root certificate {}: {err}", path.display()),
            }
        }

        Err(Error::InvalidConfiguration(format!(
            "no Pebble root certificate found in {:?}",
            self.trust_anchors
        )))
    }
}

impl Default for PebbleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AcmeProvider for PebbleProvider {
    fn accepts(&self, server_uri: &Url) -> bool {
        is_alias_for(server_uri, "pebble")
    }

    fn resolve(&self, server_uri: &Url) -> Result<Url> {
        let path = server_uri.path();

        if path.is_empty() || path == "/" {
            let port = server_uri.port().unwrap_or(DEFAULT_PORT);
            return parse_url(&format!("https://{DEFAULT_HOST}:{port}/dir"));
        }

        let (host, port) = parse_host_port(path)?;
        parse_url(&format!("https://{host}:{port}/dir"))
    }

    #[cfg(any(feature = "rustls-tls", feature = "native-tls"))]
    fn create_http_client(&self, settings: &NetworkSettings) -> Result<reqwest::Client> {
        let mut builder = client_builder(settings)?.tls_built_in_root_certs(false);

        for der in self.load_trust_anchor()? {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(&der)?);
        }

        Ok(builder.build()?)
    }

    #[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
    fn create_http_client(&self, _settings: &NetworkSettings) -> Result<reqwest::Client> {
        self.load_trust_anchor()?;

        Err(Error::InvalidConfiguration(
            "Pebble needs a TLS backend, enable the rustls-tls or native-tls feature".to_owned(),
        ))
    }
}

/// Parses a `/host[:port][/]` alias path.
fn parse_host_port(path: &str) -> Result<(&str, u16)> {
    let invalid = || Error::InvalidConfiguration(format!("invalid Pebble host {path}"));

    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    let (host, port) = match rest.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
    };

    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }

    let port = match port {
        None => DEFAULT_PORT,
        Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            port.parse().map_err(|_| invalid())?
        }
        Some(_) => return Err(invalid()),
    };

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;

    fn resolve(uri: &str) -> Result<String> {
        PebbleProvider::with_trust_anchors(Vec::new())
            .resolve(&Url::parse(uri).unwrap())
            .map(String::from)
    }

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("acme-engine-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn default_alias() {
        assert_eq!(resolve("acme://pebble").unwrap(), "https://localhost:14000/dir");
        assert_eq!(resolve("acme://pebble/").unwrap(), "https://localhost:14000/dir");
    }

    #[test]
    fn alias_with_port() {
        assert_eq!(resolve("acme://pebble:14001").unwrap(), "https://localhost:14001/dir");
    }

    #[test]
    fn alias_with_host() {
        assert_eq!(
            resolve("acme://pebble/pebble.example.com").unwrap(),
            "https://pebble.example.com:14000/dir"
        );
        assert_eq!(
            resolve("acme://pebble/pebble.example.com:4433/").unwrap(),
            "https://pebble.example.com:4433/dir"
        );
    }

    #[test]
    fn malformed_aliases() {
        for uri in [
            "acme://pebble/host:port",
            "acme://pebble/host:",
            "acme://pebble/host/dir",
            "acme://pebble/host:99999",
        ] {
            assert!(
                matches!(resolve(uri), Err(Error::InvalidConfiguration(_))),
                "{uri} should be rejected"
            );
        }

        assert!(matches!(
            crate::Session::new("acme://pebble:abc"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn first_loadable_trust_anchor_wins() {
        let root = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let garbage = temp_file("garbage.pem", b"not a certificate");
        let valid = temp_file("minica.pem", root.cert.pem().as_bytes());

        let provider = PebbleProvider::with_trust_anchors(vec![
            Path::new("/nonexistent/pebble.minica.pem").to_owned(),
            garbage.clone(),
            valid.clone(),
        ]);

        let certs = provider.load_trust_anchor().unwrap();
        assert_eq!(certs, [root.cert.der().to_vec()]);
        assert!(provider.create_http_client(&NetworkSettings::new()).is_ok());

        fs::remove_file(garbage).unwrap();
        fs::remove_file(valid).unwrap();
    }

    #[test]
    fn no_trust_anchor_is_fatal() {
        let provider = PebbleProvider::with_trust_anchors(vec![
            Path::new("/nonexistent/a.pem").to_owned(),
            Path::new("/nonexistent/b.pem").to_owned(),
        ]);

        assert!(matches!(
            provider.create_http_client(&NetworkSettings::new()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn env_candidate_comes_first() {
        let provider = PebbleProvider::new();
        let anchors = provider.trust_anchors();

        assert_eq!(
            anchors.last().unwrap(),
            Path::new("/etc/pebble/pebble.minica.pem")
        );
        assert!(anchors.contains(&PathBuf::from("pebble.minica.pem")));
    }
}
