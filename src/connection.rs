//! Signed requests against the ACME API.

use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{self, HeaderMap},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

use crate::{
    acc::AcmeKey,
    api::{self, Problem},
    connector::HttpConnector,
    error::{Error, Result},
    jws,
    session::{Resource, Session, Validators},
    util::is_base64url,
};

const REPLAY_NONCE: &str = "replay-nonce";
const JOSE_JSON: &str = "application/jose+json";
const PROBLEM_JSON: &str = "application/problem+json";

/// A connection to the ACME server of a session.
///
/// Signed requests consume the session's replay nonce and store the one returned by the CA
/// before the next request may sign.
#[derive(Debug)]
pub struct Connection {
    session: Session,
    connector: Arc<HttpConnector>,
}

impl Connection {
    pub(crate) fn new(session: Session, connector: Arc<HttpConnector>) -> Self {
        Self { session, connector }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connector(&self) -> &Arc<HttpConnector> {
        &self.connector
    }

    /// Fetches a fresh nonce from the CA and stores it in the session.
    pub async fn reset_nonce(&self) -> Result<()> {
        let nonce_url = self.session.resource_url(Resource::NewNonce).await?;
        let mut holder = self.session.nonce_store().lock().await;
        let nonce = self.fetch_nonce(&nonce_url).await?;
        holder.set_nonce(Some(nonce));
        Ok(())
    }

    /// Sends an unsigned GET request.
    pub async fn send_request(&self, url: &str) -> Result<Response> {
        log::debug!("GET {url}");
        let res = self.connector.request(Method::GET, url).send().await?;
        Response::read(url, res).await?.error_for_status()
    }

    /// Fetches a directory, revalidating against the validators of the previous fetch.
    ///
    /// Returns `None` if the CA answered that the directory has not changed.
    pub(crate) async fn send_directory_request(
        &self,
        url: &str,
        validators: &Validators,
    ) -> Result<Option<Response>> {
        log::debug!("GET {url}");

        let mut req = self.connector.request(Method::GET, url);
        if let Some(etag) = &validators.etag {
            req = req.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            req = req.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let res = Response::read(url, req.send().await?).await?;

        if res.status() == StatusCode::NOT_MODIFIED {
            log::debug!("Directory {url} not modified");
            return Ok(None);
        }

        res.error_for_status().map(Some)
    }

    /// Sends `claims` signed with `key`.
    ///
    /// A rejected nonce is retried exactly once with a fresh nonce.
    pub(crate) async fn send_signed_request<T>(
        &self,
        url: &str,
        claims: &T,
        key: &AcmeKey,
    ) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        self.send_signed(url, Some(claims), key).await
    }

    /// Sends a POST-as-GET request signed with `key`.
    ///
    /// See [RFC 8555 §6.3](https://datatracker.ietf.org/doc/html/rfc8555#section-6.3).
    pub(crate) async fn send_signed_post_as_get(
        &self,
        url: &str,
        key: &AcmeKey,
    ) -> Result<Response> {
        self.send_signed::<()>(url, None, key).await
    }

    async fn send_signed<T>(&self, url: &str, claims: Option<&T>, key: &AcmeKey) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        // resolved before locking, the directory fetch does not use a nonce
        let nonce_url = self.session.resource_url(Resource::NewNonce).await?;

        let mut holder = self.session.nonce_store().lock().await;
        let mut retried = false;

        loop {
            let nonce = match holder.take() {
                Some(nonce) => nonce,
                None => self.fetch_nonce(&nonce_url).await?,
            };

            let body = jws::sign(url, nonce, key, claims)?;

            log::debug!("Call endpoint: {url}");

            let res = self
                .connector
                .request(Method::POST, url)
                .header(header::CONTENT_TYPE, JOSE_JSON)
                .body(body)
                .send()
                .await?;

            let res = Response::read(url, res).await?;

            // Regardless of the request being a success or not, there might be a nonce in the
            // response.
            holder.set_nonce(res.replay_nonce());

            match res.error_for_status() {
                Err(err) if err.is_bad_nonce() && !retried => {
                    log::debug!("Retrying on bad nonce");
                    retried = true;
                }
                result => return result,
            }
        }
    }

    async fn fetch_nonce(&self, nonce_url: &str) -> Result<String> {
        log::debug!("Request new nonce");

        let res = self.connector.request(Method::HEAD, nonce_url).send().await?;
        let res = Response::read(nonce_url, res).await?.error_for_status()?;

        res.replay_nonce().ok_or_else(|| {
            Error::ProtocolViolation(format!("{nonce_url} did not return a replay nonce"))
        })
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    async fn read(url: &str, res: reqwest::Response) -> Result<Self> {
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.bytes().await?.to_vec();

        Ok(Self {
            url: url.to_owned(),
            status,
            headers,
            body,
        })
    }

    /// URL the request was sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Media type of the body, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The `Location` header, resolved against the request URL.
    pub fn location(&self) -> Option<String> {
        let location = self.header(header::LOCATION.as_str())?;

        match url::Url::parse(&self.url).and_then(|base| base.join(location)) {
            Ok(url) => Some(url.to_string()),
            Err(_) => Some(location.to_owned()),
        }
    }

    /// The `Location` header, failing if the CA did not send one.
    pub fn expect_location(&self) -> Result<String> {
        self.location().ok_or_else(|| {
            Error::ProtocolViolation(format!("{} did not return a Location header", self.url))
        })
    }

    /// The replay nonce, if present and well formed.
    pub fn replay_nonce(&self) -> Option<String> {
        let nonce = self.header(REPLAY_NONCE)?;

        if !is_base64url(nonce) {
            log::warn!("Ignoring malformed replay nonce from {}", self.url);
            return None;
        }

        Some(nonce.to_owned())
    }

    /// How long the CA asks to wait before the next request, if it says so.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.header(header::RETRY_AFTER.as_str())?;
        parse_retry_after(value, OffsetDateTime::now_utc())
    }

    pub(crate) fn validators(&self) -> Validators {
        Validators {
            etag: self.header(header::ETAG.as_str()).map(ToOwned::to_owned),
            last_modified: self
                .header(header::LAST_MODIFIED.as_str())
                .map(ToOwned::to_owned),
        }
    }

    /// Turns non-success responses into [`Error::Server`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }

        Err(Error::Server {
            url: self.url.clone(),
            problem: self.problem(),
        })
    }

    fn problem(&self) -> Problem {
        let status = Some(self.status.as_u16());

        if self.content_type() == Some(PROBLEM_JSON) {
            // if we were sent a problem+json, deserialize it
            match serde_json::from_slice::<Problem>(&self.body) {
                Ok(mut problem) => {
                    problem.status = problem.status.or(status);
                    problem
                }
                Err(err) => Problem {
                    _type: "problemJsonFail".to_owned(),
                    detail: Some(format!(
                        "Failed to deserialize application/problem+json ({err}) body: {}",
                        self.text()
                    )),
                    status,
                    subproblems: None,
                },
            }
        } else {
            // some other problem
            api::Problem {
                _type: "httpReqError".to_owned(),
                detail: Some(format!("{} body: {}", self.status, self.text())),
                status,
                subproblems: None,
            }
        }
    }
}

/// Parses a `Retry-After` value, either delta-seconds or an HTTP date.
fn parse_retry_after(value: &str, now: OffsetDateTime) -> Option<Duration> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let at = PrimitiveDateTime::parse(value, format).ok()?.assume_utc();

    Some(Duration::try_from(at - now).unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn response(status: u16, headers: &[(&'static str, &'static str)], body: &str) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, value.parse().unwrap());
        }

        Response {
            url: "https://example.com/acme/new-order".to_owned(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn retry_after_formats() {
        let now = datetime!(2015-10-21 7:28 UTC);

        assert_eq!(
            parse_retry_after("120", now),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:30:00 GMT", now),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn problem_document_becomes_server_error() {
        let res = response(
            400,
            &[("content-type", "application/problem+json; charset=utf-8")],
            r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"stale"}"#,
        );

        let err = res.error_for_status().unwrap_err();
        assert!(err.is_bad_nonce());

        let problem = err.problem().unwrap();
        assert_eq!(problem.detail.as_deref(), Some("stale"));
        assert_eq!(problem.status, Some(400));
    }

    #[test]
    fn other_errors_keep_body() {
        let res = response(502, &[("content-type", "text/html")], "<h1>Bad Gateway</h1>");

        match res.error_for_status() {
            Err(Error::Server { url, problem }) => {
                assert_eq!(url, "https://example.com/acme/new-order");
                assert_eq!(problem._type, "httpReqError");
                assert_eq!(problem.status, Some(502));
                assert!(problem.detail.unwrap().contains("Bad Gateway"));
            }
            res => panic!("unexpected {res:?}"),
        }
    }

    #[test]
    fn malformed_nonce_is_ignored() {
        let res = response(200, &[("replay-nonce", "abc+def=")], "");
        assert!(res.replay_nonce().is_none());

        let res = response(200, &[("replay-nonce", "oFvnlFP1wIhRlYS2jTaXbA")], "");
        assert_eq!(res.replay_nonce().as_deref(), Some("oFvnlFP1wIhRlYS2jTaXbA"));
    }

    #[test]
    fn relative_location_is_resolved() {
        let res = response(201, &[("location", "/acme/order/1")], "");
        assert_eq!(
            res.location().as_deref(),
            Some("https://example.com/acme/order/1")
        );

        let res = response(201, &[], "");
        assert!(matches!(
            res.expect_location(),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
