//! Transaction engine for ACME (Automatic Certificate Management Environment) clients.
//!
//! It follows [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) and drives the protocol
//! below a certificate management tool: directory discovery, replay nonces, JWS signed requests,
//! the account, order, authorization and challenge resources, and polling them to a final status.
//!
//! Extensions supported on top of RFC 8555:
//!
//! - `dns-persist-01` challenges, see [`challenge::DnsPersist01`].
//! - Auto-renewal orders ([RFC 8739](https://datatracker.ietf.org/doc/html/rfc8739)).
//! - Certificate profiles and replacement orders
//!   ([RFC 9773](https://datatracker.ietf.org/doc/html/rfc9773)).
//! - Subdomain authorizations ([RFC 9444](https://datatracker.ietf.org/doc/html/rfc9444)).
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use acme::{
//!     challenge::{DnsPersist01, TypedChallenge as _},
//!     create_p256_key, RetryPolicy, Session,
//! };
//!
//! async fn issue() -> acme::Result<()> {
//!     let session = Session::new("acme://letsencrypt.org/staging")?;
//!     let account = session
//!         .register_account(Some(vec!["mailto:cert-admin@example.org".to_owned()]))
//!         .await?;
//!
//!     let order = account.new_order().domain("example.org")?.create().await?;
//!     let policy = RetryPolicy::new(Duration::from_secs(300));
//!
//!     for auth in order.authorizations().await? {
//!         if !auth.need_challenge() {
//!             continue;
//!         }
//!
//!         let challenge = auth.find_challenge::<DnsPersist01>()?.unwrap();
//!         // publish the TXT record, then:
//!         challenge.challenge().wait_for_completion(&policy).await?;
//!     }
//!
//!     order.wait_until_ready(&policy).await?;
//!
//!     let key = create_p256_key();
//!     order.finalize(&key).await?;
//!     order.wait_for_completion(&policy).await?;
//!
//!     let cert = order.download_certificate(&key).await?;
//!     println!("{}", cert.certificate());
//!     Ok(())
//! }
//! ```
//!
//! A complete program is provided in `demos/dns-persist-01.rs` of this crate, run it with
//! `cargo run --example dns-persist-01`.
//!
//! # Providers
//!
//! The server URI of a [`Session`] is either the directory URL of a CA or an alias handled by one
//! of the [`provider`]s:
//!
//! - `acme://letsencrypt.org` and `acme://letsencrypt.org/staging`
//! - `acme://ssl.com/ecc`, `acme://ssl.com/rsa` and their `/staging` variants
//! - `acme://pebble` and `acme://pebble/<host>:<port>` for local testing
//!
//! # Domain Ownership
//!
//! Each identifier of an order has to be authorized by fulfilling one of the challenges of its
//! [`Authorization`](order::Authorization). The CA decides which challenge types are offered and
//! may skip the authorization if control was proven recently.
//!
//! # Rate Limits
//!
//! Public CAs use [rate limits] to ensure the API is not being abused. It might be tempting to
//! make the [`RetryPolicy`] delays really short, but balance this against the real risk of having
//! access cut off. Use staging environments for development.
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acc;
mod cert;
mod connection;
mod connector;
mod error;
mod jws;
mod nonce;
mod poll;
mod session;
mod settings;
mod util;

pub mod api;
pub mod challenge;
pub mod order;
pub mod provider;


pub use crate::{
    acc::Account,
    cert::{create_p256_key, Certificate},
    connection::{Connection, Response},
    connector::{client_builder, default_user_agent, HttpConnector},
    error::{Error, Result},
    nonce::{NonceHolder, NonceStore},
    poll::{RetryPolicy, Status},
    session::{Resource, Session},
    settings::{NetworkSettings, ProxyCredentials, COMPRESSION_ENV},
};
