use std::{env, io, time::Duration};

use acme::{
    challenge::{DnsPersist01, TypedChallenge as _},
    create_p256_key, RetryPolicy, Session,
};

const PRIMARY_NAME: &str = "example.org";

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Use `acme://letsencrypt.org` for production uses.
    let server_uri =
        env::var("ACME_SERVER").unwrap_or_else(|_| "acme://letsencrypt.org/staging".to_owned());

    // The session resolves the alias to the CA's directory.
    let session = Session::new(&server_uri)?;

    // Your contact addresses, note the `mailto:`
    let contact = vec!["mailto:foo@bar.com".to_owned()];

    // Generate a private key and register an account with your ACME provider.
    // You should write it to disk and use `load_account` afterwards.
    let acc = session.register_account(Some(contact.clone())).await?;

    // Example of how to load an account from string:
    let private_key_pem = acc.acme_private_key_pem()?;
    let acc = session.load_account(&private_key_pem, Some(contact)).await?;

    // Order a new TLS certificate for a domain.
    let order = acc.new_order().domain(PRIMARY_NAME)?.create().await?;

    let policy = RetryPolicy::new(Duration::from_secs(300));

    // If the ownership of the domain(s) have already been
    // authorized in a previous order, you might be able to
    // skip validation. The ACME API provider decides.
    for auth in order.authorizations().await? {
        if !auth.need_challenge() {
            continue;
        }

        let identifier = auth.identifier();

        let challenge = auth.find_challenge::<DnsPersist01>()?.ok_or_else(|| {
            eyre::eyre!("CA does not offer dns-persist-01 for {}", identifier.value)
        })?;

        // The record names the CA and the account. Unlike dns-01, it
        // can stay in place and serves all future orders of the account.
        let issuer = challenge
            .issuer_domain_names()?
            .into_iter()
            .next()
            .ok_or_else(|| eyre::eyre!("challenge lists no issuer"))?;

        println!(
            "{} IN TXT \"{}\"",
            challenge.rr_name(&identifier)?,
            challenge.build_record_value(&issuer)?,
        );
        println!("Press enter once the record is published.");
        io::stdin().read_line(&mut String::new())?;

        // Tell the CA to start checking the record, then wait
        // for the authorization to become valid or invalid.
        challenge.trigger().await?;
        let status = auth.wait_for_completion(&policy).await?;
        log::info!("Authorization for {}: {status}", identifier.value);
    }

    order.wait_until_ready(&policy).await?;

    // Ownership is proven. Create a private key for
    // the certificate. These are provided for convenience, you
    // can provide your own keypair instead if you want.
    let signing_key = create_p256_key();

    // Submit the CSR. This causes the ACME provider to enter a
    // state of "processing" that must be polled until the
    // certificate is either issued or rejected.
    order.finalize(&signing_key).await?;
    order.wait_for_completion(&policy).await?;

    // Finally download the certificate.
    let cert = order.download_certificate(&signing_key).await?;
    println!("{}", cert.certificate());

    Ok(())
}
