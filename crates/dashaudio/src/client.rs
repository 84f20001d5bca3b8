use std::sync::OnceLock;

use reqwest::Client;
use tracing::debug;

use crate::config::FetchConfig;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed a provider first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration.
///
/// `config.headers` are not installed as defaults: segment hosts must never
/// see the manifest API credentials.
pub fn create_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.concurrency.max(1))
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    client_builder.build()
}
