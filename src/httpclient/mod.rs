use crate::api::RegistrationError;
use crate::ves::{Channel, VesEndpoint};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

/// The `HttpClient` posts serialized VES events to the collector.
///
/// Properties:
///
/// * `client`: Shared reqwest client. Collectors in simulation setups commonly run with
/// self-signed certificates, so certificate validation is disabled.
/// * `timeout`: Upper bound for a single POST, after which the attempt counts as failed.
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<HttpClient, RegistrationError> {
        let client = ReqwestClient::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| RegistrationError::Config(format!("http client: {}", e)))?;

        Ok(HttpClient { client, timeout })
    }
}

#[async_trait]
impl Channel for HttpClient {
    async fn send(&self, endpoint: &VesEndpoint, body: Vec<u8>) -> Result<(), RegistrationError> {
        log::debug!(
            "Sending a post to [{}] with user [{}]",
            &endpoint.url,
            &endpoint.username
        );

        let mut request = self
            .client
            .post(endpoint.url.clone())
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .body(body);

        if !endpoint.username.is_empty() {
            request = request.basic_auth(&endpoint.username, Some(&endpoint.password));
        }

        match request.send().await {
            Ok(resp) => {
                if resp.status().is_success() {
                    log::debug!("Request successful");
                    Ok(())
                } else {
                    log::warn!("Request failure: {}", resp.status().as_str());
                    Err(RegistrationError::Transport(format!(
                        "collector answered {}",
                        resp.status()
                    )))
                }
            }
            Err(e) => {
                log::warn!("Request send failure: {}", e);
                Err(RegistrationError::Transport(e.to_string()))
            }
        }
    }
}
