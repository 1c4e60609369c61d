//! Instance metadata reader

use reqwest::Client;
use tracing::debug;

use crate::config::MetadataConfig;
use crate::types::NodeIdentity;

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "21600";

/// Fetches the node identity from the local metadata endpoint
///
/// Any failure yields `None`, meaning the process is not running on a
/// supported host.
#[derive(Debug, Clone)]
pub struct MetadataReader {
    config: MetadataConfig,
    client: Option<Client>,
}

impl MetadataReader {
    pub fn new(config: MetadataConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| debug!("metadata client unavailable: {}", e))
            .ok();
        Self { config, client }
    }

    /// Read the instance identity, or `None` when the environment is unsupported
    pub async fn read_identity(&self) -> Option<NodeIdentity> {
        let client = self.client.as_ref()?;
        let token = self.session_token(client).await;

        let mut request = client.get(&self.config.url);
        if let Some(token) = &token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %self.config.url, "metadata endpoint unreachable: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "metadata endpoint refused identity request");
            return None;
        }
        match response.text().await {
            Ok(body) => parse_identity(&body),
            Err(e) => {
                debug!("metadata body unreadable: {}", e);
                None
            }
        }
    }

    async fn session_token(&self, client: &Client) -> Option<String> {
        let url = self.config.token_url.as_ref()?;
        let response = client
            .put(url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await
            .map_err(|e| debug!("metadata token request failed: {}", e))
            .ok()?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "metadata token refused");
            return None;
        }
        response.text().await.ok().and_then(|t| {
            let t = t.trim();
            (!t.is_empty()).then(|| t.to_string())
        })
    }
}

fn parse_identity(body: &str) -> Option<NodeIdentity> {
    let id = body.trim();
    if id.is_empty() {
        debug!("metadata endpoint returned an empty identity");
        None
    } else {
        Some(NodeIdentity::new(id))
    }
}
