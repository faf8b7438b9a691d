//! Mailing-list sign-up relay.

use std::time::Duration;

use anyhow::Context;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
struct UpstreamMember<'a> {
    email_address: &'a str,
    status: &'static str,
}

/// Cheap shape check: one `@`, a non-empty local part, a dotted domain and
/// no whitespace. Deliverability is the upstream's job.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

pub struct SubscribeRelay {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl SubscribeRelay {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building subscribe client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Forward one address and hand back the upstream status.
    pub async fn forward(&self, email: &str) -> StatusCode {
        let mut request = self.client.post(&self.endpoint).json(&UpstreamMember {
            email_address: email.trim(),
            status: "subscribed",
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => {
                let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
                if status.is_success() {
                    info!(%status, "subscriber forwarded");
                } else {
                    warn!(%status, "mailing-list upstream rejected subscriber");
                }
                status
            }
            Err(err) => {
                warn!(error = %err, "mailing-list upstream unreachable");
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
