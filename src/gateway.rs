//! HTTP client for the WhatsApp gateway's send endpoint.
//!
//! The gateway's connection and session management (QR pairing, instance
//! lifecycle) is its own concern; this client only posts rendered messages
//! and interprets the response.

use std::time::Duration;

use serde::Deserialize;

use crate::dispatcher::{SendOutcome, Sender};

pub struct HttpSender {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize, Default)]
struct GatewayResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpSender {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
        })
    }
}

#[async_trait::async_trait]
impl Sender for HttpSender {
    async fn send(&self, recipient_phone: &str, body: &str) -> eyre::Result<SendOutcome> {
        let mut request = self
            .http
            .post(format!("{}/send", self.base_url))
            .json(&serde_json::json!({
                "phone": recipient_phone,
                "message": body,
            }));

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let parsed: GatewayResponse = response.json().await.unwrap_or_default();

            // Some gateways report delivery errors in a 200 body.
            match parsed.error {
                Some(error) => Ok(SendOutcome {
                    success: false,
                    message_id: None,
                    error: Some(error),
                }),
                None => Ok(SendOutcome {
                    success: true,
                    message_id: parsed.message_id,
                    error: None,
                }),
            }
        } else {
            let detail = match response.text().await {
                Ok(text) if !text.is_empty() => text,
                _ => format!("gateway returned {status}"),
            };

            Ok(SendOutcome {
                success: false,
                message_id: None,
                error: Some(detail),
            })
        }
    }
}
