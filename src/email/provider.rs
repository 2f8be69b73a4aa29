//! Transactional email provider seam.
//!
//! `EmailService` owns retries and logging; a provider only performs one
//! delivery attempt and reports what the remote side said.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::services::OutgoingEmail;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub id: Option<String>,
}

/// One failed attempt; `body` is the provider's response payload when there was one.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub body: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            body: None,
        }
    }

    /// Message plus provider body, as written to the delivery log.
    pub fn detail(&self) -> String {
        match &self.body {
            Some(body) if !body.is_empty() => format!("{} - {}", self.message, body),
            _ => self.message.clone(),
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<ProviderReceipt, ProviderError>;
}

#[derive(Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

/// Resend HTTP API client.
pub struct ResendProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendProvider {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build resend http client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<ProviderReceipt, ProviderError> {
        let request = ResendRequest {
            from: &email.from,
            to: vec![email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            headers: email
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            attachments: email
                .attachments
                .iter()
                .map(|a| ResendAttachment {
                    filename: &a.filename,
                    content: Base64::encode_string(&a.content),
                    content_type: &a.content_type,
                })
                .collect(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("resend request failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError {
                message: format!("resend returned {status}"),
                body: Some(text),
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }
}

#[cfg(test)]
pub mod testing {
    //! Fake providers shared by unit and HTTP tests.

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use super::*;

    /// Accepts everything and remembers what it was asked to send.
    #[derive(Default)]
    pub struct RecordingProvider {
        sent: Mutex<Vec<OutgoingEmail>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingProvider {
        pub async fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().await.clone()
        }

        pub async fn fail_for(&self, to: &str) {
            self.failing.lock().await.insert(to.to_string());
        }

        /// Latest six-digit code mailed to `to`.
        pub async fn last_code_for(&self, to: &str) -> Option<String> {
            let re = regex::Regex::new(r">(\d{6})<").ok()?;
            self.sent
                .lock()
                .await
                .iter()
                .rev()
                .filter(|m| m.to == to)
                .find_map(|m| re.captures(&m.html).map(|c| c[1].to_string()))
        }
    }

    #[async_trait]
    impl EmailProvider for RecordingProvider {
        async fn deliver(&self, email: &OutgoingEmail) -> Result<ProviderReceipt, ProviderError> {
            if self.failing.lock().await.contains(&email.to) {
                return Err(ProviderError {
                    message: "mailbox unavailable".into(),
                    body: Some(r#"{"statusCode":422}"#.into()),
                });
            }
            let mut sent = self.sent.lock().await;
            sent.push(email.clone());
            Ok(ProviderReceipt {
                id: Some(format!("msg-{}", sent.len())),
            })
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    pub struct FlakyProvider {
        failures: usize,
        pub calls: AtomicUsize,
    }

    impl FlakyProvider {
        pub fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmailProvider for FlakyProvider {
        async fn deliver(&self, _email: &OutgoingEmail) -> Result<ProviderReceipt, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ProviderError {
                    message: format!("attempt {} failed", n + 1),
                    body: Some("rate_limit_exceeded".into()),
                })
            } else {
                Ok(ProviderReceipt {
                    id: Some("flaky-ok".into()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_appends_provider_body() {
        let err = ProviderError {
            message: "resend returned 422".into(),
            body: Some("invalid from".into()),
        };
        assert_eq!(err.detail(), "resend returned 422 - invalid from");
        assert_eq!(ProviderError::new("timeout").detail(), "timeout");
    }
}
