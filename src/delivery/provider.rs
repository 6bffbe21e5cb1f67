//! Email providers.
//!
//! [`EmailProvider`] is the seam between the batch sender and the outside
//! world. [`HttpEmailProvider`] talks to a transactional email API with a
//! bulk-send endpoint; [`SmtpEmailProvider`] relays each message of a batch
//! over a single SMTP session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mail_send::SmtpClientBuilder;
use mail_send::mail_builder::MessageBuilder;
use mail_send::mail_builder::headers::HeaderType;
use mail_send::mail_builder::headers::text::Text;
use mail_send::mail_builder::headers::url::URL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderSettings;
use crate::domain::{SendRequest, Tag};

/// A provider-level failure. Apart from [`ProviderError::Partial`], the
/// batch sender treats any of these as a failure of the whole batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The first `accepted.len()` requests went out before `source` stopped
    /// the batch. Only the rest may be retried.
    #[error("{} request(s) accepted before failure: {source}", .accepted.len())]
    Partial {
        accepted: Vec<Receipt>,
        source: Box<ProviderError>,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Response(String),

    #[error("smtp error: {0}")]
    Smtp(#[from] mail_send::Error),
}

impl ProviderError {
    /// Wraps `error` as [`ProviderError::Partial`] when some requests were
    /// already accepted.
    pub fn after(accepted: Vec<Receipt>, error: ProviderError) -> Self {
        if accepted.is_empty() {
            error
        } else {
            ProviderError::Partial {
                accepted,
                source: Box::new(error),
            }
        }
    }
}

/// Provider acknowledgement for one request, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub message_id: Option<String>,
}

/// Abstraction over bulk message delivery.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Sends every request in one provider call.
    ///
    /// On success there is one receipt per request. A provider that hands
    /// messages over one at a time returns [`ProviderError::Partial`] when
    /// it fails midway, so accepted requests are never sent twice.
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<Receipt>, ProviderError>;
}

/// Builds the provider named in the settings.
pub fn from_settings(settings: &ProviderSettings) -> Result<Arc<dyn EmailProvider>, ProviderError> {
    let provider: Arc<dyn EmailProvider> = match settings {
        ProviderSettings::Http { api_url, api_key } => {
            Arc::new(HttpEmailProvider::new(api_url, api_key)?)
        }
        ProviderSettings::Smtp {
            host,
            port,
            login,
            password,
            implicit_tls,
        } => Arc::new(SmtpEmailProvider {
            host: host.clone(),
            port: *port,
            login: login.clone(),
            password: password.clone(),
            implicit_tls: *implicit_tls,
        }),
    };
    Ok(provider)
}

#[derive(Serialize)]
struct HttpEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    headers: BTreeMap<&'a str, &'a str>,
    tags: &'a [Tag],
}

impl<'a> From<&'a SendRequest> for HttpEmail<'a> {
    fn from(request: &'a SendRequest) -> Self {
        HttpEmail {
            from: &request.from,
            to: [&request.to],
            reply_to: request.reply_to.as_deref(),
            subject: &request.subject,
            html: &request.html,
            text: &request.text,
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .collect(),
            tags: &request.tags,
        }
    }
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    data: Vec<BatchResponseItem>,
}

#[derive(Deserialize)]
struct BatchResponseItem {
    id: Option<String>,
}

/// Client for a JSON bulk-send API (`POST {api_url}/emails/batch`).
pub struct HttpEmailProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmailProvider {
    pub fn new(api_url: &str, api_key: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails/batch", api_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
        })
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<Receipt>, ProviderError> {
        let payload: Vec<HttpEmail<'_>> = requests.iter().map(HttpEmail::from).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        let mut ids = parsed.data.into_iter().map(|item| item.id);
        Ok(requests
            .iter()
            .map(|_| Receipt {
                message_id: ids.next().flatten(),
            })
            .collect())
    }
}

/// Splits `"Name <address>"` into its parts. A bare address has an empty name.
fn split_mailbox(mailbox: &str) -> (&str, &str) {
    match (mailbox.find('<'), mailbox.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            (mailbox[..open].trim(), mailbox[open + 1..close].trim())
        }
        _ => ("", mailbox.trim()),
    }
}

fn message_domain(address: &str) -> &str {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("localhost")
}

/// Builds an email message ready to be sent via SMTP.
#[must_use]
fn build_message<'a>(request: &'a SendRequest, message_id: String) -> MessageBuilder<'a> {
    let (sender_name, sender_address) = split_mailbox(&request.from);

    let mut message = MessageBuilder::new()
        .from((sender_name, sender_address))
        .to(vec![("", request.to.as_str())])
        .subject(request.subject.as_str())
        .html_body(request.html.as_str())
        .text_body(request.text.as_str())
        .message_id(message_id);

    if let Some(reply_to) = request.reply_to.as_deref() {
        message = message.reply_to(("", reply_to));
    }

    for (name, value) in &request.headers {
        let value = if name.eq_ignore_ascii_case("List-Unsubscribe") {
            HeaderType::from(URL::new(
                value.trim_start_matches('<').trim_end_matches('>'),
            ))
        } else {
            HeaderType::Text(Text::new(value.as_str()))
        };
        message = message.header(name.as_str(), value);
    }

    message
}

/// SMTP relay that leverages [`mail_send`].
pub struct SmtpEmailProvider {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub implicit_tls: bool,
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<Receipt>, ProviderError> {
        let mut client = SmtpClientBuilder::new(self.host.as_str(), self.port)
            .implicit_tls(self.implicit_tls)
            .credentials((self.login.as_str(), self.password.as_str()))
            .connect()
            .await?;

        let mut receipts = Vec::with_capacity(requests.len());
        for request in requests {
            let (_, sender_address) = split_mailbox(&request.from);
            let message_id = format!(
                "{}.{}@{}",
                request.user_id,
                Utc::now().timestamp_micros(),
                message_domain(sender_address)
            );
            if let Err(e) = client.send(build_message(request, message_id.clone())).await {
                return Err(ProviderError::after(receipts, e.into()));
            }
            receipts.push(Receipt {
                message_id: Some(message_id),
            });
        }

        if let Err(e) = client.quit().await {
            log::warn!("SMTP quit failed after batch: {e}");
        }

        Ok(receipts)
    }
}
