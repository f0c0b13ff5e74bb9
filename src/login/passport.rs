// Passport API client - the two-endpoint QR login exchange
//
// GET generate            -> {code, message, data: {url, qrcode_key}}
// GET poll?qrcode_key=KEY -> {code, message, data: {code, message}}
//
// The client keeps a cookie jar for the whole attempt; the login cookies are
// set on the successful poll response and read back from the jar.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;

use super::errors::LoginError;
use super::models::{
    LoginTicket, PollOutcome, CODE_EXPIRED, CODE_NOT_SCANNED, CODE_SCANNED_UNCONFIRMED,
    CODE_SUCCESS,
};
use crate::config::LoginConfig;
use crate::credentials::CredentialBundle;

/// The login HTTP API as seen by the login controller
#[async_trait]
pub trait LoginApi: Send + Sync {
    /// Request a fresh login ticket
    async fn generate_ticket(&self) -> Result<LoginTicket, LoginError>;

    /// Poll the ticket's status once
    async fn poll(&self, ticket_key: &str) -> Result<PollOutcome, LoginError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    url: String,
    qrcode_key: String,
}

#[derive(Debug, Deserialize)]
struct PollData {
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct PassportClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    generate_url: Url,
    poll_url: Url,
    cookie_url: Url,
}

impl PassportClient {
    pub fn new(config: &LoginConfig) -> Result<Self, LoginError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| LoginError::Network(format!("invalid URL {}: {}", raw, e)))
        };
        let generate_url = parse(&config.generate_url)?;
        let poll_url = parse(&config.poll_url)?;
        let cookie_url = parse(&config.cookie_url)?;

        let mut headers = HeaderMap::new();
        let header = |v: &str| {
            HeaderValue::from_str(v).map_err(|e| LoginError::Network(format!("invalid header: {}", e)))
        };
        headers.insert(USER_AGENT, header(&config.user_agent)?);
        headers.insert(REFERER, header(&config.referer)?);

        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .timeout(config.request_timeout());

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| LoginError::Network(format!("invalid proxy {}: {}", proxy_url, e)))?;
            tracing::info!(proxy = proxy_url, "[Passport] Using proxy");
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| LoginError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            jar,
            generate_url,
            poll_url,
            cookie_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, LoginError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::Network(format!("HTTP {}", status)));
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| LoginError::Protocol(format!("unexpected response: {}", e)))
    }

    /// Cookies accumulated during this attempt, for the API host and the site
    fn credentials(&self) -> CredentialBundle {
        let mut bundle = CredentialBundle::new();
        for url in [&self.poll_url, &self.cookie_url] {
            if let Some(header) = self.jar.cookies(url) {
                if let Ok(text) = header.to_str() {
                    bundle.extend_from_header(text);
                }
            }
        }
        bundle
    }
}

#[async_trait]
impl LoginApi for PassportClient {
    async fn generate_ticket(&self) -> Result<LoginTicket, LoginError> {
        let envelope: Envelope<GenerateData> = self
            .get_json(self.client.get(self.generate_url.clone()))
            .await?;

        if envelope.code != CODE_SUCCESS {
            return Err(LoginError::Network(format!(
                "ticket request rejected ({}): {}",
                envelope.code, envelope.message
            )));
        }
        let data = envelope
            .data
            .ok_or_else(|| LoginError::Protocol("ticket response has no data".to_string()))?;

        tracing::debug!("[Passport] Ticket generated");
        Ok(LoginTicket::new(data.url, data.qrcode_key))
    }

    async fn poll(&self, ticket_key: &str) -> Result<PollOutcome, LoginError> {
        let request = self
            .client
            .get(self.poll_url.clone())
            .query(&[("qrcode_key", ticket_key)]);
        let envelope: Envelope<PollData> = self.get_json(request).await?;
        let data = envelope
            .data
            .ok_or_else(|| LoginError::Protocol("poll response has no data".to_string()))?;

        tracing::debug!(code = data.code, "[Passport] Poll");
        Ok(match data.code {
            CODE_SUCCESS => PollOutcome::Success(self.credentials()),
            CODE_NOT_SCANNED => PollOutcome::Pending,
            CODE_SCANNED_UNCONFIRMED => PollOutcome::ScannedUnconfirmed,
            CODE_EXPIRED => PollOutcome::Expired,
            other if data.message.is_empty() => {
                PollOutcome::Error(format!("unknown status {}", other))
            }
            _ => PollOutcome::Error(data.message),
        })
    }
}
