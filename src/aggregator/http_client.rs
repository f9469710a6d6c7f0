use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::{
    aggregator::{Aggregator, AggregatorError},
    models::{AccountMetadata, AccountTransactions, NewRequisition, Requisition},
};

pub const DEFAULT_BASE_URL: &str = "https://bankaccountdata.gocardless.com/api/v2";

// Tokens are renewed this long before they actually expire
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Deserialize)]
struct NewTokenResponse {
    access: String,
    access_expires: i64,
    refresh: String,
    refresh_expires: i64,
}

#[derive(Deserialize)]
struct RefreshTokenResponse {
    access: String,
    access_expires: i64,
}

struct Token {
    access: SecretString,
    access_expires_at: DateTime<Utc>,
    refresh: SecretString,
    refresh_expires_at: DateTime<Utc>,
}

impl Token {
    fn access_valid(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.access_expires_at
    }

    fn refresh_valid(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.refresh_expires_at
    }
}

/// HTTP client for the GoCardless Bank Account Data API
pub struct GoCardlessClient {
    client: Client,
    base_url: String,
    secret_id: SecretString,
    secret_key: SecretString,
    token: Mutex<Option<Token>>,
}

impl GoCardlessClient {
    /// Create a new client authenticating with the given user secrets
    pub fn new(
        base_url: impl Into<String>,
        secret_id: SecretString,
        secret_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, AggregatorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            secret_id,
            secret_key,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // Get a valid access token, refreshing or recreating it when needed
    async fn access_token(&self) -> Result<SecretString, AggregatorError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = guard.as_mut() {
            if token.access_valid(now) {
                return Ok(token.access.clone());
            }
            if token.refresh_valid(now) {
                match self.refresh_access(&token.refresh).await {
                    Ok(refreshed) => {
                        token.access = SecretString::from(refreshed.access);
                        token.access_expires_at =
                            now + TimeDelta::seconds(refreshed.access_expires);
                        debug!("Access token refreshed");
                        return Ok(token.access.clone());
                    }
                    Err(e) => warn!("Failed to refresh access token: {e}. Requesting a new one"),
                }
            }
        }

        let token = self.new_token(now).await?;
        let access = token.access.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn new_token(&self, now: DateTime<Utc>) -> Result<Token, AggregatorError> {
        let body = json!({
            "secret_id": self.secret_id.expose_secret(),
            "secret_key": self.secret_key.expose_secret(),
        });
        let request = self.client.post(self.url("token/new/")).json(&body);
        let response: NewTokenResponse = Self::send(request, "token/new").await?;
        debug!("New access token obtained");

        Ok(Token {
            access: SecretString::from(response.access),
            access_expires_at: now + TimeDelta::seconds(response.access_expires),
            refresh: SecretString::from(response.refresh),
            refresh_expires_at: now + TimeDelta::seconds(response.refresh_expires),
        })
    }

    async fn refresh_access(
        &self,
        refresh: &SecretString,
    ) -> Result<RefreshTokenResponse, AggregatorError> {
        let body = json!({ "refresh": refresh.expose_secret() });
        let request = self.client.post(self.url("token/refresh/")).json(&body);
        Self::send(request, "token/refresh").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AggregatorError> {
        let token = self.access_token().await?;
        let request = self
            .client
            .get(self.url(path))
            .bearer_auth(token.expose_secret());
        Self::send(request, path).await
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, AggregatorError> {
        let response = request.header("accept", "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AggregatorError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Aggregator for GoCardlessClient {
    #[instrument(skip(self, request), fields(institution_id = %request.institution_id))]
    async fn create_requisition(
        &self,
        request: &NewRequisition,
    ) -> Result<Requisition, AggregatorError> {
        let token = self.access_token().await?;
        let request = self
            .client
            .post(self.url("requisitions/"))
            .bearer_auth(token.expose_secret())
            .json(request);
        Self::send(request, "requisitions").await
    }

    async fn requisition(&self, id: &str) -> Result<Requisition, AggregatorError> {
        self.get(&format!("requisitions/{id}/")).await
    }

    async fn account_metadata(
        &self,
        account_id: &str,
    ) -> Result<AccountMetadata, AggregatorError> {
        self.get(&format!("accounts/{account_id}/")).await
    }

    async fn account_transactions(
        &self,
        account_id: &str,
    ) -> Result<AccountTransactions, AggregatorError> {
        self.get(&format!("accounts/{account_id}/transactions/")).await
    }
}
