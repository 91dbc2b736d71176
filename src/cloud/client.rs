use crate::prelude::*;

use crate::cloud;
use crate::settings::PowerData;

use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

const LOGIN_PATH: &str = "/api/usercenter/cloud/user/login";
const CHARGE_CONFIG_PATH: &str = "/api/iterate/sysSet/getChargeConfigInfo";
const UPDATE_CHARGE_CONFIG_PATH: &str = "/api/iterate/sysSet/updateChargeConfigInfo";
const LAST_POWER_DATA_PATH: &str = "/api/report/energyStorage/getLastPowerData";

/// Response envelope every Neovolt endpoint wraps its payload in.
/// A body without a `code` is not an envelope; deserialization fails
/// rather than letting it pass for code 0.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    msg: Option<String>,
    data: Option<serde_json::Value>,
    token: Option<String>,
}

impl Envelope {
    fn msg(&self) -> &str {
        self.msg.as_deref().unwrap_or("unknown error")
    }
}

/// Authenticated client for one Neovolt cloud account.
///
/// The bearer token is cached between calls and dropped whenever the
/// server reports it expired; the next attempt re-authenticates.
pub struct Api {
    account: config::Account,
    client: reqwest::Client,
    token: Mutex<Option<String>>,
}

impl Api {
    pub fn new(account: config::Account) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(account.timeout()))
            .build()
            .map_err(|e| file_error!("failed to build http client: {}", e))?;

        Ok(Self {
            account,
            client,
            token: Mutex::new(None),
        })
    }

    pub fn account(&self) -> &config::Account {
        &self.account
    }

    pub fn has_token(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    pub fn clear_token(&self) {
        *self.token.lock().unwrap() = None;
    }

    /// Log in with the encrypted-password JSON body; falls back to the
    /// older form-encoded clear-password login if that is rejected.
    pub async fn login(&self) -> Result<()> {
        debug!(
            "logging in to {} as {}",
            self.account.base_url(),
            self.account.username()
        );

        match self.login_encrypted().await {
            Ok(token) => {
                *self.token.lock().unwrap() = Some(token);
                debug!("login ok for {}", self.account.name());
                Ok(())
            }
            Err(err) => {
                warn!(
                    "encrypted login failed for {}: {} - trying form fallback",
                    self.account.name(),
                    err
                );
                let token = self.login_fallback().await?;
                *self.token.lock().unwrap() = Some(token);
                debug!("fallback login ok for {}", self.account.name());
                Ok(())
            }
        }
    }

    /// Fetch the current charge configuration document.
    pub async fn charge_config(&self) -> Result<BatterySettings> {
        let max_retries = self.account.max_retries();
        let mut last_error = anyhow!("never attempted");

        for attempt in 1..=max_retries {
            match self.try_charge_config().await {
                Ok(settings) => return Ok(settings),
                Err(err) => {
                    warn!(
                        "charge config fetch failed for {} (attempt {}/{}): {}",
                        self.account.name(),
                        attempt,
                        max_retries,
                        err
                    );
                    last_error = err;
                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_secs(self.account.retry_delay())).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "charge config fetch failed after {} attempts: {}",
            max_retries,
            last_error
        ))
    }

    /// Replace the charge configuration document. The endpoint has no
    /// partial-update support; callers must send a full merged document.
    pub async fn update_charge_config(&self, settings: &BatterySettings) -> Result<()> {
        let mut payload = serde_json::to_value(settings)?;
        payload["id"] = serde_json::Value::String(self.account.station_id().to_string());

        let max_retries = self.account.max_retries();
        let mut last_error = anyhow!("never attempted");

        for attempt in 1..=max_retries {
            match self.try_update_charge_config(&payload).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        "charge config update failed for {} (attempt {}/{}): {}",
                        self.account.name(),
                        attempt,
                        max_retries,
                        err
                    );
                    last_error = err;
                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_secs(self.account.retry_delay())).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "charge config update failed after {} attempts: {}",
            max_retries,
            last_error
        ))
    }

    /// Fetch the latest live power readings (SOC, grid, house, PV).
    pub async fn last_power_data(&self) -> Result<PowerData> {
        let max_retries = self.account.max_retries();
        let mut last_error = anyhow!("never attempted");

        for attempt in 1..=max_retries {
            match self.try_last_power_data().await {
                Ok(power) => return Ok(power),
                Err(err) => {
                    warn!(
                        "power data fetch failed for {} (attempt {}/{}): {}",
                        self.account.name(),
                        attempt,
                        max_retries,
                        err
                    );
                    last_error = err;
                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_secs(self.account.retry_delay())).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "power data fetch failed after {} attempts: {}",
            max_retries,
            last_error
        ))
    }

    async fn try_charge_config(&self) -> Result<BatterySettings> {
        let token = self.ensure_token().await?;

        let response = self
            .client
            .get(self.url(CHARGE_CONFIG_PATH))
            .query(&[("id", self.account.station_id())])
            .bearer_auth(&token)
            .send()
            .await?;

        let data = self.unwrap_envelope(response).await?;
        serde_json::from_value(data).map_err(|e| anyhow!("unexpected charge config format: {}", e))
    }

    async fn try_update_charge_config(&self, payload: &serde_json::Value) -> Result<()> {
        let token = self.ensure_token().await?;

        let response = self
            .client
            .put(self.url(UPDATE_CHARGE_CONFIG_PATH))
            .bearer_auth(&token)
            .json(payload)
            .send()
            .await?;

        self.unwrap_envelope(response).await?;
        Ok(())
    }

    async fn try_last_power_data(&self) -> Result<PowerData> {
        let token = self.ensure_token().await?;

        let operation_date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let response = self
            .client
            .get(self.url(LAST_POWER_DATA_PATH))
            .query(&[("sysSn", "All"), ("stationId", self.account.station_id())])
            .bearer_auth(&token)
            .header("Accept", "application/json, text/plain, */*")
            .header("language", "en-US")
            .header("operationDate", operation_date)
            .header("platform", "AK9D8H")
            .header("System", "alphacloud")
            .send()
            .await?;

        let data = self.unwrap_envelope(response).await?;
        serde_json::from_value(data).map_err(|e| anyhow!("unexpected power data format: {}", e))
    }

    async fn login_encrypted(&self) -> Result<String> {
        let encrypted =
            cloud::auth::encrypt_password(self.account.password(), self.account.username())?;

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&serde_json::json!({
                "username": self.account.username(),
                "password": encrypted,
            }))
            .send()
            .await?;

        Self::token_from_login(response).await
    }

    async fn login_fallback(&self) -> Result<String> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("username", self.account.username()),
                ("password", self.account.password()),
            ])
            .send()
            .await?;

        Self::token_from_login(response).await
    }

    async fn token_from_login(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            bail!("login failed with status {}: {}", status, response.text().await?);
        }

        let envelope: Envelope = response.json().await?;
        if envelope.code != cloud::CODE_OK && envelope.code != cloud::CODE_OK_ALT {
            bail!("login failed with code {}: {}", envelope.code, envelope.msg());
        }

        // token shows up either at the top level or under data
        if let Some(token) = envelope.token {
            return Ok(token);
        }
        if let Some(token) = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("token"))
            .and_then(|t| t.as_str())
        {
            return Ok(token.to_string());
        }

        bail!("no token found in login response");
    }

    async fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.token.lock().unwrap().clone() {
            return Ok(token);
        }
        self.login().await?;
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("login succeeded but no token stored"))
    }

    /// Check HTTP status and envelope code, returning the data payload.
    /// Session expiry (6069) and 401 drop the cached token so the next
    /// retry re-authenticates; 9007 is a transient server-side error.
    async fn unwrap_envelope(&self, response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.clear_token();
            bail!("unauthorized (401), token dropped for re-login");
        }
        if !status.is_success() {
            bail!("request failed with status {}: {}", status, response.text().await?);
        }

        let envelope: Envelope = response.json().await?;
        match envelope.code {
            cloud::CODE_OK | cloud::CODE_OK_ALT => {
                Ok(envelope.data.unwrap_or(serde_json::Value::Null))
            }
            cloud::CODE_SESSION_EXPIRED => {
                self.clear_token();
                bail!(
                    "session expired (code {}), token dropped for re-login",
                    cloud::CODE_SESSION_EXPIRED
                );
            }
            cloud::CODE_NETWORK_EXCEPTION => {
                bail!(
                    "server network exception (code {}): {}",
                    cloud::CODE_NETWORK_EXCEPTION,
                    envelope.msg()
                );
            }
            code => bail!("unexpected response code {}: {}", code, envelope.msg()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.account.base_url().trim_end_matches('/'), path)
    }
}
