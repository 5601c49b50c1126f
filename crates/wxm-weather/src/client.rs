//! WeatherXM REST API client.
//!
//! Every failure is terminal for the run: nothing is retried here. Once a
//! private request fails the client logs out before handing the error back,
//! so a session token never outlives the run that created it.

use std::time::Duration;

use reqwest::Client;
use tracing::instrument;
use wxm_core::{HttpConfig, WeatherXmConfig};

use crate::error::WeatherXmError;
use crate::types::*;

/// Exact, case-insensitive station name comparison. Substrings never match.
pub fn station_names_match(candidate: &str, wanted: &str) -> bool {
    candidate.to_lowercase() == wanted.to_lowercase()
}

#[derive(Debug, Clone)]
pub struct WeatherXmClient {
    client: Client,
    base_url: String,
}

impl WeatherXmClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, WeatherXmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(
        config: &WeatherXmConfig,
        http: &HttpConfig,
    ) -> Result<Self, WeatherXmError> {
        Self::new(
            &config.base_url,
            http.request_timeout_secs.map(Duration::from_secs),
        )
    }

    /// Exchange credentials for a session token.
    #[instrument(skip(self, password), level = "info")]
    pub async fn login(&self, username: &str, password: &str) -> Result<BearerToken, WeatherXmError> {
        let url = format!("{}/auth/login", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Login failed with code: {}", status.as_u16());
            return Err(WeatherXmError::Auth(status.as_u16()));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| WeatherXmError::Parse(format!("login response: {}", e)))?;

        tracing::info!("Logged in to WeatherXM");
        Ok(BearerToken::new(body.token))
    }

    /// Invalidate the session token. Best-effort: failures are logged and
    /// swallowed so they never replace the run's primary result.
    #[instrument(skip_all, level = "info")]
    pub async fn logout(&self, token: &BearerToken) {
        let url = format!("{}/auth/logout", self.base_url);

        let result = self
            .client
            .post(&url)
            .header("accept", "*/*")
            .json(&LogoutRequest {
                access_token: token.as_str(),
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Logged out of WeatherXM");
            }
            Ok(response) => {
                tracing::warn!("Logout failed with code: {}", response.status().as_u16());
            }
            Err(e) => {
                tracing::warn!("Logout request failed: {}", e);
            }
        }
    }

    /// Current weather of one of the account's devices.
    #[instrument(skip(self, token), level = "info")]
    pub async fn fetch_private_by_device_id(
        &self,
        device_id: &str,
        token: &BearerToken,
    ) -> Result<StationReport, WeatherXmError> {
        let result = self.private_device(device_id, token).await;
        self.logout_on_error(result, token).await
    }

    /// Current weather of the first account device whose name matches.
    #[instrument(skip(self, token), level = "info")]
    pub async fn fetch_private_by_name(
        &self,
        station_name: &str,
        token: &BearerToken,
    ) -> Result<StationReport, WeatherXmError> {
        let result = self.private_device_by_name(station_name, token).await;
        self.logout_on_error(result, token).await
    }

    /// Resolve a station name into the ids the public API needs. Only the top
    /// search result is considered, and it must match the name exactly.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve_public_ids_by_name(
        &self,
        station_name: &str,
    ) -> Result<PublicStationIds, WeatherXmError> {
        let url = format!("{}/network/search", self.base_url);
        tracing::debug!("GET {}?query={}", url, station_name);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[("query", station_name)])
            .send()
            .await?;

        let search: SearchResponse = self.handle_response(response, station_name).await?;

        let top = search
            .devices
            .into_iter()
            .next()
            .ok_or_else(|| WeatherXmError::NotFound(format!("'{}'", station_name)))?;

        if !station_names_match(&top.name, station_name) {
            tracing::warn!(
                "Search for '{}' returned '{}', which is not an exact match",
                station_name,
                top.name
            );
            return Err(WeatherXmError::NotFound(format!("'{}'", station_name)));
        }

        Ok(PublicStationIds {
            hex_cell_id: top.cell_index,
            device_id: top.id,
        })
    }

    /// Anonymous current weather lookup.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_public(
        &self,
        hex_cell_id: &str,
        device_id: &str,
    ) -> Result<StationReport, WeatherXmError> {
        let url = format!(
            "{}/cells/{}/devices/{}",
            self.base_url,
            urlencoding::encode(hex_cell_id),
            urlencoding::encode(device_id),
        );
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await?;

        let device: ApiDevice = self.handle_response(response, device_id).await?;
        device.into_report(false)
    }

    async fn private_device(
        &self,
        device_id: &str,
        token: &BearerToken,
    ) -> Result<StationReport, WeatherXmError> {
        let url = format!(
            "{}/me/devices/{}",
            self.base_url,
            urlencoding::encode(device_id)
        );
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let device: ApiDevice = self.handle_response(response, device_id).await?;
        device.into_report(true)
    }

    async fn private_device_by_name(
        &self,
        station_name: &str,
        token: &BearerToken,
    ) -> Result<StationReport, WeatherXmError> {
        let url = format!("{}/me/devices", self.base_url);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let devices: Vec<ApiDevice> = self.handle_response(response, station_name).await?;
        if devices.is_empty() {
            return Err(WeatherXmError::NotFound(
                "any device: the account has no devices".to_string(),
            ));
        }

        let device = devices
            .into_iter()
            .find(|d| station_names_match(&d.name, station_name))
            .ok_or_else(|| WeatherXmError::NotFound(format!("'{}'", station_name)))?;

        device.into_report(true)
    }

    async fn logout_on_error<T>(
        &self,
        result: Result<T, WeatherXmError>,
        token: &BearerToken,
    ) -> Result<T, WeatherXmError> {
        if let Err(e) = &result {
            tracing::error!("Private request failed: {}", e);
            self.logout(token).await;
        }
        result
    }

    /// Decode a success body or classify the failure.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        subject: &str,
    ) -> Result<T, WeatherXmError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| WeatherXmError::Parse(format!("JSON parse error: {}", e)))
        } else if status.as_u16() == 404 {
            Err(WeatherXmError::NotFound(format!("'{}'", subject)))
        } else {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Query failed with code: {}", status.as_u16());
            Err(WeatherXmError::Http {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}
