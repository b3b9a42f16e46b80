//! Best-effort download of the branding image shown next to the dashboard.

use std::time::Duration;

use log::{debug, info};
use reqwest::{blocking::Client, header::AUTHORIZATION};

use crate::config::AssetConfig;

/// Fetches the configured asset. Any failure (missing token, network error,
/// non-success status) yields `None`; the caller renders without it.
pub fn fetch_asset(config: &AssetConfig) -> Option<Vec<u8>> {
    match try_fetch(config) {
        Ok(bytes) => {
            info!("Fetched {} byte(s) from {}", bytes.len(), config.url);
            Some(bytes)
        }
        Err(message) => {
            debug!("Asset unavailable from {}: {message}", config.url);
            None
        }
    }
}

fn try_fetch(config: &AssetConfig) -> Result<Vec<u8>, String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|err| err.to_string())?;
    let mut request = client.get(&config.url);
    if let Some(var) = &config.token_env {
        let token = std::env::var(var).map_err(|_| format!("{var} is not set"))?;
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = request.send().map_err(|err| err.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }
    let bytes = response.bytes().map_err(|err| err.to_string())?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_asset_is_none() {
        let config = AssetConfig {
            url: "http://127.0.0.1:9/logo.png".into(),
            token_env: None,
            timeout_secs: 1,
        };
        assert_eq!(fetch_asset(&config), None);
    }

    #[test]
    fn missing_token_is_none_without_a_request() {
        let config = AssetConfig {
            url: "not a url".into(),
            token_env: Some("EQUIPMENT_MONITOR_TEST_TOKEN_UNSET".into()),
            timeout_secs: 1,
        };
        assert_eq!(fetch_asset(&config), None);
    }
}
