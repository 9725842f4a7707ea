//! GitHub Copilot device flow.

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;

const CLIENT_ID: &str = "Ov23li8tweQw6odWQebz";
const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

#[derive(Debug, Error)]
pub enum CopilotOAuthError {
    #[error("network error: {0}")]
    Network(String),
    #[error("device flow denied by user")]
    AccessDenied,
    #[error("device code expired before authorization completed")]
    Expired,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub interval: u64,
    pub expires_in: u64,
}

pub async fn start_device_flow(
    client: &reqwest::Client,
) -> Result<DeviceCodeResponse, CopilotOAuthError> {
    let resp = client
        .post(DEVICE_CODE_URL)
        .header("Accept", "application/json")
        .form(&[("client_id", CLIENT_ID), ("scope", "read:user")])
        .send()
        .await
        .map_err(|e| CopilotOAuthError::Network(e.to_string()))?;

    resp.json()
        .await
        .map_err(|e| CopilotOAuthError::Network(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PollResponse {
    Success { access_token: String },
    Pending { error: String },
}

/// Poll at `(interval+1)`-second cadence until success, `access_denied`,
/// `expired_token`, or timeout. `slow_down` increases the interval by 5s;
/// `authorization_pending` continues. Wakes to `cancel` between sleeps.
pub async fn poll(
    client: &reqwest::Client,
    device_code: &str,
    mut interval: u64,
    expires_in: u64,
    mut cancel: watch::Receiver<bool>,
) -> Result<String, CopilotOAuthError> {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(expires_in);

    loop {
        if *cancel.borrow() {
            return Err(CopilotOAuthError::Cancelled);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CopilotOAuthError::Expired);
        }

        let wait = std::time::Duration::from_secs(interval + 1);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return Err(CopilotOAuthError::Cancelled);
                }
            }
        }

        let resp = client
            .post(ACCESS_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", CLIENT_ID),
                ("device_code", device_code),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ])
            .send()
            .await
            .map_err(|e| CopilotOAuthError::Network(e.to_string()))?;

        let parsed: PollResponse = resp
            .json()
            .await
            .map_err(|e| CopilotOAuthError::Network(e.to_string()))?;

        match parsed {
            PollResponse::Success { access_token } => return Ok(access_token),
            PollResponse::Pending { error } => match error.as_str() {
                "authorization_pending" => continue,
                "slow_down" => {
                    interval += 5;
                    continue;
                }
                "access_denied" => return Err(CopilotOAuthError::AccessDenied),
                "expired_token" => return Err(CopilotOAuthError::Expired),
                other => return Err(CopilotOAuthError::Network(format!("unexpected error: {other}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_code_response_deserializes() {
        let json = r#"{"device_code":"D","user_code":"ABCD-1234","verification_uri":"https://github.com/login/device","interval":5,"expires_in":900}"#;
        let parsed: DeviceCodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.user_code, "ABCD-1234");
        assert_eq!(parsed.interval, 5);
    }

    #[test]
    fn poll_response_distinguishes_success_and_pending() {
        let success: PollResponse = serde_json::from_str(r#"{"access_token":"gho_xxx"}"#).unwrap();
        assert!(matches!(success, PollResponse::Success { .. }));
        let pending: PollResponse =
            serde_json::from_str(r#"{"error":"authorization_pending"}"#).unwrap();
        assert!(matches!(pending, PollResponse::Pending { .. }));
    }
}
