//! Anthropic PKCE flow.

use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

const AUTHORIZE_URL: &str = "https://claude.ai/oauth/authorize";
const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";
const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const REDIRECT_URI: &str = "https://console.anthropic.com/oauth/code/callback";

#[derive(Debug, Error)]
pub enum AnthropicOAuthError {
    #[error("network error: {0}")]
    Network(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("could not find an authorization code in the provided input")]
    MissingCode,
}

/// A generated PKCE pair plus the URL the user should visit.
pub struct PkceFlow {
    pub verifier: String,
    pub state: String,
    pub authorize_url: String,
}

/// Generate a random code_verifier (base64url, 32 bytes) and
/// code_challenge = S256(verifier); build the authorization URL.
pub fn start() -> PkceFlow {
    let mut verifier_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut verifier_bytes);
    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut state_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut state_bytes);
    let state = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(state_bytes);

    let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(Sha256::digest(verifier.as_bytes()));

    let authorize_url = format!(
        "{AUTHORIZE_URL}?code=true&client_id={CLIENT_ID}&response_type=code\
         &redirect_uri={redirect}&scope=org%3Acreate_api_key+user%3Aprofile+user%3Ainference\
         &code_challenge={challenge}&code_challenge_method=S256&state={state}",
        redirect = urlencoding::encode(REDIRECT_URI),
    );

    PkceFlow {
        verifier,
        state,
        authorize_url,
    }
}

/// Extract `code` from either a full redirect URL (`?code=` or `&code=`
/// query string, `state` from the URL fragment) or a raw `code#state`
/// paste-fallback string.
pub fn parse_callback(input: &str) -> Result<(String, String), AnthropicOAuthError> {
    let input = input.trim();

    if let Ok(url) = url::Url::parse(input) {
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.to_string());
        let state = url
            .fragment()
            .map(|f| f.to_string())
            .or_else(|| url.query_pairs().find(|(k, _)| k == "state").map(|(_, v)| v.to_string()));
        if let (Some(code), Some(state)) = (code, state) {
            return Ok((code, state));
        }
    }

    // Paste-fallback: a raw `code#state` string.
    if let Some((code, state)) = input.split_once('#') {
        if !code.is_empty() && !state.is_empty() {
            return Ok((code.to_string(), state.to_string()));
        }
    }

    Err(AnthropicOAuthError::MissingCode)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    account: Option<AccountInfo>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    uuid: String,
}

/// Exchange `code#state` + verifier for an OAuth token, persisted by the
/// caller under `oauth_tokens["anthropic"]`.
pub async fn exchange(
    client: &reqwest::Client,
    code: &str,
    state: &str,
    verifier: &str,
) -> Result<crate::credentials::OAuthToken, AnthropicOAuthError> {
    let body = serde_json::json!({
        "grant_type": "authorization_code",
        "code": code,
        "state": state,
        "client_id": CLIENT_ID,
        "redirect_uri": REDIRECT_URI,
        "code_verifier": verifier,
    });

    let resp = client
        .post(TOKEN_URL)
        .json(&body)
        .send()
        .await
        .map_err(|e| AnthropicOAuthError::Network(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AnthropicOAuthError::Exchange(format!("{status}: {text}")));
    }

    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AnthropicOAuthError::Exchange(e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    Ok(crate::credentials::OAuthToken {
        access: parsed.access_token,
        refresh: Some(parsed.refresh_token),
        expires_at: now + parsed.expires_in,
        account_id: parsed.account.map(|a| a.uuid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_callback_from_full_url_with_fragment_state() {
        let url = "https://console.anthropic.com/oauth/code/callback?code=abc123#xyz789";
        let (code, state) = parse_callback(url).unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "xyz789");
    }

    #[test]
    fn parse_callback_from_raw_paste_fallback() {
        let (code, state) = parse_callback("abc123#xyz789").unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "xyz789");
    }

    #[test]
    fn parse_callback_rejects_missing_code() {
        assert!(parse_callback("not a valid input").is_err());
    }

    #[test]
    fn start_produces_distinct_verifier_and_state() {
        let flow = start();
        assert_ne!(flow.verifier, flow.state);
        assert!(flow.authorize_url.contains("code_challenge="));
    }
}
