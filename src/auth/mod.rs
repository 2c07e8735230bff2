//! Auth adapter
//!
//! Exchanges the device account's email/password for a user id and bearer
//! token at startup. Token refresh and verification live with the external
//! auth collaborator; every consumer here just carries the token.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sign-in request body
#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

/// Sign-in response: the fields this device uses
#[derive(Debug, Deserialize)]
struct SignInResponse {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(rename = "idToken")]
    id_token: String,
}

/// The identity this device acts as
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// User the device belongs to; keys the remote control flag
    pub user_id: String,
    /// Bearer token for stream reads and uploads
    pub id_token: String,
}

/// Identity endpoint client
pub struct AuthClient {
    client: reqwest::Client,
    identity_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(identity_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            identity_url,
            api_key,
        }
    }

    /// Perform the startup sign-in
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let url = format!("{}?key={}", self.identity_url, self.api_key);

        let resp = self
            .client
            .post(&url)
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Unauthorized(format!(
                "sign-in failed: {}",
                resp.status()
            )));
        }

        let body: SignInResponse = resp
            .json()
            .await
            .map_err(|e| Error::Parse(format!("sign-in response: {}", e)))?;

        tracing::info!(user_id = %body.local_id, "Signed in");
        Ok(AuthSession {
            user_id: body.local_id,
            id_token: body.id_token,
        })
    }
}
