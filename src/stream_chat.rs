//! Stream Chat provider integration.
//!
//! Chat and video calling are delegated to Stream; this module covers the
//! two server-side pieces of that arrangement: minting user tokens the
//! browser SDK authenticates with, and mirroring account records into the
//! provider so conversations show current names and avatars.
//!
//! The integration is optional. Without credentials the server runs with
//! chat disabled and only the token endpoint reports it.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

/// Default API base; override for proxies or test doubles.
pub const DEFAULT_API_URL: &str = "https://chat.stream-io-api.com";

/// Handle for one Stream application (key pair plus API base).
#[derive(Debug, Clone)]
pub struct StreamChat {
    api_key: String,
    api_secret: String,
    base_url: String,
}

/// Stream user tokens are JWTs over `{ user_id }` signed with the app secret.
#[derive(Serialize)]
struct UserTokenClaims<'a> {
    user_id: &'a str,
}

/// Server-to-server calls authenticate with a `{ server: true }` token.
#[derive(Serialize)]
struct ServerTokenClaims {
    server: bool,
}

impl StreamChat {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            api_key,
            api_secret,
            base_url,
        }
    }

    /// Build the integration from optional configuration. Returns `None`
    /// unless both credentials are present.
    pub fn from_config(
        api_key: Option<String>,
        api_secret: Option<String>,
        base_url: Option<String>,
    ) -> Option<Self> {
        match (api_key, api_secret) {
            (Some(key), Some(secret)) => Some(Self::new(
                key,
                secret,
                base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            )),
            _ => None,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Mint the token a browser client uses to connect as `user_id`.
    pub fn user_token(&self, user_id: &str) -> Result<String, String> {
        let claims = UserTokenClaims { user_id };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
        .map_err(|e| format!("failed to sign chat user token: {e}"))
    }

    fn server_token(&self) -> Result<String, String> {
        let claims = ServerTokenClaims { server: true };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
        .map_err(|e| format!("failed to sign chat server token: {e}"))
    }

    /// Create or update the provider-side record for one user.
    ///
    /// Callers treat failures as non-fatal: a signup must not be rolled back
    /// because the chat mirror was unreachable. Log and move on.
    pub fn upsert_user(&self, id: &str, name: &str, image: &str) -> Result<(), String> {
        let url = format!(
            "{}/users?api_key={}",
            self.base_url.trim_end_matches('/'),
            self.api_key
        );
        let token = self.server_token()?;
        let body = serde_json::json!({
            "users": {
                id: { "id": id, "name": name, "image": image }
            }
        });
        ureq::post(&url)
            .set("Authorization", &token)
            .set("stream-auth-type", "jwt")
            .send_json(body)
            .map_err(|e| format!("chat user upsert failed: {e}"))?;
        Ok(())
    }
}
