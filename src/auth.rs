//! Session tokens and password handling.
//!
//! Sessions are stateless HS256 JWTs carrying the user ID, valid for seven
//! days. Passwords are stored as bcrypt hashes. Nothing here touches the
//! database; the server layer wires tokens to cookies and users.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// How long an issued session stays valid.
pub const SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug)]
pub enum AuthError {
    Token(jsonwebtoken::errors::Error),
    Hash(bcrypt::BcryptError),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Token(e) => write!(f, "session token error: {e}"),
            AuthError::Hash(e) => write!(f, "password hash error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::Token(e)
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AuthError::Hash(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// User ID the session belongs to.
    sub: String,
    iat: u64,
    exp: u64,
}

/// Mint a session token for the given user, expiring [`SESSION_TTL_SECS`]
/// from `now`.
pub fn create_session_token(
    user_id: &str,
    secret: &str,
    now: u64,
) -> Result<String, AuthError> {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Validate a session token and return the user ID it was minted for.
/// Expired, tampered, or foreign-secret tokens all fail.
pub fn verify_session_token(token: &str, secret: &str) -> Result<String, AuthError> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    Ok(hash)
}

/// Check a password against a stored hash. A malformed hash counts as a
/// mismatch rather than an error; login treats both the same way.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// TLDs the signup form accepts. Deliberately a short allowlist rather than
/// full RFC address parsing; it matches what the registration gateway has
/// always accepted.
const ALLOWED_TLDS: &[&str] = &["com", "net", "org", "edu", "gov", "io", "co"];

/// Loose structural check for signup emails: one `@`, no whitespace, and a
/// domain ending in an allowed TLD.
pub fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if local.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    if domain.chars().any(|c| c.is_whitespace() || c == '@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    if host.is_empty() {
        return false;
    }
    ALLOWED_TLDS.iter().any(|t| tld.eq_ignore_ascii_case(t))
}

/// Generate a random URL-safe secret suitable for signing session tokens.
/// Used when the operator has not configured one explicitly.
pub fn generate_secret() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
