use std::sync::Arc;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{config::JwtConfig, users::UserId};

/// Every token lives exactly this long.
pub const TOKEN_TTL: Duration = Duration::days(7);

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Identity carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("token subject is not a user id")]
    BadSubject,
}

/// Issues and verifies signed bearer tokens. The secret is fixed at
/// construction; rotating it invalidates every token issued before.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            clock,
        }
    }

    pub fn issue(&self, subject: &TokenSubject) -> anyhow::Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: subject.user_id.to_string(),
            email: subject.email.clone(),
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = subject.user_id, "jwt signed");
        Ok(token)
    }

    /// Never panics; any signature, shape or expiry problem is a `TokenError`.
    pub fn verify(&self, token: &str) -> Result<TokenSubject, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // Expiry is checked below against our clock, without leeway.
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;

        if self.clock.now().unix_timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        let user_id = claims.sub.parse::<UserId>().map_err(|_| TokenError::BadSubject)?;
        debug!(user_id, "jwt verified");
        Ok(TokenSubject {
            user_id,
            email: claims.email,
        })
    }
}
