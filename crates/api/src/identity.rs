//! Buyer identity from bearer tokens.
//!
//! Tokens are HS256 JWTs whose `sub` is the buyer's [`UserId`] and whose
//! `role` says whether the caller may manage the catalog. Tokens without a
//! `role` claim identify an ordinary buyer.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use boxoffice_core::UserId;

use crate::context::BuyerContext;

/// Caller role carried in the token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    /// May create events and change ticket prices.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by a buyer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerClaims {
    pub sub: UserId,
    #[serde(default)]
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed or unsigned token: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the claim time window at `now`.
pub fn validate_claims(claims: &BuyerClaims, now: DateTime<Utc>) -> Result<(), IdentityError> {
    if claims.expires_at <= claims.issued_at {
        return Err(IdentityError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(IdentityError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(IdentityError::Expired);
    }
    Ok(())
}

/// Resolves a bearer token to the caller it identifies.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, token: &str, now: DateTime<Utc>) -> Result<BuyerContext, IdentityError>;
}

/// Shared-secret HS256 token verification.
pub struct Hs256Identity {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl Hs256Identity {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry lives in `expires_at` and is checked by `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign `claims` with this provider's secret.
    pub fn issue(&self, claims: &BuyerClaims) -> Result<String, IdentityError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| IdentityError::Malformed(e.to_string()))
    }
}

impl IdentityProvider for Hs256Identity {
    fn identify(&self, token: &str, now: DateTime<Utc>) -> Result<BuyerContext, IdentityError> {
        let data = jsonwebtoken::decode::<BuyerClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(BuyerContext::new(data.claims.sub, data.claims.role))
    }
}
