//! Signed bearer tokens (HS256 JWT).
//!
//! A bearer token is self-contained: validity comes from the signature and the `exp` claim, never
//! from a storage lookup. The only identity it carries is the user id in `sub`; the user's current
//! role is read from user storage when the token is presented.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{config::Config, errors::Error, types::UserId};

/// JWT bearer claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: UserId, // Subject (user ID)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

/// Keys and validation rules derived once from the shared secret.
#[derive(Clone)]
pub struct BearerTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl std::fmt::Debug for BearerTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokens").field("expiry", &self.expiry).finish_non_exhaustive()
    }
}

impl BearerTokens {
    pub fn new(secret: &str, expiry: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            expiry,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let secret_key = config.secret_key.as_deref().ok_or_else(|| Error::Internal {
            operation: "bearer tokens: secret_key is required".to_string(),
        })?;

        Ok(Self::new(secret_key, config.auth.security.jwt_expiry))
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Sign a token for `user_id` valid for the configured expiry
    pub fn issue(&self, user_id: UserId) -> Result<String, Error> {
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(self.expiry).map_err(|e| Error::Internal {
            operation: format!("compute bearer token expiry: {e}"),
        })?;

        let claims = BearerClaims {
            sub: user_id,
            exp: (now + expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| Error::Internal {
            operation: format!("create JWT: {e}"),
        })
    }

    /// Check signature and expiry and return the claims.
    ///
    /// Anything wrong with the token itself is `Unauthenticated`; key or library failures are
    /// `Internal`.
    pub fn verify(&self, token: &str) -> Result<BearerClaims, Error> {
        let token_data = decode::<BearerClaims>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            // Client errors (401) - malformed tokens, invalid claims, expired tokens
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::ExpiredSignature
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

            // Server errors (500) - key issues, internal failures
            ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::RsaFailedSigning
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::MissingAlgorithm
            | ErrorKind::Crypto(_) => Error::Internal {
                operation: format!("JWT verification: {e}"),
            },

            _ => Error::Internal {
                operation: format!("JWT verification (unknown error): {e}"),
            },
        })?;

        Ok(token_data.claims)
    }
}
