use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::Deserialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::auth::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// A freshly signed token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Signing and verification keys for the single configured HMAC secret.
///
/// The algorithm is pinned at construction; tokens declaring anything else are
/// rejected before the signature is looked at.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: TimeDuration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> AuthResult<Self> {
        if cfg.secret.is_empty() {
            return Err(AuthError::Signing("signing secret is empty".into()));
        }
        if !matches!(
            cfg.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Signing(format!(
                "{:?} cannot be used with a shared secret",
                cfg.algorithm
            )));
        }
        if cfg.ttl_minutes <= 0 {
            return Err(AuthError::Signing("token ttl must be positive".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: TimeDuration::minutes(cfg.ttl_minutes),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issue(&self, username: &str, email: &str) -> AuthResult<IssuedToken> {
        self.issue_at(username, email, OffsetDateTime::now_utc())
    }

    /// Signs a token valid from `now` until `now + ttl`.
    pub fn issue_at(
        &self,
        username: &str,
        email: &str,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            username: username.to_owned(),
            email: email.to_owned(),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        debug!(username = %username, alg = ?self.algorithm, "jwt signed");
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Structure, algorithm, signature, then expiry. The first failing step
    /// decides the error.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> AuthResult<Claims> {
        if token.split('.').count() != 3 {
            return Err(AuthError::MalformedToken);
        }

        let header = match decode_header(token) {
            Ok(h) => h,
            // The library only knows a fixed set of algorithms; `none` and
            // friends fail header parsing and still count as substitution.
            Err(_) => {
                return Err(match declared_algorithm(token) {
                    Some(alg) if Algorithm::from_str(&alg).ok() != Some(self.algorithm) => {
                        AuthError::UnsupportedAlgorithm
                    }
                    _ => AuthError::MalformedToken,
                })
            }
        };
        if header.alg != self.algorithm {
            debug!(declared = ?header.alg, pinned = ?self.algorithm, "jwt algorithm rejected");
            return Err(AuthError::UnsupportedAlgorithm);
        }

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
                _ => AuthError::MalformedToken,
            }
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }

        debug!(username = %data.claims.username, "jwt verified");
        Ok(data.claims)
    }
}

fn declared_algorithm(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let segment = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice::<RawHeader>(&bytes)
        .ok()
        .map(|h| h.alg)
}

#[cfg(test)]
pub(crate) fn test_keys() -> JwtKeys {
    JwtKeys::new(&JwtConfig {
        secret: "test-secret-with-enough-entropy".into(),
        algorithm: Algorithm::HS256,
        ttl_minutes: 5,
    })
    .expect("valid jwt config")
}
