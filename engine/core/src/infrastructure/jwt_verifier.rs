// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # JWT Token Verifier
//!
//! [`TokenVerifier`] backed by `jsonwebtoken`. Supports an HS256 shared secret
//! or an RS256 public key in PEM format. Every token is signature-checked;
//! there is no unverified decode path.
//!
//! Validation: `exp` required, `nbf` honoured, `iss`/`aud` checked when
//! configured, clock skew bounded by `leeway_seconds`.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::application::claims_resolver::TokenVerifier;
use crate::domain::engine_config::TokenConfig;
use crate::domain::identity::ClaimsError;

pub struct JwtTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn hs256(secret: &[u8], config: &TokenConfig) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: build_validation(Algorithm::HS256, config),
        }
    }

    pub fn rs256_pem(pem: &[u8], config: &TokenConfig) -> anyhow::Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| anyhow::anyhow!("Invalid RSA public key: {}", e))?;
        Ok(Self {
            key,
            validation: build_validation(Algorithm::RS256, config),
        })
    }

    /// Build the verifier described by the `token` configuration section.
    pub fn from_config(config: &TokenConfig) -> anyhow::Result<Self> {
        if let Some(path) = &config.rsa_public_key_path {
            let pem = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read RSA public key {}: {}", path, e))?;
            return Self::rs256_pem(&pem, config);
        }
        match config.resolve_secret()? {
            Some(secret) if !secret.is_empty() => Ok(Self::hs256(secret.as_bytes(), config)),
            _ => anyhow::bail!("token: configure hs256_secret or rsa_public_key_path"),
        }
    }
}

fn build_validation(algorithm: Algorithm, config: &TokenConfig) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.leeway = config.leeway_seconds;
    validation.validate_nbf = true;
    match &config.issuer {
        Some(issuer) => validation.set_issuer(&[issuer.as_str()]),
        None => validation.iss = None,
    }
    match &config.audience {
        Some(audience) => validation.set_audience(&[audience.as_str()]),
        None => validation.validate_aud = false,
    }
    validation
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> Result<Map<String, Value>, ClaimsError> {
        let data = decode::<Map<String, Value>>(token, &self.key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::ImmatureSignature => "token not yet valid",
                ErrorKind::InvalidSignature => "signature verification failed",
                ErrorKind::InvalidIssuer => "unexpected issuer",
                ErrorKind::InvalidAudience => "unexpected audience",
                ErrorKind::MissingRequiredClaim(_) => "required claim missing",
                ErrorKind::InvalidAlgorithm => "unexpected signing algorithm",
                _ => "token could not be decoded",
            };
            ClaimsError::InvalidToken(reason.to_string())
        })?;
        Ok(data.claims)
    }
}
