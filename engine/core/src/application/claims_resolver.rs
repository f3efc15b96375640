// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Claims Resolver
//!
//! Turns an opaque bearer token into a per-request [`Identity`].
//!
//! Signature and expiry checks belong to a [`TokenVerifier`]; the resolver
//! only reads the verified claim set. It keeps no state between calls.
//!
//! | Claim | Required | Maps to |
//! |-------|----------|---------|
//! | `sub` | yes | `Identity::subject_id` |
//! | `tenant` (or `tid`) | yes | `Identity::tenant_id` |
//! | `workspaces` | no | workspace memberships |
//! | `roles` | no | scoped role assignments |
//! | `sid` | no | session id |
//! | `preferred_username`, `email` | no | display fields |
//!
//! Claim names for tenant, workspaces, roles and session are configurable.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::engine_config::ClaimNames;
use crate::domain::identity::{parse_role_claim, ClaimsError, Identity};

/// Anti-corruption seam for the external token verification collaborator.
pub trait TokenVerifier: Send + Sync {
    /// Verify signature, expiry and audience; return the claim set.
    fn verify(&self, token: &str) -> Result<Map<String, Value>, ClaimsError>;
}

#[derive(Clone)]
pub struct ClaimsResolver {
    verifier: Arc<dyn TokenVerifier>,
    claims: ClaimNames,
}

impl ClaimsResolver {
    pub fn new(verifier: Arc<dyn TokenVerifier>, claims: ClaimNames) -> Self {
        Self { verifier, claims }
    }

    pub fn resolve(&self, token: &str) -> Result<Identity, ClaimsError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ClaimsError::InvalidToken("empty bearer token".to_string()));
        }

        let claims = self.verifier.verify(token)?;

        let subject = non_empty_str(&claims, "sub")
            .ok_or_else(|| ClaimsError::InvalidToken("missing subject claim".to_string()))?;
        let tenant = non_empty_str(&claims, &self.claims.tenant)
            .or_else(|| non_empty_str(&claims, "tid"))
            .ok_or_else(|| ClaimsError::InvalidToken("missing tenant claim".to_string()))?;

        let mut identity = Identity::new(subject, tenant);
        identity.username = non_empty_str(&claims, "preferred_username");
        identity.email = non_empty_str(&claims, "email");
        identity.session_id = non_empty_str(&claims, &self.claims.session);

        match claims.get(&self.claims.workspaces) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let workspace = item.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
                        ClaimsError::MalformedClaims("workspaces claim must be a list of ids".to_string())
                    })?;
                    identity.workspaces.insert(workspace.to_string());
                }
            }
            Some(_) => {
                return Err(ClaimsError::MalformedClaims(
                    "workspaces claim must be a list of ids".to_string(),
                ))
            }
        }

        match claims.get(&self.claims.roles) {
            None | Some(Value::Null) => {}
            Some(value) => identity.assignments = parse_role_claim(value)?,
        }

        Ok(identity)
    }
}

fn non_empty_str(claims: &Map<String, Value>, key: &str) -> Option<String> {
    claims
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::AssignmentScope;
    use serde_json::json;

    /// Accepts any token whose text is a JSON claim object.
    struct JsonClaimsVerifier;

    impl TokenVerifier for JsonClaimsVerifier {
        fn verify(&self, token: &str) -> Result<Map<String, Value>, ClaimsError> {
            match serde_json::from_str::<Value>(token) {
                Ok(Value::Object(map)) => Ok(map),
                _ => Err(ClaimsError::InvalidToken("signature verification failed".to_string())),
            }
        }
    }

    fn resolver() -> ClaimsResolver {
        ClaimsResolver::new(Arc::new(JsonClaimsVerifier), ClaimNames::default())
    }

    #[test]
    fn test_resolve_full_identity() {
        let token = json!({
            "sub": "user-123",
            "tenant": "acme-corp",
            "preferred_username": "jdoe",
            "email": "jdoe@acme.example",
            "sid": "sess-9",
            "workspaces": ["project-alpha", "project-beta"],
            "roles": { "workspace:project-alpha": ["workspace_editor"] }
        })
        .to_string();

        let identity = resolver().resolve(&token).unwrap();
        assert_eq!(identity.subject_id, "user-123");
        assert_eq!(identity.tenant_id, "acme-corp");
        assert_eq!(identity.username.as_deref(), Some("jdoe"));
        assert_eq!(identity.session_id.as_deref(), Some("sess-9"));
        assert!(identity.is_member_of("project-beta"));
        assert_eq!(identity.assignments.len(), 1);
        assert_eq!(
            identity.assignments[0].scope,
            AssignmentScope::Workspace("project-alpha".to_string())
        );
    }

    #[test]
    fn test_tid_fallback() {
        let token = json!({ "sub": "user-1", "tid": "globex-inc" }).to_string();
        assert_eq!(resolver().resolve(&token).unwrap().tenant_id, "globex-inc");
    }

    #[test]
    fn test_missing_required_claims() {
        let no_sub = json!({ "tenant": "acme-corp" }).to_string();
        assert!(matches!(resolver().resolve(&no_sub), Err(ClaimsError::InvalidToken(_))));

        let no_tenant = json!({ "sub": "user-1" }).to_string();
        assert!(matches!(resolver().resolve(&no_tenant), Err(ClaimsError::InvalidToken(_))));

        assert!(matches!(resolver().resolve("   "), Err(ClaimsError::InvalidToken(_))));
        assert!(matches!(resolver().resolve("not-json"), Err(ClaimsError::InvalidToken(_))));
    }

    #[test]
    fn test_malformed_role_claims() {
        let flat_list = json!({ "sub": "u", "tenant": "t", "roles": ["admin"] }).to_string();
        assert!(matches!(resolver().resolve(&flat_list), Err(ClaimsError::MalformedClaims(_))));

        let unscoped = json!({ "sub": "u", "tenant": "t", "roles": { "project-alpha": ["viewer"] } }).to_string();
        assert!(matches!(resolver().resolve(&unscoped), Err(ClaimsError::MalformedClaims(_))));

        let bad_workspaces = json!({ "sub": "u", "tenant": "t", "workspaces": "project-alpha" }).to_string();
        assert!(matches!(
            resolver().resolve(&bad_workspaces),
            Err(ClaimsError::MalformedClaims(_))
        ));
    }
}
