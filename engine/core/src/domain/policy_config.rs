// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Document Types
//
// The authorization policy artifact follows the same Kubernetes-style manifest
// shape as the engine configuration:
//
//   apiVersion: 100monkeys.ai/v1
//   kind: AuthorizationPolicy
//   metadata: { name, version }
//   spec: { administrative_actions, roles, pii }
//
// A manifest is only usable once it has been turned into a PolicyBundle, which
// runs every matrix validation rule. YAML parsing also accepts JSON documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use super::matrix::{MatrixError, RoleMatrix};
use super::redaction::PiiPolicy;
use super::role::RoleDefinition;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const POLICY_KIND: &str = "AuthorizationPolicy";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to parse policy document: {0}")]
    Parse(String),

    #[error("invalid policy manifest: {0}")]
    InvalidManifest(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("policy file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: PolicyMetadata,
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Actions that make a role administrative.
    #[serde(default = "default_administrative_actions")]
    pub administrative_actions: Vec<String>,

    #[serde(default)]
    pub roles: Vec<RoleDefinition>,

    #[serde(default)]
    pub pii: PiiPolicy,
}

impl PolicyManifest {
    pub fn from_yaml_str(doc: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(doc).map_err(|e| PolicyError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String, PolicyError> {
        serde_yaml::to_string(self).map_err(|e| PolicyError::Parse(e.to_string()))
    }

    fn validate_header(&self) -> Result<(), PolicyError> {
        if self.api_version != API_VERSION {
            return Err(PolicyError::InvalidManifest(format!(
                "apiVersion '{}' is not supported; expected '{}'",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != POLICY_KIND {
            return Err(PolicyError::InvalidManifest(format!(
                "kind '{}' is not supported; expected '{}'",
                self.kind, POLICY_KIND
            )));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(PolicyError::InvalidManifest("metadata.name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// A fully validated, immutable policy snapshot.
#[derive(Debug, Clone)]
pub struct PolicyBundle {
    pub name: String,
    pub version: String,
    pub matrix: RoleMatrix,
    pub pii: PiiPolicy,
    pub loaded_at: DateTime<Utc>,
}

impl PolicyBundle {
    pub fn from_manifest(manifest: &PolicyManifest) -> Result<Self, PolicyError> {
        manifest.validate_header()?;
        let matrix = RoleMatrix::load(&manifest.spec.roles, &manifest.spec.administrative_actions)?;
        manifest
            .spec
            .pii
            .validate()
            .map_err(|e| PolicyError::InvalidManifest(format!("spec.pii.{e}")))?;
        Ok(Self {
            name: manifest.metadata.name.clone(),
            version: manifest.metadata.version.clone(),
            matrix,
            pii: manifest.spec.pii.clone(),
            loaded_at: Utc::now(),
        })
    }

    /// Bundle with no roles: every evaluation falls through to default deny.
    pub fn empty() -> Self {
        Self {
            name: "empty".to_string(),
            version: default_version(),
            matrix: RoleMatrix::default(),
            pii: PiiPolicy::default(),
            loaded_at: Utc::now(),
        }
    }

    pub fn policy_id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn diff(&self, next: &PolicyBundle) -> PolicyDiff {
        let before: BTreeSet<String> = self.matrix.role_names().into_iter().collect();
        let after: BTreeSet<String> = next.matrix.role_names().into_iter().collect();

        let changed = before
            .intersection(&after)
            .filter(|name| {
                let old = self.matrix.lookup(name);
                let new = next.matrix.lookup(name);
                match (old, new) {
                    (Some(o), Some(n)) => {
                        o.level != n.level
                            || o.inherits != n.inherits
                            || o.expires_at != n.expires_at
                            || o.permanent != n.permanent
                            || o.permission_set() != n.permission_set()
                    }
                    _ => false,
                }
            })
            .cloned()
            .collect();

        PolicyDiff {
            previous_policy: self.policy_id(),
            new_policy: next.policy_id(),
            added_roles: after.difference(&before).cloned().collect(),
            removed_roles: before.difference(&after).cloned().collect(),
            changed_roles: changed,
            pii_changed: self.pii != next.pii,
        }
    }
}

/// Summary returned by a policy reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDiff {
    pub previous_policy: String,
    pub new_policy: String,
    pub added_roles: Vec<String>,
    pub removed_roles: Vec<String>,
    pub changed_roles: Vec<String>,
    pub pii_changed: bool,
}

impl PolicyDiff {
    pub fn is_empty(&self) -> bool {
        self.added_roles.is_empty()
            && self.removed_roles.is_empty()
            && self.changed_roles.is_empty()
            && !self.pii_changed
    }
}

fn default_version() -> String {
    "0".to_string()
}

fn default_administrative_actions() -> Vec<String> {
    vec!["admin".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_V1: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: AuthorizationPolicy
metadata:
  name: notes
  version: "1"
spec:
  roles:
    - name: workspace_viewer
      scope: workspace
      permissions:
        - { resource_type: notes, action: read, scope: workspace }
    - name: workspace_editor
      scope: workspace
      inherits: workspace_viewer
      permissions:
        - { resource_type: notes, action: create, scope: workspace }
"#;

    #[test]
    fn test_bundle_from_yaml() {
        let manifest = PolicyManifest::from_yaml_str(POLICY_V1).unwrap();
        let bundle = PolicyBundle::from_manifest(&manifest).unwrap();
        assert_eq!(bundle.policy_id(), "notes@1");
        assert_eq!(bundle.matrix.len(), 2);
        assert_eq!(bundle.pii, PiiPolicy::default());
    }

    #[test]
    fn test_json_documents_accepted() {
        let manifest = PolicyManifest::from_yaml_str(POLICY_V1).unwrap();
        let json = serde_json::to_string(&manifest).unwrap();
        let reparsed = PolicyManifest::from_yaml_str(&json).unwrap();
        assert_eq!(reparsed.spec.roles.len(), 2);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let doc = POLICY_V1.replace("AuthorizationPolicy", "NodeConfig");
        let manifest = PolicyManifest::from_yaml_str(&doc).unwrap();
        assert!(matches!(
            PolicyBundle::from_manifest(&manifest),
            Err(PolicyError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_pii_rule_on_timestamp_rejected() {
        let doc = format!("{POLICY_V1}  pii:\n    max_lengths:\n      timestamp: 10\n");
        let manifest = PolicyManifest::from_yaml_str(&doc).unwrap();
        match PolicyBundle::from_manifest(&manifest) {
            Err(PolicyError::InvalidManifest(msg)) => assert!(msg.contains("timestamp"), "{msg}"),
            other => panic!("expected InvalidManifest, got {other:?}"),
        }
    }

    #[test]
    fn test_diff() {
        let v1 = PolicyBundle::from_manifest(&PolicyManifest::from_yaml_str(POLICY_V1).unwrap()).unwrap();
        let v2_doc = POLICY_V1
            .replace("version: \"1\"", "version: \"2\"")
            .replace("action: create", "action: update")
            + r#"    - name: tenant_member
      scope: tenant
      permissions:
        - { resource_type: notes, action: read, scope: tenant }
"#;
        let v2 = PolicyBundle::from_manifest(&PolicyManifest::from_yaml_str(&v2_doc).unwrap()).unwrap();

        let diff = v1.diff(&v2);
        assert_eq!(diff.previous_policy, "notes@1");
        assert_eq!(diff.new_policy, "notes@2");
        assert_eq!(diff.added_roles, vec!["tenant_member".to_string()]);
        assert!(diff.removed_roles.is_empty());
        assert_eq!(diff.changed_roles, vec!["workspace_editor".to_string()]);
        assert!(!diff.pii_changed);
        assert!(v1.diff(&v1).is_empty());
    }
}
