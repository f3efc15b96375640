// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Store - Atomic Snapshot Holder
//
// Holds the active PolicyBundle behind an Arc. Readers clone the Arc once per
// evaluation and work on that immutable snapshot for the whole check. A reload
// builds and validates the next bundle without touching the lock, then swaps
// the pointer; the write lock is held only for the swap itself.

use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::domain::policy_config::{PolicyBundle, PolicyDiff, PolicyError, PolicyManifest};

pub struct PolicyStore {
    current: RwLock<Arc<PolicyBundle>>,
    // Serializes reloads so each diff is taken against the bundle it replaces
    reload_lock: Mutex<()>,
    source: Option<PathBuf>,
}

impl PolicyStore {
    pub fn new(bundle: PolicyBundle) -> Self {
        Self {
            current: RwLock::new(Arc::new(bundle)),
            reload_lock: Mutex::new(()),
            source: None,
        }
    }

    /// Load and validate the policy document at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let manifest = PolicyManifest::from_file(path)?;
        let bundle = PolicyBundle::from_manifest(&manifest)?;
        info!(
            "Loaded policy {} ({} roles) from {:?}",
            bundle.policy_id(),
            bundle.matrix.len(),
            path
        );
        Ok(Self {
            current: RwLock::new(Arc::new(bundle)),
            reload_lock: Mutex::new(()),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn current(&self) -> Arc<PolicyBundle> {
        self.current.read().clone()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn reload(&self, manifest: &PolicyManifest) -> Result<PolicyDiff, PolicyError> {
        let next = Arc::new(PolicyBundle::from_manifest(manifest)?);

        let _guard = self.reload_lock.lock();
        let previous = self.current();
        let diff = previous.diff(&next);
        *self.current.write() = next;
        Ok(diff)
    }

    /// Validate a YAML or JSON policy document and make it active. A store
    /// loaded from a file writes the accepted document back to that file
    /// before the swap, so a later [`Self::reload_from_source`] keeps it.
    /// Nothing is written or swapped when validation or the write fails.
    pub fn reload_document(&self, document: &str) -> Result<PolicyDiff, PolicyError> {
        let manifest = PolicyManifest::from_yaml_str(document)?;
        let next = Arc::new(PolicyBundle::from_manifest(&manifest)?);

        let _guard = self.reload_lock.lock();
        if let Some(path) = &self.source {
            persist(path, document)?;
            info!("Wrote policy {} to {:?}", next.policy_id(), path);
        }
        let previous = self.current();
        let diff = previous.diff(&next);
        *self.current.write() = next;
        Ok(diff)
    }

    /// Re-read the file this store was loaded from.
    pub fn reload_from_source(&self) -> Result<PolicyDiff, PolicyError> {
        let path = self.source.as_ref().ok_or_else(|| {
            PolicyError::InvalidManifest("policy store was not loaded from a file".to_string())
        })?;
        let manifest = PolicyManifest::from_file(path)?;
        self.reload(&manifest)
    }
}

/// Write next to the target and rename over it; readers never see a
/// half-written policy.
fn persist(path: &Path, document: &str) -> Result<(), PolicyError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".reload");
    let staging = PathBuf::from(staging);
    std::fs::write(&staging, document)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}
