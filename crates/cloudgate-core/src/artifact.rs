//! Repository artifact probe
//!
//! Tells the gate whether a repository listing for a key has already been
//! materialized. A present artifact turns a cache write into a
//! registry-only refresh.

use crate::VerificationKey;
use async_trait::async_trait;
use dashmap::DashSet;
use std::path::PathBuf;

#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    async fn exists(&self, key: &VerificationKey) -> bool;
}

/// Probes `<root>/<address>-<login>-<product_id>` on disk
pub struct FsArtifactProbe {
    root: PathBuf,
}

impl FsArtifactProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn artifact_path(&self, key: &VerificationKey) -> PathBuf {
        self.root.join(key.to_string())
    }
}

#[async_trait]
impl ArtifactProbe for FsArtifactProbe {
    async fn exists(&self, key: &VerificationKey) -> bool {
        let path = self.artifact_path(key);
        match tokio::fs::try_exists(&path).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("Artifact probe failed for {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Set of keys with a materialized artifact
#[derive(Default)]
pub struct InMemoryArtifactProbe {
    present: DashSet<VerificationKey>,
}

impl InMemoryArtifactProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: VerificationKey) {
        self.present.insert(key);
    }

    pub fn remove(&self, key: &VerificationKey) {
        self.present.remove(key);
    }
}

#[async_trait]
impl ArtifactProbe for InMemoryArtifactProbe {
    async fn exists(&self, key: &VerificationKey) -> bool {
        self.present.contains(key)
    }
}
