//! Registered systems
//!
//! Credential and activated-product lookup. Persistence lives behind
//! [`SystemDirectory`]; the in-memory directory serves development and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("system store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid systems file: {0}")]
    InvalidFile(String),
}

/// Registered system with its activated products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRecord {
    pub id: i64,
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub identifier: String,
    pub version: String,
    pub arch: String,
    pub name: String,
    /// Repository service id; defaults to the product id
    #[serde(default)]
    pub service_id: Option<i64>,
}

impl ProductRecord {
    pub fn service_id(&self) -> i64 {
        self.service_id.unwrap_or(self.id)
    }

    /// `SLES_15.5_x86_64` style service name
    pub fn service_name(&self) -> String {
        format!("{}_{}_{}", self.identifier, self.version, self.arch).replace(['/', ' '], "_")
    }
}

#[async_trait]
pub trait SystemDirectory: Send + Sync {
    /// System owning these credentials, if they are valid
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<SystemRecord>, DirectoryError>;
}

/// In-memory system directory
pub struct InMemorySystemDirectory {
    systems: RwLock<HashMap<String, SystemRecord>>,
}

impl InMemorySystemDirectory {
    pub fn new() -> Self {
        Self {
            systems: RwLock::new(HashMap::new()),
        }
    }

    /// Load a JSON array of systems
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::InvalidFile(format!("{}: {}", path.display(), e)))?;
        let systems: Vec<SystemRecord> = serde_json::from_str(&content)
            .map_err(|e| DirectoryError::InvalidFile(format!("{}: {}", path.display(), e)))?;

        let directory = Self::new();
        for system in systems {
            directory.insert(system);
        }
        Ok(directory)
    }

    pub fn insert(&self, system: SystemRecord) {
        self.systems.write().insert(system.login.clone(), system);
    }

    pub fn len(&self) -> usize {
        self.systems.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.read().is_empty()
    }
}

impl Default for InMemorySystemDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemDirectory for InMemorySystemDirectory {
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<SystemRecord>, DirectoryError> {
        Ok(self
            .systems
            .read()
            .get(login)
            .filter(|system| system.password == password)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> SystemRecord {
        SystemRecord {
            id: 1,
            login: "SCC_3b336b".into(),
            password: "s3cr3t".into(),
            products: vec![ProductRecord {
                id: 1743,
                identifier: "SLES".into(),
                version: "15.5".into(),
                arch: "x86_64".into(),
                name: "SUSE Linux Enterprise Server".into(),
                service_id: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let directory = InMemorySystemDirectory::new();
        directory.insert(system());

        assert!(directory.authenticate("SCC_3b336b", "s3cr3t").await.unwrap().is_some());
        assert!(directory.authenticate("SCC_3b336b", "wrong").await.unwrap().is_none());
        assert!(directory.authenticate("SCC_other", "s3cr3t").await.unwrap().is_none());
    }

    #[test]
    fn test_service_naming() {
        let product = &system().products[0];
        assert_eq!(product.service_id(), 1743);
        assert_eq!(product.service_name(), "SLES_15.5_x86_64");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir()
            .join(format!("cloudgate-systems-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&vec![system()]).unwrap()).unwrap();

        let directory = InMemorySystemDirectory::load(&path).unwrap();
        assert_eq!(directory.len(), 1);

        std::fs::remove_file(&path).unwrap();
    }
}
