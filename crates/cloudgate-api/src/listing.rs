//! Repository listing
//!
//! Turns an allowed activation into the service entry handed to the client.

use crate::models::{Activation, ActivationProduct, ActivationService};
use crate::systems::{ProductRecord, SystemRecord};
use cloudgate_core::Admission;
use serde::{Deserialize, Serialize};

pub trait RepositoryListing: Send + Sync {
    fn activation(
        &self,
        system: &SystemRecord,
        product: &ProductRecord,
        admission: &Admission,
    ) -> Activation;
}

/// Listing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// zypper URL resolver plugin name
    pub scheme: String,
    /// Host serving the repositories
    pub host: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            scheme: "susecloud".into(),
            host: "localhost".into(),
        }
    }
}

/// Emits `plugin:/<scheme>://<host>/services/<id>?credentials=<name>` URLs
pub struct PluginServiceListing {
    config: ListingConfig,
}

impl PluginServiceListing {
    pub fn new(config: ListingConfig) -> Self {
        Self { config }
    }

    pub fn service_url(&self, product: &ProductRecord) -> String {
        format!(
            "plugin:/{}://{}/services/{}?credentials={}",
            self.config.scheme,
            self.config.host.trim_end_matches('/'),
            product.service_id(),
            product.service_name()
        )
    }
}

impl RepositoryListing for PluginServiceListing {
    fn activation(
        &self,
        system: &SystemRecord,
        product: &ProductRecord,
        admission: &Admission,
    ) -> Activation {
        let kind = if admission.billing_account_id.is_some() { "PAYG" } else { "FULL" };

        Activation {
            id: product.id,
            system_id: system.id,
            regcode: None,
            kind: kind.into(),
            status: "ACTIVE".into(),
            service: ActivationService {
                id: product.service_id(),
                name: product.service_name(),
                url: self.service_url(product),
                obsoleted_service_name: None,
                product: ActivationProduct {
                    id: product.id,
                    identifier: product.identifier.clone(),
                    version: product.version.clone(),
                    arch: product.arch.clone(),
                    name: product.name.clone(),
                },
            },
        }
    }
}
