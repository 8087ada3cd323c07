//! Resource catalog
//!
//! The fixed set of answerable items, loaded once at startup and shared
//! read-only for the lifetime of the process.

use crate::types::{Resource, ResourceId};
use std::collections::HashMap;
use std::path::Path;

/// Every round presents this many choices
pub const CHOICES_PER_ROUND: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate or empty ids and catalogs too
    /// small to fill a round
    pub fn new(resources: Vec<Resource>) -> Result<Self, CatalogError> {
        if resources.len() < CHOICES_PER_ROUND {
            return Err(CatalogError::Invalid(format!(
                "need at least {} resources, found {}",
                CHOICES_PER_ROUND,
                resources.len()
            )));
        }

        let mut index = HashMap::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            if resource.id.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "resource '{}' has an empty id",
                    resource.name
                )));
            }
            if index.insert(resource.id.clone(), i).is_some() {
                return Err(CatalogError::Invalid(format!(
                    "duplicate resource id '{}'",
                    resource.id
                )));
            }
        }

        Ok(Self { resources, index })
    }

    /// Load a catalog from a JSON array of resources
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let resources: Vec<Resource> = serde_json::from_str(&raw)?;
        let catalog = Self::new(resources)?;
        tracing::info!(
            path = %path.as_ref().display(),
            resources = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }
}
