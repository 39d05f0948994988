//! Startup-built lookup table of configured schools.

use std::collections::BTreeMap;

use crate::error::{RagError, Result};
use crate::models::School;

/// Read-only map from school id to [`School`], in configuration order.
#[derive(Debug, Clone, Default)]
pub struct SchoolRegistry {
    order: Vec<String>,
    by_id: BTreeMap<String, School>,
}

impl SchoolRegistry {
    /// Build the table, rejecting empty or duplicate ids and non-finite thresholds.
    pub fn new(schools: impl IntoIterator<Item = School>) -> Result<Self> {
        let mut registry = Self::default();
        for school in schools {
            if school.id.trim().is_empty() {
                return Err(RagError::Config("school id must not be empty".into()));
            }
            if !school.threshold.is_finite() {
                return Err(RagError::Config(format!(
                    "school '{}' has a non-finite threshold",
                    school.id
                )));
            }
            if registry.by_id.contains_key(&school.id) {
                return Err(RagError::Config(format!(
                    "duplicate school id '{}'",
                    school.id
                )));
            }
            registry.order.push(school.id.clone());
            registry.by_id.insert(school.id.clone(), school);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<&School> {
        self.by_id
            .get(id)
            .ok_or_else(|| RagError::UnknownSchool(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Schools in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &School> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
