use crate::store::validate_name;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A named search; its snapshot is stored under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub searches: Vec<SearchTarget>,
}

impl SearchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read search config: {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid search config: {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for search in &self.searches {
            if search.name.trim().is_empty() {
                bail!("search with URL {} has an empty name", search.url);
            }
            validate_name(&search.name)
                .with_context(|| format!("search with URL {} cannot be stored", search.url))?;
            if !search.url.starts_with("http://") && !search.url.starts_with("https://") {
                bail!("search {} has no http(s) URL: {}", search.name, search.url);
            }
            if !names.insert(search.name.as_str()) {
                bail!("search name {} is used more than once", search.name);
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&SearchTarget> {
        self.searches.iter().find(|s| s.name == name)
    }

    /// The searches to refresh: all of them, or only the named one.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&SearchTarget>> {
        match name {
            None => Ok(self.searches.iter().collect()),
            Some(name) => match self.find(name) {
                Some(search) => Ok(vec![search]),
                None => bail!("No search named {} is configured", name),
            },
        }
    }
}
