//! TOML description of what to fetch from a collection.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use toml;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DownloadSelection {
    pub id: String,
    provider: String,
    name: String,
    description: String,
    docs: String,
    pub collection_id: String,
    /// Collection holding the source imagery items that label items link to.
    pub source_collection_id: Option<String>,
    /// Fetch the linked source items' assets alongside the selected ones.
    #[serde(default)]
    pub with_sources: bool,
    #[serde(default)]
    ids_to_download: Vec<String>,
    /// Stop after this many items when walking the whole collection.
    pub max_items: Option<usize>,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    assets: Vec<AssetSelection>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AssetSelection {
    pub key: String,
    name: String,
    download: bool,
}

fn default_page_limit() -> usize {
    100
}

impl DownloadSelection {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let selection: Self = toml::from_str(&content)?;
        Ok(selection)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Self {
        let selection: Self =
            toml::from_str(&table.to_string()).expect("Error serializing template");
        selection
    }

    pub fn assets_to_download(&self) -> Option<Vec<AssetSelection>> {
        let assets = self.assets.clone();
        let to_download = assets
            .into_iter()
            .filter(|a| a.download)
            .collect::<Vec<_>>();
        if to_download.is_empty() {
            return None;
        }
        Some(to_download)
    }

    pub fn ids_to_download(&self) -> Option<Vec<String>> {
        if self.ids_to_download.is_empty() {
            return None;
        }
        // Remove duplicates
        let ids = self
            .ids_to_download
            .clone()
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        Some(ids)
    }
}
