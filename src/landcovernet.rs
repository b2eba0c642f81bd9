//! LandCoverNet v1, the default dataset of the original MLHub client.
//!
//! Label items carry a single `labels` GeoTIFF asset plus documentation,
//! and link (`rel == "source"`) to the Sentinel-2 source items whose assets
//! are the per-band imagery (B01..B12, CLD, SCL).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use stac::Item;
use toml;
use tracing::info;
use url::Url;

use crate::assets::{self, AssetRef};
use crate::catalog;
use crate::client::ApiClient;
use crate::download_plan::{DownloadPlan, DownloadTask};
use crate::selection::DownloadSelection;

pub const LABELS_COLLECTION_ID: &str = "ref_landcovernet_v1_labels";
pub const SOURCE_COLLECTION_ID: &str = "ref_landcovernet_v1_source";

pub fn download_selection_toml() -> toml::Table {
    toml::toml! {
        id = "mlhub.landcovernet_v1"

        provider = "Radiant Earth Foundation"

        name = "LandCoverNet v1"

        description = "LandCoverNet is a global annual land cover classification\n\
        training dataset with labels for the multi-spectral satellite imagery from\n\
        Sentinel-2 mission in 2018. Each label item covers a 256 x 256 chip and\n\
        links to the Sentinel-2 scenes (source items) it was derived from."

        docs = "https://registry.mlhub.earth/10.34911/rdnt.d2ce8i/"

        collection_id = "ref_landcovernet_v1_labels"
        source_collection_id = "ref_landcovernet_v1_source"

        // Also fetch the linked Sentinel-2 band imagery for every label item
        with_sources = false

        ids_to_download = [
            "ref_landcovernet_v1_labels_29PKL_19",
            "ref_landcovernet_v1_labels_29PKL_19",
        ]

        [[assets]]
        key = "labels"
        name = "Land cover labels"
        download = true

        [[assets]]
        key = "documentation"
        name = "Dataset documentation"
        download = false
    }
}

/// Builds a download plan from a selection: explicit item ids when given,
/// otherwise a paginated walk of the collection bounded by `max_items`.
pub async fn generate_download_plan(
    client: &ApiClient,
    selection: &DownloadSelection,
    output_dir: PathBuf,
) -> Result<DownloadPlan> {
    let asset_keys: Vec<String> = selection
        .assets_to_download()
        .ok_or(anyhow!("No assets selected for download"))?
        .iter()
        .map(|a| a.key.clone())
        .collect();

    let items: Vec<Item> = match selection.ids_to_download() {
        Some(ids) => {
            let mut items = vec![];
            for id in ids {
                items.push(catalog::get_item(client, &selection.collection_id, &id).await?);
            }
            items
        }
        None => {
            catalog::walk_items(
                client,
                &selection.collection_id,
                selection.page_limit,
                selection.max_items,
            )
            .await?
        }
    };

    let mut tasks: Vec<DownloadTask> = vec![];
    for item in &items {
        for asset in AssetRef::select(item, &asset_keys)? {
            tasks.push(task_for(&output_dir, &item.id, None, &asset));
        }
        if selection.with_sources {
            for href in assets::source_links(item) {
                let source_item: Item = client.get_json(href).await?;
                info!(
                    label_item = %item.id,
                    source_item = %source_item.id,
                    "expanding source item assets"
                );
                for asset in AssetRef::all(&source_item) {
                    tasks.push(task_for(&output_dir, &item.id, Some(&source_item.id), &asset));
                }
            }
        }
    }
    Ok(DownloadPlan::new(&selection.id, tasks))
}

/// Output layout: `<output_dir>/<label_item_id>[/<source_item_id>]/<file name>`.
fn task_for(
    output_dir: &Path,
    item_id: &str,
    source_item_id: Option<&str>,
    asset: &AssetRef,
) -> DownloadTask {
    let mut output = output_dir.join(item_id);
    if let Some(source_id) = source_item_id {
        output = output.join(source_id);
    }
    let output = output.join(file_name_for(asset));
    DownloadTask::new(&asset.item_id, &asset.href, &output.to_string_lossy())
}

/// Last path segment of the asset href, falling back to the asset key when
/// the href carries no usable name.
fn file_name_for(asset: &AssetRef) -> String {
    Url::parse(&asset.href)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.last().map(str::to_owned))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| asset.key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::DownloadSelection;

    #[test]
    fn test_template() {
        let selection = DownloadSelection::from_template(&download_selection_toml());
        assert_eq!(selection.collection_id, LABELS_COLLECTION_ID);
        assert_eq!(
            selection.source_collection_id.as_deref(),
            Some(SOURCE_COLLECTION_ID)
        );
        assert!(!selection.with_sources);
    }

    #[test]
    fn test_file_name_from_href() {
        let asset = AssetRef {
            item_id: "ref_landcovernet_v1_labels_29PKL_19".to_string(),
            key: "labels".to_string(),
            title: None,
            media_type: None,
            href: "https://radiant-mlhub.s3.us-west-2.amazonaws.com/landcovernet/29PKL_19/labels.tif"
                .to_string(),
        };
        assert_eq!(file_name_for(&asset), "labels.tif");
    }

    #[test]
    fn test_file_name_falls_back_to_key() {
        let asset = AssetRef {
            item_id: "ref_landcovernet_v1_labels_29PKL_19".to_string(),
            key: "labels".to_string(),
            title: None,
            media_type: None,
            href: "not a url".to_string(),
        };
        assert_eq!(file_name_for(&asset), "labels");
    }

    #[test]
    fn test_task_layout() {
        let asset = AssetRef {
            item_id: "ref_landcovernet_v1_source_29PKL_19_20180512".to_string(),
            key: "B02".to_string(),
            title: None,
            media_type: None,
            href: "https://api.radiant.earth/mlhub/v1/download/abc123/B02.tif".to_string(),
        };
        let task = task_for(
            Path::new("landcovernet"),
            "ref_landcovernet_v1_labels_29PKL_19",
            Some("ref_landcovernet_v1_source_29PKL_19_20180512"),
            &asset,
        );
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(
            json["output"],
            "landcovernet/ref_landcovernet_v1_labels_29PKL_19/ref_landcovernet_v1_source_29PKL_19_20180512/B02.tif"
        );
    }
}
