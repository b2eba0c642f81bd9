//! Mapping items to downloadable asset references.

use serde::{Deserialize, Serialize};
use stac::Item;

use crate::error::Error;

/// One downloadable asset of an item, flattened to the fields the
/// downloader needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub item_id: String,
    pub key: String,
    pub title: Option<String>,
    pub media_type: Option<String>,
    pub href: String,
}

impl AssetRef {
    pub fn from_item(item: &Item, key: &str) -> Result<Self, Error> {
        let asset = item.assets.get(key).ok_or_else(|| Error::AssetKeyNotFound {
            item_id: item.id.clone(),
            key: key.to_string(),
        })?;
        Ok(Self {
            item_id: item.id.clone(),
            key: key.to_string(),
            title: asset.title.clone(),
            media_type: asset.r#type.clone(),
            href: asset.href.clone(),
        })
    }

    /// Extracts the given asset keys in order. Fails on the first key the
    /// item does not carry.
    pub fn select(item: &Item, keys: &[String]) -> Result<Vec<Self>, Error> {
        keys.iter().map(|key| Self::from_item(item, key)).collect()
    }

    /// Every asset of the item, ordered by key.
    pub fn all(item: &Item) -> Vec<Self> {
        let mut keys: Vec<&String> = item.assets.keys().collect();
        keys.sort();
        keys.iter()
            .map(|key| Self {
                item_id: item.id.clone(),
                key: (*key).clone(),
                title: item.assets[*key].title.clone(),
                media_type: item.assets[*key].r#type.clone(),
                href: item.assets[*key].href.clone(),
            })
            .collect()
    }
}

/// Hrefs of the item's `rel == "source"` links. Label items link to the
/// source imagery items whose assets hold the band files.
pub fn source_links(item: &Item) -> Vec<&str> {
    item.links
        .iter()
        .filter(|l| l.rel == "source")
        .map(|l| l.href.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label_item() -> Item {
        serde_json::from_value(json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "ref_landcovernet_v1_labels_29PKL_19",
            "collection": "ref_landcovernet_v1_labels",
            "geometry": null,
            "properties": {"datetime": "2018-01-01T00:00:00Z"},
            "links": [
                {"rel": "self", "href": "https://api.radiant.earth/mlhub/v1/collections/ref_landcovernet_v1_labels/items/ref_landcovernet_v1_labels_29PKL_19"},
                {"rel": "source", "href": "https://api.radiant.earth/mlhub/v1/collections/ref_landcovernet_v1_source/items/ref_landcovernet_v1_source_29PKL_19_20180512"},
                {"rel": "source", "href": "https://api.radiant.earth/mlhub/v1/collections/ref_landcovernet_v1_source/items/ref_landcovernet_v1_source_29PKL_19_20180601"}
            ],
            "assets": {
                "labels": {
                    "href": "https://api.radiant.earth/mlhub/v1/download/abc123",
                    "title": "Land cover labels",
                    "type": "image/tiff; application=geotiff"
                },
                "documentation": {
                    "href": "https://api.radiant.earth/mlhub/v1/download/def456",
                    "title": "Dataset documentation",
                    "type": "application/pdf"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_from_item() {
        let item = label_item();
        let asset = AssetRef::from_item(&item, "labels").unwrap();
        assert_eq!(asset.item_id, "ref_landcovernet_v1_labels_29PKL_19");
        assert_eq!(asset.href, "https://api.radiant.earth/mlhub/v1/download/abc123");
        assert_eq!(asset.title.as_deref(), Some("Land cover labels"));
        assert_eq!(
            asset.media_type.as_deref(),
            Some("image/tiff; application=geotiff")
        );
    }

    #[test]
    fn test_from_item_missing_key() {
        let item = label_item();
        let err = AssetRef::from_item(&item, "thumbnail").unwrap_err();
        assert!(matches!(err, Error::AssetKeyNotFound { .. }));
    }

    #[test]
    fn test_select_preserves_order() {
        let item = label_item();
        let keys = vec!["documentation".to_string(), "labels".to_string()];
        let assets = AssetRef::select(&item, &keys).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].key, "documentation");
        assert_eq!(assets[1].key, "labels");
    }

    #[test]
    fn test_all_sorted_by_key() {
        let item = label_item();
        let assets = AssetRef::all(&item);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].key, "documentation");
        assert_eq!(assets[1].key, "labels");
    }

    #[test]
    fn test_source_links() {
        let item = label_item();
        let links = source_links(&item);
        assert_eq!(links.len(), 2);
        assert!(links[0].ends_with("ref_landcovernet_v1_source_29PKL_19_20180512"));
    }
}
