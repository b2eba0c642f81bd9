//! Collection and item retrieval, including paginated traversal.

use std::collections::HashSet;

use anyhow::Result;
use serde::Deserialize;
use stac::{Collection, Item, ItemCollection, Link};
use tracing::{info, warn};

use crate::client::ApiClient;

/// Response document of the `/collections` endpoint.
#[derive(Debug, Deserialize)]
pub struct CollectionList {
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub links: Vec<Link>,
}

pub async fn get_collection(client: &ApiClient, collection_id: &str) -> Result<Collection> {
    let collection = client.get_json(&client.collection_url(collection_id)).await?;
    Ok(collection)
}

pub async fn get_item(client: &ApiClient, collection_id: &str, item_id: &str) -> Result<Item> {
    let item = client
        .get_json(&client.item_url(collection_id, item_id))
        .await?;
    Ok(item)
}

pub async fn list_collections(client: &ApiClient) -> Result<Vec<Collection>> {
    let list: CollectionList = client.get_json(&client.collections_url()).await?;
    Ok(list.collections)
}

/// Walks the paginated items of a collection by following `rel == "next"`
/// links until the pages run out or `max_items` is reached.
///
/// A visited-URL set terminates the walk if the server ever points back at
/// a page already fetched.
pub async fn walk_items(
    client: &ApiClient,
    collection_id: &str,
    page_limit: usize,
    max_items: Option<usize>,
) -> Result<Vec<Item>> {
    let mut url = format!("{}?limit={}", client.items_url(collection_id), page_limit);
    let mut visited: HashSet<String> = HashSet::new();
    let mut items: Vec<Item> = vec![];

    loop {
        if !visited.insert(url.clone()) {
            warn!(url, "pagination loop detected; stopping walk");
            break;
        }
        let page: ItemCollection = client.get_json(&url).await?;
        let next = next_link(&page.links).map(str::to_owned);
        info!(
            collection_id,
            page_items = page.items.len(),
            total = items.len(),
            "fetched items page"
        );
        for item in page.items {
            items.push(item);
            if let Some(max) = max_items {
                if items.len() >= max {
                    return Ok(items);
                }
            }
        }
        match next {
            Some(href) => url = href,
            None => break,
        }
    }
    Ok(items)
}

/// The href of the `rel == "next"` pagination link, if any.
pub fn next_link(links: &[Link]) -> Option<&str> {
    links.iter().find(|l| l.rel == "next").map(|l| l.href.as_str())
}
