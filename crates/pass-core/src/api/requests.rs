//! Typed wrappers around the share, key, event and item endpoints.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiClient, ApiRequest};
use crate::crypto::EncryptedBlob;
use crate::error::{Error, Result};
use crate::models::{
    EncryptedEventBatch, EncryptedItem, EncryptedShare, EncryptedShareKey, EventId, ItemId,
    Revision, RevisionUpdate, ShareId,
};

/// Item reference sent with trash/restore/delete requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRevisionRef {
    #[serde(rename = "ItemID")]
    pub item_id: ItemId,
    #[serde(rename = "Revision")]
    pub revision: Revision,
}

/// One item of a move request, re-encrypted for the destination share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveItemPayload {
    #[serde(rename = "ItemID")]
    pub item_id: ItemId,
    #[serde(rename = "Item")]
    pub item: EncryptedBlob,
}

#[derive(Debug, Deserialize)]
struct ShareKeysPage {
    #[serde(rename = "Keys", default)]
    keys: Vec<EncryptedShareKey>,
    #[serde(rename = "Total", default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(rename = "RevisionsData", default)]
    revisions: Vec<EncryptedItem>,
    #[serde(rename = "LastToken", default)]
    last_token: Option<String>,
}

pub async fn get_share<A: ApiClient>(api: &A, share_id: &ShareId) -> Result<EncryptedShare> {
    let response = api
        .send(ApiRequest::get(format!("pass/v1/share/{share_id}")))
        .await?;
    field(response, "Share")
}

/// Fetch every rotation of a share's key, following pagination.
pub async fn get_share_keys<A: ApiClient>(
    api: &A,
    share_id: &ShareId,
) -> Result<Vec<EncryptedShareKey>> {
    let mut keys = Vec::new();
    let mut page = 0usize;
    loop {
        let response = api
            .send(ApiRequest::get(format!(
                "pass/v1/share/{share_id}/key?Page={page}"
            )))
            .await?;
        let batch: ShareKeysPage = field(response, "ShareKeys")?;
        let received = batch.keys.len();
        keys.extend(batch.keys);
        if received == 0 || keys.len() >= batch.total {
            break;
        }
        page += 1;
    }
    Ok(keys)
}

pub async fn get_latest_event_id<A: ApiClient>(api: &A, share_id: &ShareId) -> Result<EventId> {
    let response = api
        .send(ApiRequest::get(format!("pass/v1/share/{share_id}/event")))
        .await?;
    field(response, "EventID")
}

pub async fn get_events<A: ApiClient>(
    api: &A,
    share_id: &ShareId,
    since: &EventId,
) -> Result<EncryptedEventBatch> {
    let response = api
        .send(ApiRequest::get(format!(
            "pass/v1/share/{share_id}/event/{since}"
        )))
        .await?;
    field(response, "Events")
}

/// Fetch the current revision of every item in a share.
pub async fn get_items<A: ApiClient>(api: &A, share_id: &ShareId) -> Result<Vec<EncryptedItem>> {
    let mut items = Vec::new();
    let mut since: Option<String> = None;
    loop {
        let url = match &since {
            Some(token) => format!("pass/v1/share/{share_id}/item?Since={token}"),
            None => format!("pass/v1/share/{share_id}/item"),
        };
        let page: ItemsPage = field(api.send(ApiRequest::get(url)).await?, "Items")?;
        let received = page.revisions.len();
        items.extend(page.revisions);
        match page.last_token {
            Some(token) if received > 0 => since = Some(token),
            _ => break,
        }
    }
    Ok(items)
}

pub async fn move_items<A: ApiClient>(
    api: &A,
    source: &ShareId,
    destination: &ShareId,
    items: Vec<MoveItemPayload>,
) -> Result<Vec<EncryptedItem>> {
    let response = api
        .send(ApiRequest::put(
            format!("pass/v1/share/{source}/item/share"),
            json!({ "DestinationShareID": destination, "Items": items }),
        ))
        .await?;
    field(response, "Items")
}

pub async fn trash_items<A: ApiClient>(
    api: &A,
    share_id: &ShareId,
    items: Vec<ItemRevisionRef>,
) -> Result<Vec<RevisionUpdate>> {
    let response = api
        .send(ApiRequest::post(
            format!("pass/v1/share/{share_id}/item/trash"),
            json!({ "Items": items }),
        ))
        .await?;
    field(response, "Items")
}

pub async fn restore_items<A: ApiClient>(
    api: &A,
    share_id: &ShareId,
    items: Vec<ItemRevisionRef>,
) -> Result<Vec<RevisionUpdate>> {
    let response = api
        .send(ApiRequest::post(
            format!("pass/v1/share/{share_id}/item/untrash"),
            json!({ "Items": items }),
        ))
        .await?;
    field(response, "Items")
}

pub async fn delete_items<A: ApiClient>(
    api: &A,
    share_id: &ShareId,
    items: Vec<ItemRevisionRef>,
) -> Result<()> {
    api.send(ApiRequest::delete(
        format!("pass/v1/share/{share_id}/item"),
        json!({ "Items": items }),
    ))
    .await?;
    Ok(())
}

fn field<T: DeserializeOwned>(mut response: Value, name: &str) -> Result<T> {
    let value = response
        .get_mut(name)
        .map(Value::take)
        .ok_or_else(|| Error::InvalidInput(format!("API response is missing `{name}`")))?;
    Ok(serde_json::from_value(value)?)
}
