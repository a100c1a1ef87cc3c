use serde::Serialize;

use pass_core::api::ReqwestApiClient;
use pass_core::crypto::{AesGcmProvider, Envelope};
use pass_core::models::TargetType;
use pass_core::storage::{StateCache, StorageBackend};
use pass_core::sync::SyncOutcome;
use pass_core::{NoopObserver, PassClient, PassConfig, ShareId};

use crate::commands::common::Credentials;
use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncReportItem {
    pub share_id: String,
    pub status: &'static str,
    pub upserted: usize,
    pub deleted: usize,
    pub ignored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run_sync(
    shares: &[String],
    as_json: bool,
    config: &PassConfig,
    store: StorageBackend,
) -> Result<(), CliError> {
    let credentials = Credentials::from_env()?;
    let api = ReqwestApiClient::from_config(config)?
        .with_session(credentials.uid.clone(), credentials.access_token);
    let client = PassClient::new(
        api,
        Envelope::new(AesGcmProvider),
        credentials.user_key,
        config,
        NoopObserver,
    );
    let cache = credentials
        .cache_key
        .map(|key| StateCache::new(store, key, &credentials.uid));

    if let Some(cache) = &cache {
        if client.restore(cache).await? {
            tracing::info!("Restored cached vault state");
        }
    }

    for share_id in shares.iter().map(ShareId::new) {
        let known = client
            .with_state(|state| state.share(&share_id).is_some())
            .await;
        if !known {
            client.add_share(&share_id, TargetType::Vault).await?;
        }
    }

    let report: Vec<SyncReportItem> = client
        .poll()
        .await
        .iter()
        .map(|(share_id, outcome)| report_item(share_id, outcome))
        .collect();

    if let Some(cache) = &cache {
        client.persist(cache).await?;
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_empty() {
        println!("No shares to sync.");
    } else {
        for item in &report {
            println!("{}", format_report_line(item));
        }
    }
    Ok(())
}

pub fn report_item(share_id: &ShareId, outcome: &pass_core::Result<SyncOutcome>) -> SyncReportItem {
    let mut item = SyncReportItem {
        share_id: share_id.to_string(),
        status: "applied",
        upserted: 0,
        deleted: 0,
        ignored: 0,
        error: None,
    };
    match outcome {
        Ok(SyncOutcome::Applied(summary)) => {
            item.upserted = summary.upserted;
            item.deleted = summary.deleted;
            item.ignored = summary.ignored;
        }
        Ok(SyncOutcome::AlreadyRunning) => item.status = "already-running",
        Ok(SyncOutcome::FullRefresh) => item.status = "reloaded",
        Ok(SyncOutcome::ShareRemoved) => item.status = "removed",
        Err(error) => {
            item.status = "failed";
            item.error = Some(error.to_string());
        }
    }
    item
}

pub fn format_report_line(item: &SyncReportItem) -> String {
    match (item.status, &item.error) {
        (_, Some(error)) => format!("{}  failed: {error}", item.share_id),
        ("applied", None) => format!(
            "{}  {} updated, {} deleted, {} ignored",
            item.share_id, item.upserted, item.deleted, item.ignored
        ),
        (status, None) => format!("{}  {status}", item.share_id),
    }
}
