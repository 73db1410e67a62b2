//! Seams between the dispatch pipeline and its collaborators.
//!
//! Each external system the pipeline talks to sits behind one of these
//! traits so runs can be composed from real clients in the binary and from
//! in-memory fakes in tests.

use crate::{
    CandidatePost, ConfigId, CoreError, DeliveryRecord, MediaKind, NewSourceConfig,
    RankingWindow, SourceConfig, SourceConfigUpdate, SubredditSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Pulls ranked candidate posts for one source.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_top(
        &self,
        subreddit: &str,
        window: RankingWindow,
        limit: u32,
    ) -> Result<Vec<CandidatePost>, CoreError>;
}

/// Read-only listing of sources for the admin search box.
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    async fn search_sources(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SubredditSummary>, CoreError>;
}

/// Durable set of already delivered post ids.
///
/// `record` does not enforce uniqueness; callers check `is_duplicate` right
/// before sending and never run two dispatches for the same config at once.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn is_duplicate(&self, post_id: &str) -> Result<bool, CoreError>;

    async fn record(&self, post_id: &str, subreddit_name: &str)
        -> Result<DeliveryRecord, CoreError>;

    /// Newest first.
    async fn recent_deliveries(&self, limit: u32) -> Result<Vec<DeliveryRecord>, CoreError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list_configs(&self) -> Result<Vec<SourceConfig>, CoreError>;

    async fn list_active_configs(&self) -> Result<Vec<SourceConfig>, CoreError>;

    async fn get_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError>;

    async fn create_config(&self, new: &NewSourceConfig) -> Result<SourceConfig, CoreError>;

    async fn update_config(
        &self,
        id: ConfigId,
        update: &SourceConfigUpdate,
    ) -> Result<Option<SourceConfig>, CoreError>;

    /// Flips `is_active` and returns the updated config.
    async fn toggle_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError>;

    /// Returns false when no config had this id.
    async fn delete_config(&self, id: ConfigId) -> Result<bool, CoreError>;

    async fn touch_last_check(&self, id: ConfigId, at: DateTime<Utc>) -> Result<(), CoreError>;
}

/// Turns a video candidate into a directly downloadable URL.
///
/// Resolution failures are logged by the implementation and reported as
/// `None`; they never abort a run.
#[async_trait]
pub trait VideoResolver: Send + Sync {
    async fn resolve_video_url(&self, post: &CandidatePost) -> Option<String>;
}

/// Downloads a resolved media URL to local storage.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn download(
        &self,
        url: &str,
        post_id: &str,
        kind: MediaKind,
    ) -> Result<PathBuf, CoreError>;
}

/// Delivers a local media file with a caption to the downstream channel.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn deliver(&self, path: &Path, kind: MediaKind, caption: &str)
        -> Result<(), CoreError>;
}
