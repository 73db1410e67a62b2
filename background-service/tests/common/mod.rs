#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{
    CandidatePost, ConfigId, ConfigStore, ContentFetcher, CoreError, DedupLedger, DeliveryError,
    DeliveryRecord, Dispatcher, MediaDescriptor, MediaError, MediaFetcher, MediaKind,
    NewSourceConfig, RankingWindow, RedditApiError, SourceConfig, SourceConfigUpdate,
    VideoResolver,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub fn image_post(id: &str, score: i64) -> CandidatePost {
    CandidatePost {
        id: id.to_string(),
        title: format!("Post {}", id),
        url: format!("https://i.redd.it/{}.jpg", id),
        score,
        is_video: Some(false),
        media: None,
    }
}

pub fn text_post(id: &str, score: i64) -> CandidatePost {
    CandidatePost {
        id: id.to_string(),
        title: format!("Discussion {}", id),
        url: format!("https://www.reddit.com/r/test/comments/{}/", id),
        score,
        is_video: Some(false),
        media: None,
    }
}

pub fn video_post(id: &str, score: i64, fallback_url: Option<&str>) -> CandidatePost {
    CandidatePost {
        id: id.to_string(),
        title: format!("Clip {}", id),
        url: format!("https://v.redd.it/{}", id),
        score,
        is_video: Some(true),
        media: Some(MediaDescriptor {
            fallback_url: fallback_url.map(str::to_string),
        }),
    }
}

pub fn config(id: ConfigId, subreddit: &str) -> SourceConfig {
    SourceConfig {
        id,
        subreddit_name: subreddit.to_string(),
        ranking_window: RankingWindow::Day,
        frequency_minutes: 30,
        is_active: true,
        last_check: None,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub posts: Mutex<Vec<CandidatePost>>,
    /// Listings for specific subreddits; others get `posts`.
    pub by_subreddit: Mutex<HashMap<String, Vec<CandidatePost>>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    /// When set, every fetch waits for a notification before returning.
    pub gate: Option<Arc<Notify>>,
}

impl FakeFetcher {
    pub fn with_posts(posts: Vec<CandidatePost>) -> Self {
        Self {
            posts: Mutex::new(posts),
            ..Default::default()
        }
    }

    pub fn gated(posts: Vec<CandidatePost>, gate: Arc<Notify>) -> Self {
        Self {
            posts: Mutex::new(posts),
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn set_listing(&self, subreddit: &str, posts: Vec<CandidatePost>) {
        self.by_subreddit
            .lock()
            .unwrap()
            .insert(subreddit.to_string(), posts);
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch_top(
        &self,
        subreddit: &str,
        _window: RankingWindow,
        _limit: u32,
    ) -> Result<Vec<CandidatePost>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            }
            .into());
        }
        if let Some(posts) = self.by_subreddit.lock().unwrap().get(subreddit) {
            return Ok(posts.clone());
        }
        Ok(self.posts.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    pub records: Mutex<Vec<DeliveryRecord>>,
    pub fail_record: AtomicBool,
}

impl MemoryLedger {
    pub fn seeded(post_ids: &[&str]) -> Self {
        let ledger = Self::default();
        for id in post_ids {
            ledger.records.lock().unwrap().push(DeliveryRecord {
                id: Uuid::new_v4(),
                post_id: id.to_string(),
                subreddit_name: "seed".to_string(),
                sent_at: Utc::now(),
            });
        }
        ledger
    }

    pub fn recorded_ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.post_id.clone())
            .collect()
    }
}

#[async_trait]
impl DedupLedger for MemoryLedger {
    async fn is_duplicate(&self, post_id: &str) -> Result<bool, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.post_id == post_id))
    }

    async fn record(
        &self,
        post_id: &str,
        subreddit_name: &str,
    ) -> Result<DeliveryRecord, CoreError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(CoreError::Internal {
                message: "ledger offline".to_string(),
            });
        }
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            post_id: post_id.to_string(),
            subreddit_name: subreddit_name.to_string(),
            sent_at: Utc::now(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn recent_deliveries(&self, limit: u32) -> Result<Vec<DeliveryRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub configs: Mutex<HashMap<ConfigId, SourceConfig>>,
    pub touches: Mutex<Vec<(ConfigId, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn with_configs(configs: Vec<SourceConfig>) -> Self {
        let store = Self::default();
        for config in configs {
            store.configs.lock().unwrap().insert(config.id, config);
        }
        store
    }

    pub fn touch_count(&self, id: ConfigId) -> usize {
        self.touches
            .lock()
            .unwrap()
            .iter()
            .filter(|(touched, _)| *touched == id)
            .count()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_configs(&self) -> Result<Vec<SourceConfig>, CoreError> {
        let mut configs: Vec<_> = self.configs.lock().unwrap().values().cloned().collect();
        configs.sort_by_key(|c| c.id);
        Ok(configs)
    }

    async fn list_active_configs(&self) -> Result<Vec<SourceConfig>, CoreError> {
        Ok(self
            .list_configs()
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect())
    }

    async fn get_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError> {
        Ok(self.configs.lock().unwrap().get(&id).cloned())
    }

    async fn create_config(&self, new: &NewSourceConfig) -> Result<SourceConfig, CoreError> {
        let mut configs = self.configs.lock().unwrap();
        let id = configs.keys().max().copied().unwrap_or(0) + 1;
        let config = SourceConfig {
            id,
            subreddit_name: new.subreddit_name.clone(),
            ranking_window: new.ranking_window,
            frequency_minutes: new.frequency_minutes,
            is_active: true,
            last_check: None,
            created_at: Utc::now(),
        };
        configs.insert(id, config.clone());
        Ok(config)
    }

    async fn update_config(
        &self,
        id: ConfigId,
        update: &SourceConfigUpdate,
    ) -> Result<Option<SourceConfig>, CoreError> {
        let mut configs = self.configs.lock().unwrap();
        Ok(configs.get_mut(&id).map(|config| {
            config.ranking_window = update.ranking_window;
            config.frequency_minutes = update.frequency_minutes;
            config.clone()
        }))
    }

    async fn toggle_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError> {
        let mut configs = self.configs.lock().unwrap();
        Ok(configs.get_mut(&id).map(|config| {
            config.is_active = !config.is_active;
            config.clone()
        }))
    }

    async fn delete_config(&self, id: ConfigId) -> Result<bool, CoreError> {
        Ok(self.configs.lock().unwrap().remove(&id).is_some())
    }

    async fn touch_last_check(&self, id: ConfigId, at: DateTime<Utc>) -> Result<(), CoreError> {
        if let Some(config) = self.configs.lock().unwrap().get_mut(&id) {
            config.last_check = Some(at);
        }
        self.touches.lock().unwrap().push((id, at));
        Ok(())
    }
}

/// Native videos resolve to their fallback URL, everything else to the post URL.
pub struct FakeResolver;

#[async_trait]
impl VideoResolver for FakeResolver {
    async fn resolve_video_url(&self, post: &CandidatePost) -> Option<String> {
        if post.is_native_video() {
            post.media.as_ref().and_then(|m| m.fallback_url.clone())
        } else {
            Some(post.url.clone())
        }
    }
}

/// Fails for any URL containing "broken".
#[derive(Default)]
pub struct FakeDownloader {
    pub downloads: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaFetcher for FakeDownloader {
    async fn download(
        &self,
        url: &str,
        post_id: &str,
        kind: MediaKind,
    ) -> Result<PathBuf, CoreError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if url.contains("broken") {
            return Err(MediaError::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            }
            .into());
        }
        Ok(PathBuf::from(kind.directory()).join(format!("{}{}", post_id, kind.default_extension())))
    }
}

/// Rejects any file whose name contains one of `reject_ids`.
#[derive(Default)]
pub struct FakeDispatcher {
    pub sent: Mutex<Vec<(PathBuf, MediaKind, String)>>,
    pub reject_ids: Vec<String>,
    /// Time each delivery takes.
    pub delay: Option<Duration>,
}

impl FakeDispatcher {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            reject_ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn deliver(&self, path: &Path, kind: MediaKind, caption: &str) -> Result<(), CoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let name = path.to_string_lossy();
        if self.reject_ids.iter().any(|id| name.contains(id.as_str())) {
            return Err(DeliveryError::HttpStatus { status_code: 502 }.into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((path.to_path_buf(), kind, caption.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub fetcher: Arc<FakeFetcher>,
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryStore>,
    pub downloader: Arc<FakeDownloader>,
    pub dispatcher: Arc<FakeDispatcher>,
}

impl Harness {
    pub fn new(fetcher: FakeFetcher, ledger: MemoryLedger, dispatcher: FakeDispatcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            ledger: Arc::new(ledger),
            store: Arc::new(MemoryStore::with_configs(vec![config(1, "pics")])),
            downloader: Arc::new(FakeDownloader::default()),
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn pipeline(&self) -> background_service::DispatchPipeline {
        background_service::DispatchPipeline::new(
            self.fetcher.clone(),
            self.ledger.clone(),
            self.store.clone(),
            Arc::new(FakeResolver),
            self.downloader.clone(),
            self.dispatcher.clone(),
        )
    }
}
