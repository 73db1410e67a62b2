//! One dispatch run: fetch, filter, deliver at most one post.

use chrono::Utc;
use media_resolver::classify_post;
use relay_core::{
    CandidatePost, ConfigStore, ContentFetcher, CoreError, DedupLedger, Dispatcher, ErrorExt,
    MediaFetcher, MediaKind, ResolvedMedia, RunOutcome, SourceConfig, VideoResolver,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Formats a score with comma thousands separators.
pub fn format_score(score: i64) -> String {
    let digits = score.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if score < 0 {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn format_caption(subreddit: &str, title: &str, score: i64) -> String {
    format!(
        "From r/{}: {}\nUpvotes: {}",
        subreddit,
        title,
        format_score(score)
    )
}

type ClaimedPosts = Arc<Mutex<HashSet<String>>>;

fn lock(posts: &ClaimedPosts) -> MutexGuard<'_, HashSet<String>> {
    posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds a post id from the dedup check until its delivery is recorded.
struct PostClaim {
    posts: ClaimedPosts,
    post_id: String,
}

impl Drop for PostClaim {
    fn drop(&mut self) {
        lock(&self.posts).remove(&self.post_id);
    }
}

pub struct DispatchPipeline {
    fetcher: Arc<dyn ContentFetcher>,
    ledger: Arc<dyn DedupLedger>,
    store: Arc<dyn ConfigStore>,
    resolver: Arc<dyn VideoResolver>,
    downloader: Arc<dyn MediaFetcher>,
    dispatcher: Arc<dyn Dispatcher>,
    fetch_limit: u32,
    claimed: ClaimedPosts,
}

impl DispatchPipeline {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        ledger: Arc<dyn DedupLedger>,
        store: Arc<dyn ConfigStore>,
        resolver: Arc<dyn VideoResolver>,
        downloader: Arc<dyn MediaFetcher>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            store,
            resolver,
            downloader,
            dispatcher,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_fetch_limit(mut self, fetch_limit: u32) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    pub fn fetch_limit(&self) -> u32 {
        self.fetch_limit
    }

    /// Runs the pipeline once for `config`.
    ///
    /// A failed fetch or dedup lookup aborts the run before `last_check` is
    /// touched. Once iteration completes `last_check` is always updated, and a
    /// failure to record a delivered post is still returned as an error.
    pub async fn run(&self, config: &SourceConfig) -> Result<RunOutcome, CoreError> {
        let subreddit = config.subreddit_name.as_str();
        info!(
            "Checking r/{} ({}, up to {} posts)",
            subreddit, config.ranking_window, self.fetch_limit
        );

        let mut candidates = self
            .fetcher
            .fetch_top(subreddit, config.ranking_window, self.fetch_limit)
            .await?;
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        debug!("Fetched {} candidates from r/{}", candidates.len(), subreddit);

        let claim = self.deliver_first_eligible(subreddit, &candidates).await?;

        let recorded = match &claim {
            Some(claim) => self.ledger.record(&claim.post_id, subreddit).await.map(|_| ()),
            None => Ok(()),
        };
        let delivered = claim.as_ref().map(|claim| claim.post_id.clone());
        drop(claim);
        if let Err(e) = &recorded {
            error!(
                "Post {} was delivered but could not be recorded; it may be sent again",
                delivered.as_deref().unwrap_or_default()
            );
            e.log_error();
        }

        let touched = self.store.touch_last_check(config.id, Utc::now()).await;
        recorded?;
        touched?;

        Ok(match delivered {
            Some(post_id) => {
                info!("Delivered post {} from r/{}", post_id, subreddit);
                RunOutcome::Delivered { post_id }
            }
            None => {
                info!("No suitable new media found in r/{}", subreddit);
                RunOutcome::NoEligibleContent
            }
        })
    }

    /// Claims `post_id` unless another run is already delivering it.
    fn claim_post(&self, post_id: &str) -> Option<PostClaim> {
        if !lock(&self.claimed).insert(post_id.to_string()) {
            return None;
        }
        Some(PostClaim {
            posts: self.claimed.clone(),
            post_id: post_id.to_string(),
        })
    }

    /// Walks candidates in order and returns the claim on the first one sent.
    async fn deliver_first_eligible(
        &self,
        subreddit: &str,
        candidates: &[CandidatePost],
    ) -> Result<Option<PostClaim>, CoreError> {
        for post in candidates {
            debug!("Inspecting post {} (score {})", post.id, post.score);

            let Some(claim) = self.claim_post(&post.id) else {
                debug!("Skipping post {}: another run is delivering it", post.id);
                continue;
            };

            if self.ledger.is_duplicate(&post.id).await? {
                debug!("Skipping post {}: already sent", post.id);
                continue;
            }

            let Some(kind) = classify_post(post) else {
                debug!("Skipping post {}: not an image or video ({})", post.id, post.url);
                continue;
            };

            let Some(media) = self.prepare_media(post, kind).await else {
                continue;
            };

            let caption = format_caption(subreddit, &post.title, post.score);
            if let Err(e) = self
                .dispatcher
                .deliver(&media.local_path, media.kind, &caption)
                .await
            {
                warn!("Skipping post {}: delivery failed: {}", post.id, e);
                continue;
            }

            debug!("Sent {} from {}", media.local_path.display(), media.url);
            return Ok(Some(claim));
        }

        Ok(None)
    }

    /// Resolves and downloads the post's media, logging why when it cannot.
    async fn prepare_media(&self, post: &CandidatePost, kind: MediaKind) -> Option<ResolvedMedia> {
        let url = match kind {
            MediaKind::Image => post.url.clone(),
            MediaKind::Video => match self.resolver.resolve_video_url(post).await {
                Some(url) => url,
                None => {
                    warn!("Skipping post {}: could not resolve video URL", post.id);
                    return None;
                }
            },
        };

        match self.downloader.download(&url, &post.id, kind).await {
            Ok(local_path) => Some(ResolvedMedia {
                kind,
                url,
                local_path,
            }),
            Err(e) => {
                warn!("Skipping post {}: download failed: {}", post.id, e);
                None
            }
        }
    }
}
