use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub type ConfigId = i64;

/// Time span the upstream ranking is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RankingWindow {
    Day,
    Week,
    Month,
    Year,
}

impl RankingWindow {
    /// Name used by the admin API and the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingWindow::Day => "top_day",
            RankingWindow::Week => "top_week",
            RankingWindow::Month => "top_month",
            RankingWindow::Year => "top_year",
        }
    }

    /// Value of Reddit's `t` query parameter.
    pub fn time_filter(&self) -> &'static str {
        match self {
            RankingWindow::Day => "day",
            RankingWindow::Week => "week",
            RankingWindow::Month => "month",
            RankingWindow::Year => "year",
        }
    }

    /// Unknown names fall back to the yearly window.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim() {
            "top_day" | "day" => RankingWindow::Day,
            "top_week" | "week" => RankingWindow::Week,
            "top_month" | "month" => RankingWindow::Month,
            _ => RankingWindow::Year,
        }
    }
}

impl From<String> for RankingWindow {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<RankingWindow> for String {
    fn from(value: RankingWindow) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RankingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: ConfigId,
    pub subreddit_name: String,
    #[serde(rename = "filter_type")]
    pub ranking_window: RankingWindow,
    #[serde(rename = "frequency")]
    pub frequency_minutes: u32,
    pub is_active: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SourceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.frequency_minutes) * 60)
    }
}

/// Fields supplied when a config is created.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSourceConfig {
    pub subreddit_name: String,
    #[serde(rename = "filter_type")]
    pub ranking_window: RankingWindow,
    #[serde(rename = "frequency")]
    pub frequency_minutes: u32,
}

/// Fields an edit may change.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SourceConfigUpdate {
    #[serde(rename = "filter_type")]
    pub ranking_window: RankingWindow,
    #[serde(rename = "frequency")]
    pub frequency_minutes: u32,
}

/// Reddit's `media.reddit_video` block, reduced to what playback needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePost {
    pub id: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub is_video: Option<bool>,
    pub media: Option<MediaDescriptor>,
}

impl CandidatePost {
    pub fn is_native_video(&self) -> bool {
        self.is_video.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub post_id: String,
    pub subreddit_name: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn directory(&self) -> &'static str {
        match self {
            MediaKind::Image => "pics",
            MediaKind::Video => "videos",
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => ".jpg",
            MediaKind::Video => ".mp4",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub kind: MediaKind,
    pub url: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Delivered { post_id: String },
    NoEligibleContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubredditSummary {
    pub name: String,
    pub title: String,
    pub subscribers: Option<u64>,
    pub over18: bool,
}
