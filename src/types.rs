use std::{collections::BTreeMap, path::PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::FORMAT_STRING;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("profile {0} does not exist")]
    ProfileNotFound(String),
    #[error("collected {collected} of {target} post identifiers before the scroll budget ran out")]
    CollectionIncomplete { collected: usize, target: usize },
    #[error("post {id} could not be extracted: {reason}")]
    PostExtractionFailed { id: String, reason: String },
    #[error("persistence: {0}")]
    PersistenceFailed(String),
    #[error("early_termination")]
    EarlyTermination,
}

/// One profile's full tracked state, as persisted between runs. Scalar
/// fields always reflect the latest crawl; only the stats series and the
/// posts map accumulate history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub profile_url: String,
    pub username: String,
    pub description: String,
    pub avatar_url: String,
    pub website: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub profile_stats: Vec<TimestampedStats>,
    pub posts: BTreeMap<String, PostRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub url: String,
    pub images: Vec<ImageVariant>,
    pub is_video: bool,
    pub video_url: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub mentions: Vec<String>,
    pub published_at: Option<String>,
    pub is_multi_image: bool,
    pub stats: Vec<TimestampedPostStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampedStats {
    pub timestamp: i64,
    pub post_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
}

impl TimestampedStats {
    pub fn recorded_at(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampedPostStats {
    pub timestamp: i64,
    pub like_count: Option<u64>,
    pub view_count: Option<u64>,
    pub comment_count: Option<u64>,
}

/// One rendition of a post image, largest usually last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageVariant {
    pub src: String,
    pub width: u32,
    pub height: u32,
}

fn format_timestamp(timestamp: i64) -> String {
    match NaiveDateTime::from_timestamp_opt(timestamp, 0) {
        Some(dt) => dt.format(FORMAT_STRING).to_string(),
        None => timestamp.to_string(),
    }
}

/// Profile-level fields as extracted from the live page in one evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileObservation {
    #[serde(default)]
    pub profile_url: String,
    pub username: String,
    #[serde(default)]
    pub description: String,
    pub avatar_url: String,
    #[serde(default)]
    pub website: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub post_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
}

impl ProfileObservation {
    /// Number of unique post identifiers one run should gather. A private
    /// profile exposes no grid, so its target is zero regardless of the
    /// reported post count.
    pub fn collection_target(&self, limit: Option<usize>) -> usize {
        if self.is_private {
            return 0;
        }
        let available = self.post_count as usize;
        match limit {
            Some(limit) => available.min(limit),
            None => available,
        }
    }
}

/// Post-level fields as extracted from one post page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostObservation {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub images: Vec<ImageVariant>,
    pub is_video: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    pub is_multi_image: bool,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
}

/// Outcome of one full run, handed back after the dataset file was written.
#[derive(Debug)]
pub struct RunReport {
    pub record: ProfileRecord,
    pub output_file: PathBuf,
    pub collected: usize,
    pub target: usize,
    pub warnings: Vec<CrawlError>,
}
