use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;

use crate::{
    series,
    types::{
        CrawlError, PostObservation, PostRecord, ProfileObservation, ProfileRecord,
        TimestampedPostStats, TimestampedStats,
    },
};

/// Fetches the current observation for one post page. Implemented by the
/// browser controller and by in-memory fixtures in tests.
#[async_trait]
pub trait PostSource {
    async fn fetch(&mut self, identifier: &str) -> Result<PostObservation>;
}

/// The merged record of one run plus the non-fatal per-post failures that
/// were skipped along the way.
#[derive(Debug)]
pub struct Assembled {
    pub record: ProfileRecord,
    pub warnings: Vec<CrawlError>,
}

/// Folds a fresh profile observation into the prior record. Scalar fields
/// are overwritten, the stats series grows by exactly one entry and the
/// previously known posts are carried forward untouched as the starting
/// point for the per-post merge.
pub fn merge_profile(
    prior: Option<&ProfileRecord>,
    observation: &ProfileObservation,
    timestamp: i64,
) -> ProfileRecord {
    ProfileRecord {
        profile_url: observation.profile_url.clone(),
        username: observation.username.clone(),
        description: observation.description.clone(),
        avatar_url: observation.avatar_url.clone(),
        website: observation.website.clone(),
        is_private: observation.is_private,
        is_verified: observation.is_verified,
        profile_stats: series::append(
            prior.map(|p| p.profile_stats.clone()),
            TimestampedStats {
                timestamp,
                post_count: observation.post_count,
                follower_count: observation.follower_count,
                following_count: observation.following_count,
            },
        ),
        posts: prior.map(|p| p.posts.clone()).unwrap_or_default(),
    }
}

/// Folds a fresh post observation into that post's prior record. Content
/// fields always reflect the latest crawl; only the stats series is
/// historical. Video-only fields are dropped for non-video posts.
pub fn merge_post(
    prior: Option<&PostRecord>,
    observation: &PostObservation,
    timestamp: i64,
) -> PostRecord {
    let is_video = observation.is_video;
    PostRecord {
        url: observation.url.clone(),
        images: observation.images.clone(),
        is_video,
        video_url: if is_video {
            observation.video_url.clone()
        } else {
            None
        },
        description: observation.description.clone(),
        tags: observation.tags.iter().unique().cloned().collect(),
        mentions: observation.mentions.iter().unique().cloned().collect(),
        published_at: observation.published_at.clone(),
        is_multi_image: observation.is_multi_image,
        stats: series::append(
            prior.map(|p| p.stats.clone()),
            TimestampedPostStats {
                timestamp,
                like_count: observation.like_count,
                view_count: if is_video { observation.view_count } else { None },
                comment_count: observation.comment_count,
            },
        ),
    }
}

/// Runs the per-post half of one run: merges the profile, then fetches and
/// merges every discovered post strictly in discovery order. A post whose
/// page yields no usable data is skipped with a warning and its prior
/// history stays as it was; posts not rediscovered this run are left
/// untouched.
pub async fn assemble<S>(
    prior: Option<ProfileRecord>,
    observation: &ProfileObservation,
    identifiers: &[String],
    source: &mut S,
    timestamp: i64,
    should_terminate: &Arc<AtomicBool>,
) -> Result<Assembled>
where
    S: PostSource + Send,
{
    let mut record = merge_profile(prior.as_ref(), observation, timestamp);
    let mut warnings = Vec::new();

    for identifier in identifiers {
        if should_terminate.load(Ordering::Relaxed) {
            return Err(CrawlError::EarlyTermination.into());
        }
        match source.fetch(identifier).await {
            Ok(post_observation) => {
                let merged = merge_post(record.posts.get(identifier), &post_observation, timestamp);
                record.posts.insert(identifier.clone(), merged);
            }
            Err(e) => {
                warn!("skipping post {}: {}", identifier, e);
                warnings.push(CrawlError::PostExtractionFailed {
                    id: identifier.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(Assembled { record, warnings })
}
