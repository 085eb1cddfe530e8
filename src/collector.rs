use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{types::CrawlError, utils::post_identifier};

/// Supplies the candidate links currently rendered by the content grid and
/// triggers the next pagination step. Both operations may suspend while the
/// page settles.
#[async_trait]
pub trait PaginationDriver {
    async fn current_candidate_links(&mut self) -> Result<Vec<String>>;
    async fn advance(&mut self) -> Result<()>;
}

/// Deduplicating set of post identifiers, bounded by the collection target.
/// Membership is unordered but iteration keeps first-seen order, which is
/// the order posts are fetched in later.
#[derive(Debug)]
pub struct PostIdentitySet {
    target: usize,
    order: Vec<String>,
    seen: HashSet<String>,
}

impl PostIdentitySet {
    pub fn new(target: usize) -> Self {
        PostIdentitySet {
            target,
            order: Vec::with_capacity(target),
            seen: HashSet::with_capacity(target),
        }
    }

    /// Adds the identifier unless it is already present or the target has
    /// been reached. Returns whether the set grew.
    pub fn offer(&mut self, identifier: &str) -> bool {
        if self.is_satisfied() || self.seen.contains(identifier) {
            return false;
        }
        self.seen.insert(identifier.to_string());
        self.order.push(identifier.to_string());
        true
    }

    pub fn is_satisfied(&self) -> bool {
        self.order.len() >= self.target
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Identifiers in discovery order.
    pub fn identifiers(&self) -> &[String] {
        &self.order
    }

    pub fn into_identifiers(self) -> Vec<String> {
        self.order
    }
}

/// What one collection pass produced. `ids` keep discovery order; the pass
/// is complete when the target was reached within the budgets.
#[derive(Debug)]
pub struct Collection {
    pub ids: Vec<String>,
    pub target: usize,
    pub rounds: u32,
}

impl Collection {
    pub fn is_complete(&self) -> bool {
        self.ids.len() >= self.target
    }
}

/// Collects up to `target` unique post identifiers from the paginated grid.
///
/// Each round reads the currently visible candidates, folds the unseen ones
/// into the set and scrolls once. The grid re-renders from the top after a
/// scroll, so batches repeat earlier links. The loop stops when the target
/// is reached, when `max_rounds` scroll steps have been spent, or after
/// `max_stalled_rounds` consecutive rounds without a new identifier; a grid
/// that stops yielding links must not keep the run alive forever. The
/// partial result is returned either way and the caller decides whether an
/// incomplete collection aborts the run.
pub async fn collect_post_ids<D>(
    driver: &mut D,
    target: usize,
    max_rounds: u32,
    max_stalled_rounds: u32,
    should_terminate: &Arc<AtomicBool>,
) -> Result<Collection>
where
    D: PaginationDriver + Send,
{
    let mut set = PostIdentitySet::new(target);
    let mut rounds = 0u32;
    let mut stalled = 0u32;

    while !set.is_satisfied() {
        if should_terminate.load(Ordering::Relaxed) {
            return Err(CrawlError::EarlyTermination.into());
        }
        if rounds >= max_rounds {
            warn!(
                "scroll budget of {} rounds spent, stopping collection at {} of {}",
                max_rounds,
                set.len(),
                target
            );
            break;
        }
        if stalled >= max_stalled_rounds {
            warn!(
                "no new post links after {} rounds, assuming the grid is exhausted",
                stalled
            );
            break;
        }

        let links = driver
            .current_candidate_links()
            .await
            .context("could not read candidate links from the grid")?;
        let before = set.len();
        for link in &links {
            if let Some(id) = post_identifier(link) {
                set.offer(&id);
            }
        }
        debug!(
            "round {}: {} candidates, {} identifiers collected",
            rounds + 1,
            links.len(),
            set.len()
        );
        if set.len() == before {
            stalled += 1;
        } else {
            stalled = 0;
        }
        rounds += 1;

        if set.is_satisfied() {
            break;
        }
        driver
            .advance()
            .await
            .context("could not advance the grid to the next batch")?;
    }

    Ok(Collection {
        ids: set.into_identifiers(),
        target,
        rounds,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    struct ScriptedGrid {
        batches: Vec<Vec<String>>,
        cursor: usize,
        link_reads: u32,
        advances: u32,
    }

    impl ScriptedGrid {
        fn new(batches: Vec<Vec<String>>) -> Self {
            ScriptedGrid {
                batches,
                cursor: 0,
                link_reads: 0,
                advances: 0,
            }
        }
    }

    #[async_trait]
    impl PaginationDriver for ScriptedGrid {
        async fn current_candidate_links(&mut self) -> Result<Vec<String>> {
            self.link_reads += 1;
            Ok(self.batches.get(self.cursor).cloned().unwrap_or_default())
        }

        async fn advance(&mut self) -> Result<()> {
            self.advances += 1;
            if self.cursor + 1 < self.batches.len() {
                self.cursor += 1;
            }
            Ok(())
        }
    }

    fn links(batch: &[&str]) -> Vec<String> {
        batch.iter().map(|s| s.to_string()).collect()
    }

    fn no_terminate() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn offer_rejects_duplicates_and_overflow() {
        let mut set = PostIdentitySet::new(2);
        assert!(set.offer("a"));
        assert!(!set.offer("a"));
        assert!(set.offer("b"));
        assert!(set.is_satisfied());
        assert!(!set.offer("c"));
        assert_eq!(set.identifiers(), ["a", "b"]);
    }

    #[tokio::test]
    async fn dedupes_across_repeating_batches_and_keeps_discovery_order() {
        let mut grid = ScriptedGrid::new(vec![
            links(&["/p/a/", "/p/b/"]),
            links(&["/p/a/", "/p/b/", "/p/c/"]),
        ]);
        let collection = collect_post_ids(&mut grid, 3, 10, 3, &no_terminate())
            .await
            .unwrap();
        assert!(collection.is_complete());
        assert_eq!(collection.ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn never_exceeds_the_target() {
        let mut grid = ScriptedGrid::new(vec![links(&[
            "/p/a/", "/p/b/", "/p/c/", "/p/d/", "/p/e/",
        ])]);
        let collection = collect_post_ids(&mut grid, 2, 10, 3, &no_terminate())
            .await
            .unwrap();
        assert_eq!(collection.ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn zero_target_never_touches_the_grid() {
        let mut grid = ScriptedGrid::new(vec![links(&["/p/a/"])]);
        let collection = collect_post_ids(&mut grid, 0, 10, 3, &no_terminate())
            .await
            .unwrap();
        assert!(collection.is_complete());
        assert!(collection.ids.is_empty());
        assert_eq!(grid.link_reads, 0);
        assert_eq!(grid.advances, 0);
    }

    #[tokio::test]
    async fn stalled_grid_returns_a_partial_collection() {
        // pagination never yields anything beyond the first batch
        let mut grid = ScriptedGrid::new(vec![links(&["/p/a/", "/p/b/"])]);
        let collection = collect_post_ids(&mut grid, 5, 100, 3, &no_terminate())
            .await
            .unwrap();
        assert!(!collection.is_complete());
        assert_eq!(collection.ids, vec!["a", "b"]);
        assert!(collection.rounds < 100);
    }

    #[tokio::test]
    async fn round_budget_bounds_the_loop() {
        // one unseen link per round, slower than the target needs
        let batches: Vec<Vec<String>> = (0..50)
            .map(|i| vec![format!("/p/post{}/", i)])
            .collect();
        let mut grid = ScriptedGrid::new(batches);
        let collection = collect_post_ids(&mut grid, 50, 4, 10, &no_terminate())
            .await
            .unwrap();
        assert!(!collection.is_complete());
        assert_eq!(collection.rounds, 4);
        assert_eq!(collection.ids.len(), 4);
    }

    #[tokio::test]
    async fn non_post_links_are_ignored() {
        let mut grid = ScriptedGrid::new(vec![links(&[
            "/explore/tags/sunset/",
            "/p/a/",
            "/accounts/login/",
        ])]);
        let collection = collect_post_ids(&mut grid, 1, 10, 3, &no_terminate())
            .await
            .unwrap();
        assert_eq!(collection.ids, vec!["a"]);
    }

    #[tokio::test]
    async fn termination_flag_stops_collection() {
        let mut grid = ScriptedGrid::new(vec![links(&["/p/a/"])]);
        let flag = Arc::new(AtomicBool::new(true));
        let err = collect_post_ids(&mut grid, 3, 10, 3, &flag)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrawlError>(),
            Some(CrawlError::EarlyTermination)
        ));
        assert_eq!(grid.link_reads, 0);
    }
}
