use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::{
    browser_controller::BrowserController,
    collector::collect_post_ids,
    snapshot::assemble,
    store::{self, OutputFormat},
    types::{CrawlError, RunReport},
    utils::get_unix_timestamp,
};

pub struct Runner {
    options: RunnerOptions,
    should_terminate: Arc<AtomicBool>,
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct RunnerOptions {
    // directory the dataset files are read from and written to
    #[builder(default = "self.default_data_dir()")]
    data_dir: PathBuf,
    // on-disk format of the dataset written at the end of the run
    #[builder(default)]
    output: OutputFormat,
    // cap on the number of post identifiers collected this run
    #[builder(default)]
    limit: Option<usize>,
    // visible browser window when false
    #[builder(default = "true")]
    headless: bool,
    // maximum time the browser will wait for an event before timing out
    #[builder(default = "45")]
    browser_timeout: u64,
    // minimum wait time after navigation in seconds
    #[builder(default = "3")]
    min_wait_after_navigation: u64,
    // maximum wait time after navigation in seconds
    #[builder(default = "6")]
    max_wait_after_navigation: u64,
    // hard cap on scroll steps while collecting post links
    #[builder(default = "50")]
    max_scroll_rounds: u32,
    // consecutive scroll steps without a new link before giving up
    #[builder(default = "3")]
    max_stalled_rounds: u32,
    // whether a dataset is still written when fewer posts than requested were found
    #[builder(default = "true")]
    allow_partial_collection: bool,
}

impl RunnerOptions {
    pub fn default_builder() -> RunnerOptionsBuilder {
        RunnerOptionsBuilder::default()
    }
}

impl RunnerOptionsBuilder {
    fn default_data_dir(&self) -> PathBuf {
        PathBuf::from(".")
    }
}

impl Runner {
    pub fn new(options: RunnerOptions) -> Result<Self> {
        let should_terminate = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?;

        Ok(Runner {
            options,
            should_terminate,
        })
    }

    /// One full run: load the prior dataset, observe the live profile,
    /// collect post identifiers, merge every fetched post and persist the
    /// combined record. Nothing is written unless the whole run completes.
    pub async fn run(&self, username: &str) -> Result<RunReport> {
        let timestamp = get_unix_timestamp().as_secs() as i64;

        let prior = store::load(&self.options.data_dir, username)?;
        match &prior {
            Some(record) => info!(
                "prior dataset found with {} stats entries and {} posts",
                record.profile_stats.len(),
                record.posts.len()
            ),
            None => info!("no prior dataset for {}, starting fresh", username),
        }

        let browser = BrowserController::new(
            self.options.headless,
            self.options.browser_timeout,
            self.options.min_wait_after_navigation,
            self.options.max_wait_after_navigation,
        )?;

        let mut profile_page = browser.open_profile(username).await?;
        if !profile_page.exists()? {
            return Err(CrawlError::ProfileNotFound(username.to_string()).into());
        }

        let observation = profile_page
            .observe()
            .context("could not extract profile info")?;
        let target = observation.collection_target(self.options.limit);
        info!(
            "profile {} reports {} posts, collecting {}",
            username, observation.post_count, target
        );

        let collection = collect_post_ids(
            &mut profile_page,
            target,
            self.options.max_scroll_rounds,
            self.options.max_stalled_rounds,
            &self.should_terminate,
        )
        .await?;

        let mut warnings = Vec::new();
        if !collection.is_complete() {
            let incomplete = CrawlError::CollectionIncomplete {
                collected: collection.ids.len(),
                target: collection.target,
            };
            if !self.options.allow_partial_collection {
                return Err(incomplete.into());
            }
            warn!("{}, proceeding with the partial set", incomplete);
            warnings.push(incomplete);
        }

        let mut source = browser.post_source();
        let assembled = assemble(
            prior,
            &observation,
            &collection.ids,
            &mut source,
            timestamp,
            &self.should_terminate,
        )
        .await?;
        warnings.extend(assembled.warnings);

        // a run interrupted at any suspension point must not touch the file
        if self.should_terminate.load(Ordering::Relaxed) {
            return Err(CrawlError::EarlyTermination.into());
        }

        let output_file = store::save(
            &self.options.data_dir,
            username,
            &assembled.record,
            self.options.output,
        )?;
        info!(
            "dataset for {} written to {}, last entry at {}",
            username,
            output_file.display(),
            assembled
                .record
                .profile_stats
                .last()
                .map(|s| s.recorded_at())
                .unwrap_or_default()
        );

        Ok(RunReport {
            collected: collection.ids.len(),
            target: collection.target,
            record: assembled.record,
            output_file,
            warnings,
        })
    }
}
