use std::{ffi::OsStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{browser::default_executable, Browser, LaunchOptions, Tab};
use rand::Rng;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::time::sleep;
use tokio_retry::{strategy::FixedInterval, Retry};

use crate::{
    collector::PaginationDriver,
    extractor,
    snapshot::PostSource,
    types::{PostObservation, ProfileObservation},
    utils::{jitter, post_url, profile_url},
};

pub struct BrowserController {
    browser: Browser,
    min_wait_secs: u64,
    max_wait_secs: u64,
}

impl BrowserController {
    pub fn new(
        headless: bool,
        timeout: u64,
        min_wait_secs: u64,
        max_wait_secs: u64,
    ) -> Result<Self> {
        let is_docker = std::env::var("IN_DOCKER").is_ok();
        let options = LaunchOptions::default_builder()
            .path(Some(default_executable().unwrap()))
            .headless(headless)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(timeout))
            // warning only do this if in docker env
            .sandbox(!is_docker)
            .args(vec![
                OsStr::new("--lang=en-US"),
                OsStr::new("--disk-cache-size=0"),
            ])
            .build()
            .expect("Couldn't find appropriate Chrome binary.");
        let browser = Browser::new(options).context("browser launching error")?;

        Ok(BrowserController {
            browser,
            min_wait_secs,
            max_wait_secs,
        })
    }

    /// Opens the profile page in a fresh incognito context and hands back a
    /// handle that serves both extraction and pagination.
    pub async fn open_profile(&self, username: &str) -> Result<ProfilePage> {
        let url = profile_url(username);
        let ctx = self
            .browser
            .new_context()
            .context("could not create incognito context")?;
        let tab = ctx.new_tab().context("could not create new tab")?;
        self.navigate(&tab, &url)?;
        self.settle().await;

        Ok(ProfilePage {
            tab,
            settle_secs: self.min_wait_secs.max(1),
        })
    }

    /// Per-post fetcher over the same browser session.
    pub fn post_source(&self) -> PostFetcher<'_> {
        PostFetcher { controller: self }
    }

    fn navigate(&self, tab: &Arc<Tab>, url: &str) -> Result<()> {
        let nv = match tab.navigate_to(url) {
            Ok(t) => t,
            Err(e) => {
                error!("could not navigate to {} with error {}", url, e);
                tab.navigate_to(url)?
            }
        };
        if let Err(e) = nv.wait_until_navigated() {
            // we wait one more timeout
            warn!("error waiting for navigation, retrying {}", e);
            nv.wait_until_navigated()?;
        }
        Ok(())
    }

    async fn settle(&self) {
        let rndm = if self.min_wait_secs >= self.max_wait_secs {
            self.min_wait_secs
        } else {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.min_wait_secs..self.max_wait_secs)
        };
        debug!("sleeping for {} seconds", rndm);
        sleep(Duration::from_secs(rndm)).await;
    }

    pub fn kill(&self) -> bool {
        let pid = self
            .browser
            .get_process_id()
            .context("could not get process id for browser")
            .unwrap();
        let s = System::new();
        if let Some(process) = s.process(Pid::from_u32(pid)) {
            debug!("killing process with id {}", pid);
            process.kill();
            return true;
        }
        false
    }
}

impl Drop for BrowserController {
    fn drop(&mut self) {
        debug!("killing browser process...");
        self.kill();
    }
}

/// One loaded profile page. Extraction reads the shared-data blob; the
/// pagination driver walks the post-grid anchors and scrolls.
pub struct ProfilePage {
    tab: Arc<Tab>,
    settle_secs: u64,
}

impl ProfilePage {
    pub fn url(&self) -> String {
        self.tab.get_url()
    }

    /// Whether the account exists at all; the page carries an error marker
    /// when it does not.
    pub fn exists(&self) -> Result<bool> {
        let remote = self.tab.evaluate(&extractor::not_found_script(), false)?;
        let not_found = remote
            .value
            .and_then(|v| v.as_bool())
            .context("not-found probe did not return a boolean")?;
        Ok(!not_found)
    }

    /// Extracts the current profile observation, stamped with the live tab
    /// URL.
    pub fn observe(&self) -> Result<ProfileObservation> {
        let raw = eval_string(&self.tab, extractor::PROFILE_SCRIPT)?;
        let mut observation = extractor::parse_profile(&raw)?;
        observation.profile_url = self.tab.get_url();
        Ok(observation)
    }
}

#[async_trait]
impl PaginationDriver for ProfilePage {
    async fn current_candidate_links(&mut self) -> Result<Vec<String>> {
        let elems = match self.tab.find_elements(extractor::POST_LINKS_SELECTOR) {
            Ok(elems) => elems,
            Err(e) => {
                // an empty grid has no anchors at all
                debug!("no post links on {}: {}", self.tab.get_url(), e);
                return Ok(vec![]);
            }
        };

        let mut links = Vec::with_capacity(elems.len());
        for elem in &elems {
            let attributes = match elem.get_attributes()? {
                Some(attributes) => attributes,
                None => continue,
            };
            // attributes come back as a flat name/value sequence
            for pair in attributes.chunks(2) {
                if pair.len() == 2 && pair[0] == "href" {
                    links.push(pair[1].clone());
                }
            }
        }
        Ok(links)
    }

    async fn advance(&mut self) -> Result<()> {
        self.tab
            .evaluate(extractor::SCROLL_STEP_SCRIPT, false)
            .context("could not scroll the grid")?;
        sleep(Duration::from_secs(self.settle_secs)).await;
        Ok(())
    }
}

pub struct PostFetcher<'a> {
    controller: &'a BrowserController,
}

#[async_trait]
impl PostSource for PostFetcher<'_> {
    async fn fetch(&mut self, identifier: &str) -> Result<PostObservation> {
        let url = post_url(identifier);
        info!("crawl -> {}", url);

        let retry_strategy = FixedInterval::from_millis(500).map(jitter).take(2);
        let controller = self.controller;
        let tab = Retry::spawn(retry_strategy, || {
            let url = url.clone();
            async move {
                let ctx = controller
                    .browser
                    .new_context()
                    .context("could not create incognito context")?;
                let tab = ctx.new_tab().context("could not create new tab")?;
                controller.navigate(&tab, &url)?;
                Ok::<_, anyhow::Error>(tab)
            }
        })
        .await?;
        controller.settle().await;

        let raw = eval_string(&tab, &extractor::post_script())?;
        let mut observation = extractor::parse_post(&raw)
            .context(format!("could not extract post {}", identifier))?;
        observation.url = url;
        Ok(observation)
    }
}

fn eval_string(tab: &Tab, script: &str) -> Result<String> {
    let remote = tab.evaluate(script, false)?;
    let value = remote.value.context("page script returned no value")?;
    let raw = value.as_str().context("page script did not return a string")?;
    Ok(raw.to_string())
}
