use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::warn;
use profilecrawl::{
    runner::{Runner, RunnerOptions},
    store::OutputFormat,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Public profile metrics crawler", long_about = None)]
struct Args {
    /// Username of the profile to crawl
    username: String,
    /// Output format of the dataset file (json or yaml)
    #[arg(short, long, default_value = "json")]
    output: String,
    /// Only collect up to this many posts
    #[arg(short, long)]
    limit: Option<usize>,
    /// Run the browser with a visible window
    #[arg(short, long, default_value_t = false)]
    interactive: bool,
    /// Directory the dataset files are read from and written to
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,
    /// Maximum time the browser will wait for an event before timing out
    #[arg(long, default_value_t = 45)]
    browser_timeout: u64,
    /// Minimum time in seconds to wait after a tab navigates to a page
    #[arg(long, default_value_t = 3)]
    min_wait_after_navigation: u64,
    /// Maximum time in seconds to wait after a tab navigates to a page
    #[arg(long, default_value_t = 6)]
    max_wait_after_navigation: u64,
    /// Maximum number of scroll steps while collecting post links
    #[arg(long, default_value_t = 50)]
    max_scroll_rounds: u32,
    /// Abort without writing a dataset when fewer posts than requested were found
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let output: OutputFormat = args.output.parse()?;

    let mut builder = RunnerOptions::default_builder();
    builder
        .output(output)
        .limit(args.limit)
        .headless(!args.interactive)
        .browser_timeout(args.browser_timeout)
        .min_wait_after_navigation(args.min_wait_after_navigation)
        .max_wait_after_navigation(args.max_wait_after_navigation)
        .max_scroll_rounds(args.max_scroll_rounds)
        .allow_partial_collection(!args.strict);
    if let Some(data_dir) = args.data_dir.clone() {
        builder.data_dir(data_dir);
    }
    let options = builder.build()?;

    let runner = Runner::new(options)?;
    let report = runner.run(&args.username).await?;

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    println!(
        "crawl of {} completed: {} of {} posts updated, dataset written to {}",
        args.username,
        report.collected,
        report.target,
        report.output_file.display()
    );

    Ok(())
}
