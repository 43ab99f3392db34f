use anyhow::{Context, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use sitemapper_core::traverse::{
    extract_folder, extract_index, extract_local_file, extract_range, extract_sitemap_url,
};
use sitemapper_core::{
    AggregationMode, FileSink, OutputFormat, RangeTemplate, TraversalError, TraversalOptions,
    TraversalProgressCallback, TraversalReport,
};
use sitemapper_scanner::{FetchConfig, FetchSession, Fetcher, PageSource};
use std::io::{self, BufRead, Write};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

/// Output directory used by the interactive menu.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// A sitemap that has to be fetched over the network
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteTarget {
    Sitemap(Url),
    Range {
        template: RangeTemplate,
        start: i64,
        end: i64,
    },
    Index(Url),
}

/// Where the links of a run come from
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    LocalFile {
        path: PathBuf,
        base_url: Option<Url>,
    },
    Folder {
        dir: PathBuf,
        base_url: Option<Url>,
    },
    Remote(RemoteTarget),
}

/// Everything needed to execute one run, however it was asked for
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub strategy: Strategy,
    pub format: OutputFormat,
    pub output_root: PathBuf,
    pub mode: AggregationMode,
    pub fetch: FetchConfig,
    pub workers: usize,
    pub render: bool,
}

impl RunPlan {
    pub fn new(strategy: Strategy, format: OutputFormat) -> Self {
        Self {
            strategy,
            format,
            output_root: expand_path(DEFAULT_OUTPUT_DIR),
            mode: AggregationMode::Accumulate,
            fetch: FetchConfig::default(),
            workers: 1,
            render: false,
        }
    }
}

// Input parsing shared by the command line and the interactive menu

pub fn parse_output_format(input: &str) -> Result<OutputFormat, String> {
    input.parse::<OutputFormat>().map_err(|e| e.to_string())
}

pub fn parse_template(input: &str) -> Result<RangeTemplate, String> {
    RangeTemplate::parse(input).map_err(|e| e.to_string())
}

/// Parse a menu choice, accepting only 1 through 5
pub fn parse_menu_choice(input: &str) -> Result<u8, String> {
    match input.trim().parse::<u8>() {
        Ok(choice @ 1..=5) => Ok(choice),
        _ => Err(format!("Invalid choice '{}'", input.trim())),
    }
}

pub fn parse_sitemap_number(input: &str) -> Result<i64, String> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'{}' is not a whole number", input.trim()))
}

/// `y` or `yes` saves every sitemap separately; anything else accumulates
pub fn parse_yes_no(input: &str) -> AggregationMode {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => AggregationMode::Separate,
        _ => AggregationMode::Accumulate,
    }
}

pub fn parse_sitemap_url(input: &str) -> Result<Url, String> {
    Url::parse(input.trim()).map_err(|e| format!("Invalid URL '{}': {}", input.trim(), e))
}

pub fn expand_path(input: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(input.trim()).as_ref())
}

// Building a plan from the command line

/// Build the run plan for the subcommand `name`.
pub fn plan_from_matches(name: &str, args: &ArgMatches) -> Result<RunPlan, String> {
    let strategy = match name {
        "file" => Strategy::LocalFile {
            path: required::<PathBuf>(args, "PATH")?,
            base_url: args.get_one::<Url>("base-url").cloned(),
        },
        "folder" => Strategy::Folder {
            dir: required::<PathBuf>(args, "DIR")?,
            base_url: args.get_one::<Url>("base-url").cloned(),
        },
        "url" => Strategy::Remote(RemoteTarget::Sitemap(required::<Url>(args, "URL")?)),
        "range" => {
            let start = required::<i64>(args, "START")?;
            let end = required::<i64>(args, "END")?;
            if start > end {
                return Err(format!(
                    "Range start {} is greater than range end {}",
                    start, end
                ));
            }
            Strategy::Remote(RemoteTarget::Range {
                template: required::<RangeTemplate>(args, "TEMPLATE")?,
                start,
                end,
            })
        }
        "index" => Strategy::Remote(RemoteTarget::Index(required::<Url>(args, "URL")?)),
        other => return Err(format!("Unknown command '{}'", other)),
    };

    let format = required::<OutputFormat>(args, "format")?;
    let mut plan = RunPlan::new(strategy, format);
    plan.output_root = expand_path(&required::<String>(args, "output")?);

    if matches!(plan.strategy, Strategy::Remote(_)) {
        plan.fetch = FetchConfig {
            max_retries: required::<u32>(args, "retries")?,
            timeout: Duration::from_secs(required::<u64>(args, "timeout")?),
            retry_delay: Duration::from_millis(required::<u64>(args, "retry-delay")?),
            ..FetchConfig::default()
        };
        plan.workers = required::<u32>(args, "threads")? as usize;
        plan.render = args.get_flag("render");
    }
    if matches!(
        plan.strategy,
        Strategy::Remote(RemoteTarget::Range { .. } | RemoteTarget::Index(_))
    ) && args.get_flag("separate")
    {
        plan.mode = AggregationMode::Separate;
    }

    Ok(plan)
}

fn required<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Result<T, String> {
    args.get_one::<T>(id)
        .cloned()
        .ok_or_else(|| format!("Missing required argument <{}>", id))
}

// Interactive menu

pub fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn print_menu() {
    println!("{}", "Choose an option:".bright_white().bold());
    println!("  {} Extract URLs from a downloaded sitemap file", "1.".cyan());
    println!("  {} Extract URLs from all sitemaps in a folder", "2.".cyan());
    println!("  {} Extract URLs from a sitemap URL", "3.".cyan());
    println!("  {} Extract URLs from a range of sitemap URLs", "4.".cyan());
    println!(
        "  {} Extract URLs from an index sitemap and all its child sitemaps",
        "5.".cyan()
    );
    println!();
}

fn print_prompt(input: &mut impl BufRead, msg: &str) -> Result<String, String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut response = String::new();
    let read = input
        .read_line(&mut response)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    if read == 0 {
        return Err("No input given".to_string());
    }
    Ok(response.trim().to_string())
}

fn prompt_format(input: &mut impl BufRead) -> Result<OutputFormat, String> {
    parse_output_format(&print_prompt(input, "Choose output format (txt, csv, xlsx):")?)
}

/// Ask for a strategy and its inputs, in the order the menu always has.
///
/// Every answer is validated as soon as it is read, so nothing runs on bad
/// input.
pub fn plan_from_prompts(input: &mut impl BufRead) -> Result<RunPlan, String> {
    let choice = parse_menu_choice(&print_prompt(input, "Enter your choice (1, 2, 3, 4, or 5):")?)?;

    let plan = match choice {
        1 => {
            let path = print_prompt(input, "Enter the path to the downloaded sitemap file:")?;
            let strategy = Strategy::LocalFile {
                path: expand_path(&path),
                base_url: None,
            };
            RunPlan::new(strategy, prompt_format(input)?)
        }
        2 => {
            let dir = print_prompt(input, "Enter the folder path containing sitemaps:")?;
            let strategy = Strategy::Folder {
                dir: expand_path(&dir),
                base_url: None,
            };
            RunPlan::new(strategy, prompt_format(input)?)
        }
        3 => {
            let url = parse_sitemap_url(&print_prompt(input, "Enter the URL of the sitemap:")?)?;
            RunPlan::new(
                Strategy::Remote(RemoteTarget::Sitemap(url)),
                prompt_format(input)?,
            )
        }
        4 => {
            let template = parse_template(&print_prompt(
                input,
                "Enter the base URL structure (use '{}' as a placeholder for the number):",
            )?)?;
            let start = parse_sitemap_number(&print_prompt(input, "Enter the starting number:")?)?;
            let end = parse_sitemap_number(&print_prompt(input, "Enter the ending number:")?)?;
            if start > end {
                return Err(format!(
                    "Range start {} is greater than range end {}",
                    start, end
                ));
            }
            let format = prompt_format(input)?;
            let mode = parse_yes_no(&print_prompt(
                input,
                "Save links from each sitemap in separate files? (y/n):",
            )?);

            let mut plan = RunPlan::new(
                Strategy::Remote(RemoteTarget::Range {
                    template,
                    start,
                    end,
                }),
                format,
            );
            plan.mode = mode;
            plan
        }
        _ => {
            let url = parse_sitemap_url(&print_prompt(
                input,
                "Enter the URL of the index sitemap:",
            )?)?;
            let format = prompt_format(input)?;
            let mode = parse_yes_no(&print_prompt(
                input,
                "Save links from each child sitemap in separate files? (y/n):",
            )?);

            let mut plan = RunPlan::new(Strategy::Remote(RemoteTarget::Index(url)), format);
            plan.mode = mode;
            plan
        }
    };

    Ok(plan)
}

// Running a plan

/// A spinner that shows the latest progress message.
pub fn progress_spinner() -> (ProgressBar, TraversalProgressCallback) {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));

    let handle = spinner.clone();
    let callback: TraversalProgressCallback = Arc::new(move |msg: String| {
        handle.set_message(msg);
    });
    (spinner, callback)
}

/// Execute `plan`.
///
/// `cancel` stops the run after the sitemap in hand; `abort` drops it at once.
/// The fetch session is only opened for remote strategies and is always shut
/// down before this returns, whatever the outcome.
pub async fn run_plan(
    plan: &RunPlan,
    cancel: CancellationToken,
    abort: CancellationToken,
    progress: Option<TraversalProgressCallback>,
) -> anyhow::Result<TraversalReport> {
    let mut options = TraversalOptions::new(plan.output_root.clone(), plan.format)
        .with_mode(plan.mode)
        .with_workers(plan.workers)
        .with_cancel(cancel.clone());
    if let Some(progress) = progress {
        options = options.with_progress(progress);
    }

    let report = match &plan.strategy {
        Strategy::LocalFile { path, base_url } => {
            extract_local_file(path, base_url.as_ref(), &FileSink, &options)?
        }
        Strategy::Folder { dir, base_url } => {
            extract_folder(dir, base_url.as_ref(), &FileSink, &options)?
        }
        Strategy::Remote(target) => {
            let session = FetchSession::open(plan.render, &plan.fetch)
                .await
                .context("Failed to open the fetch session")?;
            let fetcher = Fetcher::with_config(session, plan.fetch.clone(), cancel);

            let result = run_remote_until_aborted(&fetcher, target, &options, &abort).await;
            fetcher.into_source().shutdown().await;
            result?
        }
    };

    info!(
        "Run finished: {} artifacts, {} links, {} failures",
        report.artifacts.len(),
        report.links_extracted,
        report.failed.len()
    );
    Ok(report)
}

/// Run a remote strategy until it finishes, panics or `abort` fires.
///
/// Always returns, so the caller can shut the session down.
pub async fn run_remote_until_aborted<S: PageSource>(
    fetcher: &Fetcher<S>,
    target: &RemoteTarget,
    options: &TraversalOptions,
    abort: &CancellationToken,
) -> anyhow::Result<TraversalReport> {
    let run = AssertUnwindSafe(run_remote(fetcher, target, options)).catch_unwind();

    tokio::select! {
        outcome = run => match outcome {
            Ok(result) => Ok(result?),
            Err(_) => Err(anyhow!("Traversal panicked")),
        },
        _ = abort.cancelled() => Err(anyhow!("Run abandoned after a second interrupt")),
    }
}

async fn run_remote<S: PageSource>(
    fetcher: &Fetcher<S>,
    target: &RemoteTarget,
    options: &TraversalOptions,
) -> Result<TraversalReport, TraversalError> {
    match target {
        RemoteTarget::Sitemap(url) => extract_sitemap_url(fetcher, url, &FileSink, options).await,
        RemoteTarget::Range {
            template,
            start,
            end,
        } => extract_range(fetcher, template, *start, *end, &FileSink, options).await,
        RemoteTarget::Index(url) => extract_index(fetcher, url, &FileSink, options).await,
    }
}

pub fn print_report(report: &TraversalReport) {
    println!();
    print_divider();
    if report.cancelled {
        println!("{}", "  EXTRACTION INTERRUPTED".yellow().bold());
    } else {
        println!("{}", "  EXTRACTION COMPLETE".green().bold());
    }
    print_divider();
    println!();

    println!(
        "{} Links extracted: {}",
        "✓".green().bold(),
        report.links_extracted.to_string().cyan()
    );
    for artifact in &report.artifacts {
        println!(
            "  {} {} ({} links)",
            "✓".green(),
            artifact.path.display().to_string().bright_white(),
            artifact.links.to_string().cyan()
        );
    }
    if report.artifacts.is_empty() {
        println!("  {} Nothing was saved", "→".blue());
    }

    if !report.failed.is_empty() {
        println!();
        println!(
            "{} {} sitemaps contributed nothing:",
            "⚠".yellow().bold(),
            report.failed.len()
        );
        for failed in &report.failed {
            println!("  {} {}", "•".yellow(), failed);
        }
    }
    println!();
}
