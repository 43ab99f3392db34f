use colored::Colorize;
use sitemapper::commands::command_argument_builder;
use sitemapper::handlers::{
    plan_from_matches, plan_from_prompts, print_menu, print_report, progress_spinner, run_plan,
};
use sitemapper_core::print_banner;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let json = chosen_command.get_flag("json");

    init_tracing(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let plan = match chosen_command.subcommand() {
        Some((name, sub_matches)) => plan_from_matches(name, sub_matches),
        None => {
            // No subcommand provided, fall back to the menu
            print_menu();
            plan_from_prompts(&mut io::stdin().lock())
        }
    };
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    watch_for_interrupt(cancel.clone(), abort.clone());

    let spinner = (!quiet && !json).then(progress_spinner);
    let progress = spinner.as_ref().map(|(_, callback)| callback.clone());

    let result = run_plan(&plan, cancel, abort.clone(), progress).await;
    if let Some((spinner, _)) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(report) if json => match serde_json::to_string_pretty(&report) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                eprintln!("{} Failed to render report: {}", "[ERROR]".red().bold(), e);
                std::process::exit(1);
            }
        },
        Ok(report) => {
            if !quiet {
                print_report(&report);
            }
            if report.cancelled {
                println!("{} Interrupted. Partial results are listed above.", "[INFO]".blue());
            } else if !quiet {
                println!("{} All tasks completed.", "[INFO]".blue());
            }
        }
        Err(e) if abort.is_cancelled() => {
            eprintln!("{} {:#}", "[INFO]".blue(), e);
            std::process::exit(130);
        }
        Err(e) => {
            eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so they never mix with `--json` output.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// First Ctrl-C stops the run gracefully, a second one abandons it. Either
/// way the run returns and closes its fetch session before the process exits.
fn watch_for_interrupt(cancel: CancellationToken, abort: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "\n{} Interrupted! Finishing up and closing the fetch session...",
            "[INFO]".blue()
        );
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupted again! Abandoning the run and closing the fetch session...",
                "[INFO]".blue()
            );
            abort.cancel();
        }
    });
}
