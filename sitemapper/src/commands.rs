use crate::handlers::{parse_output_format, parse_template};
use clap::{Arg, ArgAction, Command, arg, command};
use std::path::PathBuf;
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> Command {
    Command::new("sitemapper")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitemapper")
        .about("Extracts every link a site publishes through its sitemaps")
        .after_help("Run without a subcommand for the interactive menu.")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log more (-v for progress, -vv for every request)")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            arg!(--"json" "Print the run report as JSON")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(output_args(
            command!("file")
                .about("Extract links from a downloaded sitemap file")
                .arg(
                    arg!(<PATH>)
                        .help("The sitemap file (.xml is parsed as XML, anything else as HTML)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(base_url_arg()),
        ))
        .subcommand(output_args(
            command!("folder")
                .about("Extract links from every .xml and .html sitemap in a folder")
                .arg(
                    arg!(<DIR>)
                        .help("The folder holding the sitemaps")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(base_url_arg()),
        ))
        .subcommand(fetch_args(output_args(
            command!("url")
                .about("Extract links from a sitemap URL")
                .arg(
                    arg!(<URL>)
                        .help("The sitemap URL")
                        .value_parser(clap::value_parser!(Url)),
                ),
        )))
        .subcommand(fetch_args(output_args(
            command!("range")
                .about("Extract links from a numbered range of sitemap URLs")
                .arg(
                    arg!(<TEMPLATE>)
                        .help("The sitemap URL with '{}' in place of the number")
                        .value_parser(parse_template),
                )
                .arg(
                    arg!(<START>)
                        .help("The first sitemap number")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true),
                )
                .arg(
                    arg!(<END>)
                        .help("The last sitemap number, included")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true),
                )
                .arg(separate_arg("Save links from each sitemap in separate files")),
        )))
        .subcommand(fetch_args(output_args(
            command!("index")
                .about("Extract links from an index sitemap and all its child sitemaps")
                .arg(
                    arg!(<URL>)
                        .help("The index sitemap URL")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(separate_arg(
                    "Save links from each child sitemap in separate files",
                )),
        )))
}

fn base_url_arg() -> Arg {
    arg!(-b --"base-url" <URL>)
        .required(false)
        .help(
            "Resolve relative links in HTML sitemaps against this URL. \
             Without it they resolve to file:// URLs next to the file",
        )
        .value_parser(clap::value_parser!(Url))
}

fn separate_arg(help: &'static str) -> Arg {
    arg!(-s --"separate")
        .required(false)
        .help(help)
        .action(ArgAction::SetTrue)
}

fn output_args(cmd: Command) -> Command {
    cmd.arg(
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Output format: txt, csv, xlsx")
            .value_parser(parse_output_format)
            .default_value("txt"),
    )
    .arg(
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Directory the link files are written to")
            .default_value("output"),
    )
}

fn fetch_args(cmd: Command) -> Command {
    cmd.arg(
        arg!(--"retries" <ATTEMPTS>)
            .required(false)
            .help("Attempts per sitemap before it is skipped")
            .value_parser(clap::value_parser!(u32).range(1..))
            .default_value("3"),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Page load timeout in seconds")
            .value_parser(clap::value_parser!(u64).range(1..))
            .default_value("60"),
    )
    .arg(
        arg!(--"retry-delay" <MILLIS>)
            .required(false)
            .help("Pause between attempts in milliseconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("0"),
    )
    .arg(
        arg!(-t --"threads" <NUM_WORKERS>)
            .required(false)
            .help("The number of sitemaps fetched at once. Output order is unaffected.")
            .value_parser(clap::value_parser!(u32).range(1..))
            .default_value("1"),
    )
    .arg(
        arg!(--"render")
            .required(false)
            .help("Load pages in headless Chromium so script-rendered sitemaps work")
            .action(ArgAction::SetTrue),
    )
}
