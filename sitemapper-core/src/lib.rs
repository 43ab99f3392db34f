pub mod output;
pub mod traverse;

pub use output::{FileSink, LinkSink, OutputError, OutputFormat, write_links};
pub use traverse::{
    AggregationMode, RangeTemplate, TraversalError, TraversalOptions, TraversalProgressCallback,
    TraversalReport,
};

pub fn print_banner() {
    println!(
        r#"
 ┌─┐┬┌┬┐┌─┐┌┬┐┌─┐┌─┐┌─┐┌─┐┬─┐
 └─┐│ │ ├┤ │││├─┤├─┘├─┘├┤ ├┬┘
 └─┘┴ ┴ └─┘┴ ┴┴ ┴┴  ┴  └─┘┴└─
   every link a site publishes, straight from its sitemaps
   v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
