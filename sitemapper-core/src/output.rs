// Link output in the three supported encodings

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use sitemapper_scanner::LinkSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Header of the single output column.
pub const LINKS_COLUMN: &str = "Links";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Unknown output format '{0}' (expected txt, csv or xlsx)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Txt, OutputFormat::Csv, OutputFormat::Xlsx];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "txt" => Ok(OutputFormat::Txt),
            "csv" => Ok(OutputFormat::Csv),
            "xlsx" => Ok(OutputFormat::Xlsx),
            _ => Err(OutputError::UnknownFormat(s.trim().to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where finished link sets go.
pub trait LinkSink {
    /// Persists `links` as `<dir>/<base_name>.<ext>` and returns the path written.
    fn persist(
        &self,
        links: &LinkSet,
        dir: &Path,
        base_name: &str,
        format: OutputFormat,
    ) -> Result<PathBuf, OutputError>;
}

/// Writes link sets to files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl LinkSink for FileSink {
    fn persist(
        &self,
        links: &LinkSet,
        dir: &Path,
        base_name: &str,
        format: OutputFormat,
    ) -> Result<PathBuf, OutputError> {
        write_links(links, dir, base_name, format)
    }
}

/// Writes `links` to `<dir>/<base_name>.<ext>`, creating `dir` if needed.
pub fn write_links(
    links: &LinkSet,
    dir: &Path,
    base_name: &str,
    format: OutputFormat,
) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!("{}.{}", base_name, format.extension()));
    match format {
        OutputFormat::Txt => write_txt(links, &path)?,
        OutputFormat::Csv => write_csv(links, &path)?,
        OutputFormat::Xlsx => write_xlsx(links, &path)?,
    }

    info!("[SAVED] {} links saved as {}", links.len(), path.display());
    Ok(path)
}

fn write_txt(links: &LinkSet, path: &Path) -> Result<(), OutputError> {
    let io_error = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    for link in links {
        writeln!(writer, "{}", link).map_err(io_error)?;
    }
    writer.flush().map_err(io_error)
}

fn write_csv(links: &LinkSet, path: &Path) -> Result<(), OutputError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;

    writer.write_record([LINKS_COLUMN])?;
    for link in links {
        writer.write_record([link])?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_xlsx(links: &LinkSet, path: &Path) -> Result<(), OutputError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.write_string_with_format(0, 0, LINKS_COLUMN, &header)?;
    for (row, link) in (1u32..).zip(links) {
        worksheet.write_string(row, 0, link)?;
    }

    workbook.save(path)?;
    Ok(())
}
