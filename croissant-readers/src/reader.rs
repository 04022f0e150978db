//! Dispatch from encoding format and reading method to a concrete reader

use std::fs::File;
use std::io::{BufReader, Read};

use flate2::read::GzDecoder;
use tracing::debug;

use croissant_core::{FilePath, FileProperty, Table, Value};

use crate::binary::read_content;
use crate::error::{Error, Result};
use crate::format::{EncodingFormat, ReadingMethod};
use crate::json::{read_json, read_json_lines, read_json_paths};
use crate::text::read_lines;

/// What to read from each file of a resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// Encoding format of the resource
    pub format: Option<EncodingFormat>,
    /// Reading method derived from the consuming fields
    pub method: ReadingMethod,
    /// JSON paths requested by the consuming fields
    pub json_paths: Vec<String>,
    /// Whether a `lineNumbers` column is requested
    pub line_numbers: bool,
}

impl ReadOptions {
    /// Create options for a format and method
    pub fn new(format: EncodingFormat, method: ReadingMethod) -> Self {
        Self {
            format: Some(format),
            method,
            ..Self::default()
        }
    }

    /// Set the JSON paths to evaluate
    #[must_use]
    pub fn json_paths(mut self, paths: Vec<String>) -> Self {
        self.json_paths = paths;
        self
    }

    /// Request a `lineNumbers` column
    #[must_use]
    pub fn line_numbers(mut self, line_numbers: bool) -> Self {
        self.line_numbers = line_numbers;
        self
    }
}

fn open(file: &FilePath, format: &EncodingFormat) -> Result<Box<dyn Read>> {
    let reader = BufReader::new(File::open(&file.filepath)?);
    let gzipped = file
        .filepath
        .extension()
        .is_some_and(|extension| extension == "gz");
    if gzipped && *format != EncodingFormat::Gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn read_json_lines_paths(reader: Box<dyn Read>, paths: &[String]) -> Result<Table> {
    let mut content = String::new();
    BufReader::new(reader).read_to_string(&mut content)?;
    let tables = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| read_json_paths(line.as_bytes(), paths))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::concat(tables))
}

fn read_parsed(file: &FilePath, format: &EncodingFormat, reader: Box<dyn Read>) -> Result<Table> {
    match format {
        #[cfg(feature = "csv")]
        EncodingFormat::Csv => crate::csv::read_csv(reader, &crate::csv::CsvOptions::default()),
        #[cfg(feature = "csv")]
        EncodingFormat::Tsv => crate::csv::read_csv(reader, &crate::csv::CsvOptions::tsv()),
        #[cfg(not(feature = "csv"))]
        EncodingFormat::Csv | EncodingFormat::Tsv => Err(Error::Unsupported(format!(
            "reading {format} requires the `csv` feature"
        ))),
        EncodingFormat::Json => read_json(reader),
        EncodingFormat::JsonLines => read_json_lines(reader),
        #[cfg(feature = "parquet")]
        EncodingFormat::Parquet => crate::parquet::read_parquet(&file.filepath),
        #[cfg(not(feature = "parquet"))]
        EncodingFormat::Parquet => Err(Error::Unsupported(format!(
            "reading {} requires the `parquet` feature",
            file.filepath.display()
        ))),
        _ => read_content(reader),
    }
}

/// Read one file into a table and attach its path columns
///
/// The table always carries `filepath`, `filename` and `fullpath`. A file read with
/// [`ReadingMethod::None`] yields a single row holding only those.
pub fn read_file(file: &FilePath, options: &ReadOptions) -> Result<Table> {
    let format = options
        .format
        .clone()
        .unwrap_or_else(|| EncodingFormat::Other(String::new()));
    debug!(
        path = %file.filepath.display(),
        format = %format,
        method = %options.method,
        "reading file"
    );
    let mut table = match options.method {
        ReadingMethod::None => Table::new(),
        ReadingMethod::Lines => read_lines(open(file, &format)?, options.line_numbers)?,
        ReadingMethod::Json => match format {
            EncodingFormat::JsonLines => {
                read_json_lines_paths(open(file, &format)?, &options.json_paths)?
            }
            EncodingFormat::Json => read_json_paths(open(file, &format)?, &options.json_paths)?,
            other => {
                return Err(Error::Format(format!(
                    "JSON paths cannot be evaluated on {other} files ({})",
                    file.filepath.display()
                )))
            }
        },
        ReadingMethod::Content => read_parsed(file, &format, open(file, &format)?)?,
    };
    attach_paths(&mut table, file);
    Ok(table)
}

/// Add `filepath`, `filename` and `fullpath` columns
pub fn attach_paths(table: &mut Table, file: &FilePath) {
    table.set_constant(
        FileProperty::Filepath.as_str(),
        Value::Text(file.filepath_str()),
    );
    table.set_constant(FileProperty::Filename.as_str(), Value::Text(file.filename()));
    table.set_constant(
        FileProperty::Fullpath.as_str(),
        Value::Text(file.fullpath_str()),
    );
}
