//! Encoding formats and reading methods

use std::fmt;

/// Encoding format of a FileObject or FileSet, from its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncodingFormat {
    /// `text/csv`
    Csv,
    /// `text/tsv`, `text/tab-separated-values`
    Tsv,
    /// `application/json`
    Json,
    /// `application/jsonlines`, `application/x-jsonlines`
    JsonLines,
    /// `application/x-parquet`
    Parquet,
    /// `text/plain`
    Text,
    /// `application/zip`
    Zip,
    /// `application/x-tar`
    Tar,
    /// `application/x-gzip`, `application/gzip`
    Gzip,
    /// `git+https`
    Git,
    /// Any other format; files are read as raw bytes
    Other(String),
}

impl EncodingFormat {
    /// Parse a MIME type; parameters such as `; charset=utf-8` are ignored
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" => EncodingFormat::Csv,
            "text/tsv" | "text/tab-separated-values" => EncodingFormat::Tsv,
            "application/json" => EncodingFormat::Json,
            "application/jsonlines" | "application/x-jsonlines" | "application/jsonl"
            | "application/x-ndjson" => EncodingFormat::JsonLines,
            "application/x-parquet" | "application/vnd.apache.parquet" => {
                EncodingFormat::Parquet
            }
            "text/plain" => EncodingFormat::Text,
            "application/zip" | "application/x-zip-compressed" => EncodingFormat::Zip,
            "application/x-tar" | "application/tar" => EncodingFormat::Tar,
            "application/x-gzip" | "application/gzip" => EncodingFormat::Gzip,
            "git+https" => EncodingFormat::Git,
            _ => EncodingFormat::Other(essence),
        }
    }

    /// First recognised format among several declared MIME types
    pub fn select(mimes: &[String]) -> Self {
        mimes
            .iter()
            .map(|mime| Self::from_mime(mime))
            .find(|format| !matches!(format, EncodingFormat::Other(_)))
            .or_else(|| mimes.first().map(|mime| Self::from_mime(mime)))
            .unwrap_or_else(|| EncodingFormat::Other(String::new()))
    }

    /// Whether files of this format are unpacked before reading
    pub fn is_archive(&self) -> bool {
        matches!(self, EncodingFormat::Zip | EncodingFormat::Tar | EncodingFormat::Gzip)
    }

    /// Whether the format is parsed into several columns
    pub fn is_tabular(&self) -> bool {
        matches!(
            self,
            EncodingFormat::Csv
                | EncodingFormat::Tsv
                | EncodingFormat::Json
                | EncodingFormat::JsonLines
                | EncodingFormat::Parquet
        )
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingFormat::Csv => write!(f, "text/csv"),
            EncodingFormat::Tsv => write!(f, "text/tsv"),
            EncodingFormat::Json => write!(f, "application/json"),
            EncodingFormat::JsonLines => write!(f, "application/jsonlines"),
            EncodingFormat::Parquet => write!(f, "application/x-parquet"),
            EncodingFormat::Text => write!(f, "text/plain"),
            EncodingFormat::Zip => write!(f, "application/zip"),
            EncodingFormat::Tar => write!(f, "application/x-tar"),
            EncodingFormat::Gzip => write!(f, "application/x-gzip"),
            EncodingFormat::Git => write!(f, "git+https"),
            EncodingFormat::Other(mime) => write!(f, "{mime}"),
        }
    }
}

/// How the files of a resource are turned into a table
///
/// Derived from the fields consuming the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadingMethod {
    /// Only path columns are produced
    #[default]
    None,
    /// Parse the file according to its format (columns), or expose raw bytes
    Content,
    /// One row per line
    Lines,
    /// Evaluate JSON paths on the document
    Json,
}

impl fmt::Display for ReadingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingMethod::None => write!(f, "NONE"),
            ReadingMethod::Content => write!(f, "CONTENT"),
            ReadingMethod::Lines => write!(f, "LINES"),
            ReadingMethod::Json => write!(f, "JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("text/csv", EncodingFormat::Csv)]
    #[test_case("text/csv; charset=utf-8", EncodingFormat::Csv)]
    #[test_case("application/jsonlines", EncodingFormat::JsonLines)]
    #[test_case("application/x-parquet", EncodingFormat::Parquet)]
    #[test_case("application/x-tar", EncodingFormat::Tar)]
    #[test_case("image/png", EncodingFormat::Other("image/png".into()))]
    fn test_from_mime(mime: &str, expected: EncodingFormat) {
        assert_eq!(EncodingFormat::from_mime(mime), expected);
    }

    #[test]
    fn test_select_prefers_known_formats() {
        let mimes = vec!["image/png".to_string(), "application/zip".to_string()];
        assert_eq!(EncodingFormat::select(&mimes), EncodingFormat::Zip);
        assert!(EncodingFormat::select(&mimes).is_archive());
        assert_eq!(
            EncodingFormat::select(&["image/png".to_string()]),
            EncodingFormat::Other("image/png".into())
        );
    }
}
