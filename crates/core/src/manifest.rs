//! Batch job manifest.
//!
//! A manifest is a CSV file with a header row. Recognised columns:
//!
//! | Column     | Required | Meaning                                             |
//! |------------|----------|-----------------------------------------------------|
//! | `prompt`   | yes      | Content description; rows with a blank prompt are dropped |
//! | `filename` | yes      | Output name for the job (also used as save prefix)  |
//! | `seed`     | no       | Integer seed; blank or malformed means "assign automatically" |
//! | `style`    | no       | Style preset key or label                           |
//! | `id`       | no       | Caller's job identifier                             |
//! | `status`   | no       | When present, only `pending` rows are loaded        |
//!
//! Quoted fields with embedded commas and doubled quotes are supported;
//! embedded newlines are not.

use std::path::{Path, PathBuf};

/// Status value marking a row as still to be processed.
pub const STATUS_PENDING: &str = "pending";

/// How the seed for a job is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSpec {
    Fixed(u64),
    /// Draw a random seed when the job runs.
    Auto,
}

impl SeedSpec {
    /// Parse a seed cell.
    ///
    /// Accepts plain integers and integral floats (`"1001.0"`, as written
    /// by spreadsheet tools when a column has gaps). Anything else,
    /// including negative values, means [`SeedSpec::Auto`].
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if let Ok(n) = cell.parse::<u64>() {
            return Self::Fixed(n);
        }
        match cell.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                Self::Fixed(f as u64)
            }
            _ => Self::Auto,
        }
    }
}

/// One row of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestJob {
    /// 1-based data row number (header excluded), for log messages.
    pub row: usize,
    pub id: Option<String>,
    pub prompt: String,
    pub filename: String,
    pub seed: SeedSpec,
    pub style: Option<String>,
}

/// Errors from reading or parsing a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read job manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Job manifest is empty")]
    Empty,

    #[error("Job manifest is missing required column '{0}'")]
    MissingColumn(&'static str),
}

/// Read and parse a manifest file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestJob>, ManifestError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text)
}

/// Parse manifest text into jobs.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestJob>, ManifestError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines();

    let header_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or(ManifestError::Empty)?;
    let headers: Vec<String> = parse_csv_line(header_line)
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let prompt_col = column("prompt").ok_or(ManifestError::MissingColumn("prompt"))?;
    let filename_col = column("filename").ok_or(ManifestError::MissingColumn("filename"))?;
    let seed_col = column("seed");
    let style_col = column("style");
    let id_col = column("id");
    let status_col = column("status");

    let mut jobs = Vec::new();
    let mut row = 0;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        row += 1;

        let values = parse_csv_line(line);
        let cell = |col: Option<usize>| {
            col.and_then(|i| values.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        if status_col.is_some()
            && !cell(status_col).is_some_and(|s| s.eq_ignore_ascii_case(STATUS_PENDING))
        {
            continue;
        }

        let Some(prompt) = cell(Some(prompt_col)) else {
            tracing::debug!(row, "Skipping manifest row without a prompt");
            continue;
        };

        let filename = cell(Some(filename_col))
            .map(str::to_string)
            .unwrap_or_else(|| format!("job_{row:04}"));

        jobs.push(ManifestJob {
            row,
            id: cell(id_col).map(str::to_string),
            prompt: prompt.to_string(),
            filename,
            seed: cell(seed_col).map(SeedSpec::parse).unwrap_or(SeedSpec::Auto),
            style: cell(style_col).map(str::to_string),
        });
    }

    Ok(jobs)
}

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

/// Escape a value for CSV: wrap in quotes if it contains comma, quote, or newline.
pub(crate) fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parse a single CSV line, handling quoted fields.
pub(crate) fn parse_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    // Escaped quote.
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            result.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    result.push(current);
    result
}
