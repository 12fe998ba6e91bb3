use serde::Serialize;
use tracing::debug;

use super::error::{LineErrorKind, LineParseError};
use crate::config::ExtractConfig;

/// One row of the precipitation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub name: String,
    /// Raw bucket tokens, never trimmed or converted.
    pub precip_buckets: Vec<String>,
}

/// Records in source order plus the lines that survived the noise filter
/// but failed to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub skipped: Vec<LineParseError>,
}

/// Header skip → noise filter → field split → bucket split.
pub fn extract(block: &str, config: &ExtractConfig) -> Extraction {
    let mut out = Extraction::default();

    for (idx, line) in block.lines().enumerate().skip(config.header_lines) {
        if is_noise(line, config) {
            continue;
        }
        match parse_line(idx, line, config) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                debug!("Skipping {}", e);
                out.skipped.push(e);
            }
        }
    }

    out
}

/// Blank and whitespace-only lines collapse to the empty line, which is
/// always noise. Otherwise only the untrimmed first character is checked.
pub fn is_noise(line: &str, config: &ExtractConfig) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    line.chars()
        .next()
        .is_some_and(|c| config.noise_delimiters.contains(&c))
}

pub fn parse_line(idx: usize, line: &str, config: &ExtractConfig) -> Result<Record, LineParseError> {
    let fail = |kind| LineParseError {
        line: idx,
        kind,
        text: line.to_string(),
    };

    let fields = split_fields(line, &config.field_separator);
    let [id, name, raw_precip] = fields.as_slice() else {
        return Err(fail(LineErrorKind::MissingFields {
            found: fields.len(),
        }));
    };

    if id.trim().is_empty() {
        return Err(fail(LineErrorKind::EmptyId));
    }
    if name.trim().is_empty() {
        return Err(fail(LineErrorKind::EmptyName));
    }

    Ok(Record {
        id: id.to_string(),
        name: name.to_string(),
        precip_buckets: split_buckets(raw_precip, &config.bucket_separator),
    })
}

/// Split into at most three fields. A line that lost its trailing space
/// ("003 : Gamma :") still ends in the right-trimmed separator; that tail is
/// read as an empty final field.
fn split_fields<'a>(line: &'a str, sep: &str) -> Vec<&'a str> {
    let mut fields: Vec<&str> = line.splitn(3, sep).collect();

    let trimmed_sep = sep.trim_end();
    if fields.len() < 3 && !trimmed_sep.is_empty() && trimmed_sep != sep {
        if let Some(last) = fields.pop() {
            match last.strip_suffix(trimmed_sep) {
                Some(head) if fields.len() == 1 => {
                    fields.push(head);
                    fields.push("");
                }
                _ => fields.push(last),
            }
        }
    }

    fields
}

/// `str::split` semantics: an empty field gives `[""]`, never `[]`.
fn split_buckets(raw: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return vec![raw.to_string()];
    }
    raw.split(sep).map(str::to_string).collect()
}
