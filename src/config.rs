use std::collections::BTreeSet;

pub const DEFAULT_URL: &str = "https://www.cnrfc.noaa.gov/";
pub const ALLOWED_DOMAINS: &[&str] = &["www.cnrfc.noaa.gov", "cnrfc.noaa.gov"];

const DEFAULT_DB_PATH: &str = "data/precip.sqlite";
const DB_PATH_ENV: &str = "NOAA_PRECIP_DB";

pub const DEFAULT_HEADER_LINES: usize = 3;
pub const DEFAULT_NOISE_DELIMITERS: &str = ":.$";
pub const DEFAULT_FIELD_SEPARATOR: &str = " : ";
pub const DEFAULT_BUCKET_SEPARATOR: &str = "/ ";
pub const DEFAULT_CONTAINER_CLASS: &str = "center-content";
pub const DEFAULT_BLOCK_TAG: &str = "pre";

/// Format knobs for locating the text block and splitting it into records.
///
/// Every field doubles as a CLI flag so format drift on the source page can
/// be handled without a rebuild.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Leading lines of the block dropped unconditionally (column headers)
    #[arg(long, default_value_t = DEFAULT_HEADER_LINES)]
    pub header_lines: usize,

    /// Characters that mark a noise line when they start it (blank lines are always noise)
    #[arg(long, default_value = DEFAULT_NOISE_DELIMITERS, value_parser = parse_delimiters)]
    pub noise_delimiters: BTreeSet<char>,

    /// Separator between id, name and precipitation fields
    #[arg(long, default_value = DEFAULT_FIELD_SEPARATOR)]
    pub field_separator: String,

    /// Separator between precipitation buckets
    #[arg(long, default_value = DEFAULT_BUCKET_SEPARATOR)]
    pub bucket_separator: String,

    /// Class token of the content container
    #[arg(long, default_value = DEFAULT_CONTAINER_CLASS)]
    pub container_class: String,

    /// Tag name of the preformatted element inside the container
    #[arg(long, default_value = DEFAULT_BLOCK_TAG)]
    pub block_tag: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            header_lines: DEFAULT_HEADER_LINES,
            noise_delimiters: DEFAULT_NOISE_DELIMITERS.chars().collect(),
            field_separator: DEFAULT_FIELD_SEPARATOR.to_string(),
            bucket_separator: DEFAULT_BUCKET_SEPARATOR.to_string(),
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            block_tag: DEFAULT_BLOCK_TAG.to_string(),
        }
    }
}

fn parse_delimiters(s: &str) -> Result<BTreeSet<char>, String> {
    if s.chars().any(char::is_whitespace) {
        return Err("noise delimiters cannot contain whitespace".to_string());
    }
    Ok(s.chars().collect())
}

/// Database path, overridable through `NOAA_PRECIP_DB`.
pub fn db_path() -> String {
    std::env::var(DB_PATH_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: ExtractConfig,
    }

    #[test]
    fn cli_defaults_match_default_impl() {
        let h = Harness::parse_from(["test"]);
        assert_eq!(h.config, ExtractConfig::default());
    }

    #[test]
    fn default_delimiters() {
        let config = ExtractConfig::default();
        let expected: BTreeSet<char> = [':', '.', '$'].into_iter().collect();
        assert_eq!(config.noise_delimiters, expected);
    }

    #[test]
    fn flags_override_defaults() {
        let h = Harness::parse_from([
            "test",
            "--header-lines",
            "5",
            "--noise-delimiters",
            "#-",
            "--field-separator",
            "|",
        ]);
        assert_eq!(h.config.header_lines, 5);
        assert_eq!(h.config.noise_delimiters, ['#', '-'].into_iter().collect());
        assert_eq!(h.config.field_separator, "|");
        assert_eq!(h.config.bucket_separator, DEFAULT_BUCKET_SEPARATOR);
    }

    #[test]
    fn whitespace_delimiter_rejected() {
        assert!(parse_delimiters(": ").is_err());
    }
}
