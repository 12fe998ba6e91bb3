use serde::Serialize;

/// Structural failures: the document has no single text block to extract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("no element with class token '{class}'")]
    NotFound { class: String },

    #[error("{count} top-level elements with class token '{class}', expected exactly one")]
    Ambiguous { class: String, count: usize },

    #[error("no <{tag}> element inside the '{class}' container")]
    BlockMissing { class: String, tag: String },

    #[error("<{tag}> block inside the '{class}' container is empty")]
    EmptyBlock { class: String, tag: String },
}

/// Why a surviving line did not become a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LineErrorKind {
    #[error("expected 3 fields, found {found}")]
    MissingFields { found: usize },

    #[error("empty id field")]
    EmptyId,

    #[error("empty name field")]
    EmptyName,
}

/// A line that passed the noise filter but could not be parsed.
/// Collected, never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct LineParseError {
    /// 0-based index of the line within the block.
    pub line: usize,
    pub kind: LineErrorKind,
    pub text: String,
}
