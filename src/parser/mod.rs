pub mod error;
pub mod locate;
pub mod records;

use crate::config::ExtractConfig;
use crate::db::StoredPage;
use error::LocateError;
use records::Extraction;

/// Two-pass pipeline: html → text block → records.
pub fn process_html(html: &str, config: &ExtractConfig) -> Result<Extraction, LocateError> {
    let block = locate::locate_in_html(html, config)?;
    Ok(records::extract(&block, config))
}

/// Outcome for one stored page, ready to be saved.
pub struct PageResult {
    pub page_id: i64,
    pub url: String,
    pub outcome: Result<Extraction, LocateError>,
}

pub fn process_page(page: &StoredPage, config: &ExtractConfig) -> PageResult {
    PageResult {
        page_id: page.id,
        url: page.url.clone(),
        outcome: process_html(&page.html, config),
    }
}
