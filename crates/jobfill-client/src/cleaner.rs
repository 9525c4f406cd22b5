use std::sync::Arc;

use htmd::HtmlToMarkdown;
use jobfill_core::error::AppError;
use jobfill_core::traits::TextCleaner;

/// HTML-to-Markdown cleaner using htmd.
///
/// Job ad bodies arrive as rendered HTML fragments. Converting to Markdown
/// strips the markup noise while keeping list and heading structure, which
/// both the database consumers and the analysis prompts want.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|text| text.trim().to_string())
            .map_err(|e| AppError::CleanerError(e.to_string()))
    }
}
