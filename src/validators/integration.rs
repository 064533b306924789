//! Integration validation: load every page in a real browser.
//!
//! One ephemeral server is shared by the whole batch so relative fetches
//! and shared storage behave like production. Runtime errors are collected
//! per page and aggregated into a single outcome; 404s for decorative
//! assets are filtered as benign.

use std::path::Path;
use std::time::Duration;

use crate::browser::BrowserSession;
use crate::error::PipelineError;
use crate::server::StaticServer;

use super::{ErrorCategory, ValidationOutcome};

/// Console errors matching any of these fragments are ignored. Missing
/// images, styles, fonts and media never break the generated app's logic.
const BENIGN_PATTERNS: &[&str] = &[
    "favicon.ico",
    "404",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".svg",
    ".webp",
    ".css",
    ".woff",
    ".woff2",
    ".ttf",
    ".eot",
    ".mp3",
    ".mp4",
    ".wav",
    ".ogg",
];

/// Whether a captured error is a known-benign asset failure.
pub fn is_benign(error: &str) -> bool {
    let lowered = error.to_lowercase();
    BENIGN_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// Validates generated pages by loading them headlessly.
pub struct IntegrationValidator {
    nav_timeout: Duration,
}

impl IntegrationValidator {
    /// Creates a validator with the given per-page navigation timeout.
    pub fn new(nav_timeout: Duration) -> Self {
        Self { nav_timeout }
    }

    /// Loads every page on one shared server, collecting page-prefixed
    /// runtime errors into a single outcome.
    pub async fn validate_all_pages(
        &self,
        output_dir: &Path,
        pages: &[String],
    ) -> Result<ValidationOutcome, PipelineError> {
        let server = StaticServer::serve(output_dir).await?;
        let result = self.check_pages(&server, output_dir, pages).await;
        server.shutdown().await;

        let errors = result?;
        if errors.is_empty() {
            Ok(ValidationOutcome::pass())
        } else {
            Ok(ValidationOutcome::fail(
                ErrorCategory::Integration,
                errors.join("; "),
            ))
        }
    }

    async fn check_pages(
        &self,
        server: &StaticServer,
        output_dir: &Path,
        pages: &[String],
    ) -> Result<Vec<String>, PipelineError> {
        let session = BrowserSession::launch().await?;
        let mut all_errors = Vec::new();
        let mut fault = None;

        for page_file in pages {
            if !output_dir.join(page_file).exists() {
                all_errors.push(format!("[{page_file}] Page not found"));
                continue;
            }

            let tab = match session.open().await {
                Ok(tab) => tab,
                Err(err) => {
                    fault = Some(err);
                    break;
                }
            };

            if let Err(err) = tab.navigate(&server.url_for(page_file), self.nav_timeout).await {
                all_errors.push(format!("[{page_file}] Navigation error: {err}"));
            }
            tab.settle(self.nav_timeout).await;

            for error in tab.collected_errors() {
                if !is_benign(&error) {
                    all_errors.push(format!("[{page_file}] {error}"));
                }
            }
            tab.close().await;
        }

        session.close().await;
        match fault {
            Some(err) => Err(err.into()),
            None => Ok(all_errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_failures_are_benign() {
        assert!(is_benign("Failed to load resource: favicon.ico"));
        assert!(is_benign("GET /hero.PNG 404 (Not Found)"));
        assert!(is_benign("failed to decode theme.css"));
        assert!(is_benign("net::ERR_ABORTED http://x/bgm.mp3"));
    }

    #[test]
    fn script_failures_are_not_benign() {
        assert!(!is_benign(
            "Console error: Uncaught TypeError: undefined is not a function"
        ));
        assert!(!is_benign("Page error: ReferenceError: cart is not defined"));
    }
}
