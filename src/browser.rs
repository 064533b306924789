//! Headless-browser capability over the Chrome DevTools Protocol.
//!
//! Wraps `chromiumoxide` with the small surface the validators need:
//! navigation with settle waits, element lookup with role/label/text
//! fallback, basic actions, console/exception capture, in-page evaluation
//! and accessibility snapshots.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::accessibility::GetFullAxTreeParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::error::BrowserError;

/// Attribute used to hand a fallback-located element back to the caller as
/// a plain CSS selector.
const FALLBACK_ATTR: &str = "data-wf-fallback";

/// Poll interval while waiting for a page to settle.
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// Grace period after the document reports complete, letting late scripts
/// and fetches land.
const SETTLE_GRACE: Duration = Duration::from_millis(200);

/// One headless browser process shared by a validation run.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launches a headless Chromium instance.
    ///
    /// A launch failure is an environment fault; callers must not downgrade
    /// it to a validation failure.
    pub async fn launch() -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .args(vec!["--no-sandbox", "--disable-dev-shm-usage"])
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Opens a blank tab with console-error and uncaught-exception capture
    /// already attached, so nothing emitted during navigation is missed.
    pub async fn open(&self) -> Result<PageHandle, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut listener_tasks = Vec::with_capacity(2);

        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let console_sink = Arc::clone(&errors);
        listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                if matches!(event.r#type, ConsoleApiCalledType::Error) {
                    let text = event
                        .args
                        .iter()
                        .filter_map(|arg| {
                            arg.value
                                .as_ref()
                                .map(|v| match v {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .or_else(|| arg.description.clone())
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    if let Ok(mut sink) = console_sink.lock() {
                        sink.push(format!("Console error: {text}"));
                    }
                }
            }
        }));

        let mut exception_events = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let exception_sink = Arc::clone(&errors);
        listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = exception_events.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                if let Ok(mut sink) = exception_sink.lock() {
                    sink.push(format!("Page error: {message}"));
                }
            }
        }));

        Ok(PageHandle {
            page,
            errors,
            listener_tasks,
        })
    }

    /// Closes the browser process.
    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// One open tab plus its captured runtime errors.
pub struct PageHandle {
    page: Page,
    errors: Arc<Mutex<Vec<String>>>,
    listener_tasks: Vec<JoinHandle<()>>,
}

impl PageHandle {
    /// Navigates with a bounded timeout and waits for the load to finish.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let result = tokio::time::timeout(timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Waits until the document reports complete, bounded by `timeout`,
    /// then leaves a short grace period for late work. Best effort: a page
    /// that never settles is left to the error capture to judge.
    pub async fn settle(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.evaluate_value("document.readyState").await {
                Ok(value) if value.as_str() == Some("complete") => break,
                _ if tokio::time::Instant::now() >= deadline => return,
                _ => tokio::time::sleep(SETTLE_POLL).await,
            }
        }
        tokio::time::sleep(SETTLE_GRACE).await;
    }

    /// Resolves a selector to something `querySelector` will find, falling
    /// back from the exact selector to a text/label/role scan over
    /// interactive elements. Returns `None` when nothing matches.
    pub async fn locate(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        let found = self
            .evaluate_value(&format!("!!document.querySelector({quoted})"))
            .await?;
        if found.as_bool() == Some(true) {
            return Ok(Some(selector.to_string()));
        }

        if !selector.starts_with('#') {
            return Ok(None);
        }

        // `#btn-sort-by` → "sort by": the id convention doubles as a label
        // hint when the exact id drifted.
        let keywords = selector
            .trim_start_matches('#')
            .trim_start_matches("btn-")
            .trim_start_matches("input-")
            .trim_start_matches("select-")
            .trim_start_matches("link-")
            .replace('-', " ")
            .to_lowercase();
        let quoted_keywords = serde_json::to_string(&keywords)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;

        let script = format!(
            r#"(() => {{
                const needle = {quoted_keywords};
                const norm = s => (s || '').toLowerCase().trim();
                for (const el of document.querySelectorAll('[{FALLBACK_ATTR}]')) {{
                    el.removeAttribute('{FALLBACK_ATTR}');
                }}
                const candidates = Array.from(document.querySelectorAll(
                    'a, button, input, select, textarea, [role="button"], [onclick]'
                ));
                const hit = candidates.find(el =>
                    norm(el.textContent).includes(needle) ||
                    norm(el.getAttribute('aria-label')).includes(needle) ||
                    norm(el.id).includes(needle.replace(/ /g, '-')) ||
                    norm(el.name).includes(needle) ||
                    norm(el.placeholder).includes(needle)
                );
                if (hit) {{ hit.setAttribute('{FALLBACK_ATTR}', ''); return true; }}
                return false;
            }})()"#
        );

        let matched = self.evaluate_value(&script).await?;
        if matched.as_bool() == Some(true) {
            Ok(Some(format!("[{FALLBACK_ATTR}]")))
        } else {
            Ok(None)
        }
    }

    /// Clicks the element behind a resolved selector with a trusted input
    /// event.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    /// Sets an input's value and fires input/change events.
    pub async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.set_value(selector, value, &["input", "change"]).await
    }

    /// Selects an option by value and fires a change event.
    pub async fn select(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.set_value(selector, value, &["change"]).await
    }

    async fn set_value(
        &self,
        selector: &str,
        value: &str,
        events: &[&str],
    ) -> Result<(), BrowserError> {
        let quoted_selector = serde_json::to_string(selector)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        let quoted_value = serde_json::to_string(value)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        let dispatches: String = events
            .iter()
            .map(|name| format!("el.dispatchEvent(new Event('{name}', {{ bubbles: true }}));"))
            .collect();
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({quoted_selector});
                if (!el) return false;
                el.value = {quoted_value};
                {dispatches}
                return true;
            }})()"#
        );
        let ok = self.evaluate_value(&script).await?;
        if ok.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::EvaluationFailed(format!(
                "element vanished before value could be set: {selector}"
            )))
        }
    }

    /// Evaluates an expression in page context, returning its JSON value.
    pub async fn evaluate_value(
        &self,
        expression: &str,
    ) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Current URL of the tab, when known.
    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    /// Full accessibility tree of the current document.
    pub async fn accessibility_snapshot(&self) -> Result<serde_json::Value, BrowserError> {
        let response = self
            .page
            .execute(GetFullAxTreeParams::default())
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        serde_json::to_value(&response.nodes)
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    /// Runtime errors captured so far on this tab.
    pub fn collected_errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Closes the tab.
    pub async fn close(self) {
        for task in &self.listener_tasks {
            task.abort();
        }
        let _ = self.page.close().await;
    }
}
