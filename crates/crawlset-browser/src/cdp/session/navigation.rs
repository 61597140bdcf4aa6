//! Navigation and capture operations for CDP page session.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::cdp::error::CdpError;
use crate::cdp::protocol::ScreenshotFormat;

use super::core::PageSession;

const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MARK_DOCUMENT: &str = "window.__crawlsetPreviousDocument = true";

const READY_STATE_OF_NEW_DOCUMENT: &str =
    "window.__crawlsetPreviousDocument === true ? 'previous' : document.readyState";

/// Whether a polled ready state means the document can be queried.
pub(super) fn is_loaded(state: &Value) -> bool {
    matches!(state.as_str(), Some("complete" | "interactive"))
}

impl PageSession {
    /// Navigate and wait for the document to become interactive, failing
    /// once `timeout` has elapsed.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<String, CdpError> {
        tokio::time::timeout(timeout, self.navigate_and_wait(url))
            .await
            .map_err(|_| CdpError::Timeout(format!("Navigation to {} timed out", url)))?
    }

    async fn navigate_and_wait(&self, url: &str) -> Result<String, CdpError> {
        // Tag the current document so polling can tell it from its successor.
        match self.evaluate(MARK_DOCUMENT).await {
            Ok(_) => {}
            Err(e) if e.is_stale() => {}
            Err(e) => return Err(e),
        }

        let result = self
            .call("Page.navigate", Some(json!({"url": url})))
            .await?;

        if let Some(error) = result.get("errorText").and_then(|e| e.as_str()) {
            return Err(CdpError::NavigationFailed(format!("{} ({})", error, url)));
        }

        let frame_id = result["frameId"].as_str().unwrap_or("main").to_string();
        // No loaderId means a same-document navigation; the tag stays.
        let new_document = result.get("loaderId").is_some_and(|id| id.is_string());
        self.poll_ready_state(new_document).await?;

        debug!("Navigated to {}", url);
        Ok(frame_id)
    }

    /// Poll `document.readyState` until the page is usable. With
    /// `new_document`, states reported by the tagged document are ignored.
    async fn poll_ready_state(&self, new_document: bool) -> Result<(), CdpError> {
        let expression = if new_document {
            READY_STATE_OF_NEW_DOCUMENT
        } else {
            "document.readyState"
        };
        loop {
            match self.evaluate(expression).await {
                Ok(state) if is_loaded(&state) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_stale() => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(LOAD_POLL_INTERVAL).await;
        }
    }

    /// Capture the current viewport and return the decoded image bytes.
    pub async fn capture_screenshot(&self, format: ScreenshotFormat) -> Result<Vec<u8>, CdpError> {
        let result = self
            .call(
                "Page.captureScreenshot",
                Some(json!({
                    "format": format,
                    "captureBeyondViewport": false,
                    "fromSurface": true,
                })),
            )
            .await?;

        let data = result["data"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Missing screenshot data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| CdpError::InvalidResponse(format!("Screenshot data: {}", e)))
    }

    /// Capture the viewport as PNG into `path`, creating parent directories.
    pub async fn save_screenshot(&self, path: &Path) -> Result<(), CdpError> {
        let bytes = self.capture_screenshot(ScreenshotFormat::Png).await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!("Saved screenshot {}", path.display());
        Ok(())
    }
}
