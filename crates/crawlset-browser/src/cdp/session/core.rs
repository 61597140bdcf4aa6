//! Core session struct and CDP command dispatch.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cdp::client::Transport;
use crate::cdp::error::CdpError;
use crate::cdp::protocol::CdpResponse;

/// Remote objects created for the crawl are kept in this group.
pub(crate) const OBJECT_GROUP: &str = "crawlset";

/// A session attached to a single page/target.
pub struct PageSession {
    pub(super) target_id: String,
    pub(super) session_id: String,
    pub(super) transport: Arc<Transport>,
    /// Kept alive so the client's event route stays open.
    pub(super) _event_rx: mpsc::UnboundedReceiver<CdpResponse>,
}

impl PageSession {
    pub(crate) fn new(
        target_id: String,
        session_id: String,
        transport: Arc<Transport>,
        event_rx: mpsc::UnboundedReceiver<CdpResponse>,
    ) -> Self {
        Self {
            target_id,
            session_id,
            transport,
            _event_rx: event_rx,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a CDP command to this page session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.transport
            .call(method, params, Some(&self.session_id))
            .await
    }

    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("DOM.enable", None).await?;
        self.call("Runtime.enable", None).await?;

        debug!("Enabled CDP domains for session {}", self.session_id);
        Ok(())
    }

    /// Pin the layout viewport size; `deviceScaleFactor: 0` keeps the
    /// display's native ratio.
    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<(), CdpError> {
        self.call(
            "Emulation.setDeviceMetricsOverride",
            Some(json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 0,
                "mobile": false,
            })),
        )
        .await?;
        Ok(())
    }

    /// Release every remote object handed out to this session.
    pub async fn release_all_objects(&self) -> Result<(), CdpError> {
        self.call(
            "Runtime.releaseObjectGroup",
            Some(json!({"objectGroup": OBJECT_GROUP})),
        )
        .await?;
        Ok(())
    }
}
