//! [`PageDriver`] over a CDP page session.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crawlset_core::{DriverError, ElementHandle, ElementState, NodeKey, PageDriver, Rect, Viewport};

use crate::cdp::{CdpError, PageSession, RemoteObject, WindowMetrics};
use crate::scripts;

#[derive(Debug, Deserialize)]
struct RectValue {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<RectValue> for Rect {
    fn from(r: RectValue) -> Self {
        Rect::new(r.x, r.y, r.width, r.height)
    }
}

#[derive(Debug, Deserialize)]
struct StateValue {
    display: String,
    visibility: String,
    opacity: String,
    rect: RectValue,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, DriverError> {
    serde_json::from_value(value).map_err(|e| DriverError::Protocol(format!("Unexpected result: {}", e)))
}

/// A browser tab driven over CDP.
///
/// Element handles are Runtime remote object ids; their [`NodeKey`] is the
/// node's `backendNodeId`, which is stable across queries.
pub struct CdpPage {
    session: PageSession,
}

impl CdpPage {
    pub fn new(session: PageSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &PageSession {
        &self.session
    }

    /// Wrap a remote node in a handle, releasing it if it cannot be described.
    async fn adopt(&self, object_id: String) -> Result<ElementHandle, CdpError> {
        match self.session.describe_node(&object_id).await {
            Ok(node) => Ok(ElementHandle::new(object_id, NodeKey(node.backend_node_id))),
            Err(e) => {
                let _ = self.session.release_object(&object_id).await;
                Err(e)
            }
        }
    }

    /// Unpack a remote array of nodes into handles and drop the array.
    async fn adopt_array(&self, array: RemoteObject) -> Result<Vec<ElementHandle>, CdpError> {
        let Some(array_id) = array.object_id else {
            return Ok(Vec::new());
        };
        let ids = self.session.array_object_ids(&array_id).await;
        if let Err(e) = self.session.release_object(&array_id).await {
            debug!("Failed to release array {}: {}", array_id, e);
        }

        let mut handles = Vec::new();
        let mut ids = ids?.into_iter();
        while let Some(id) = ids.next() {
            match self.adopt(id).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        let _ = self.session.release_object(handle.remote_id()).await;
                    }
                    for rest in ids {
                        let _ = self.session.release_object(&rest).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    async fn call_on(
        &self,
        element: &ElementHandle,
        declaration: &str,
        args: &[Value],
    ) -> Result<Value, DriverError> {
        Ok(self
            .session
            .call_function(element.remote_id(), declaration, args)
            .await?)
    }

    async fn nodes_from(
        &self,
        root: &ElementHandle,
        declaration: &str,
        args: &[Value],
    ) -> Result<RemoteObject, CdpError> {
        self.session
            .call_function_handle(root.remote_id(), declaration, args)
            .await
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    fn page_id(&self) -> &str {
        self.session.target_id()
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.session.navigate(url, timeout).await?;
        // Objects from the previous document are dead now.
        if let Err(e) = self.session.release_all_objects().await {
            debug!("Failed to release object group: {}", e);
        }
        Ok(())
    }

    async fn document(&self) -> Result<ElementHandle, DriverError> {
        let object = self.session.evaluate_handle("document").await?;
        let object_id = object
            .object_id
            .ok_or_else(|| DriverError::Protocol("document has no object id".to_string()))?;
        Ok(self.adopt(object_id).await?)
    }

    async fn select_all(
        &self,
        root: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let array = self
            .nodes_from(root, scripts::SELECT_ALL, &[json!(selector)])
            .await
            .map_err(|e| e.into_driver_error_for(selector))?;
        Ok(self.adopt_array(array).await?)
    }

    async fn shadow_roots(&self, root: &ElementHandle) -> Result<Vec<ElementHandle>, DriverError> {
        let array = self.nodes_from(root, scripts::SHADOW_ROOTS, &[]).await?;
        Ok(self.adopt_array(array).await?)
    }

    async fn frame_documents(
        &self,
        root: &ElementHandle,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let array = self.nodes_from(root, scripts::FRAME_DOCUMENTS, &[]).await?;
        Ok(self.adopt_array(array).await?)
    }

    async fn matches(&self, element: &ElementHandle, selector: &str) -> Result<bool, DriverError> {
        let value = self
            .session
            .call_function(element.remote_id(), scripts::MATCHES, &[json!(selector)])
            .await
            .map_err(|e| e.into_driver_error_for(selector))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, DriverError> {
        let state: StateValue = decode(self.call_on(element, scripts::ELEMENT_STATE, &[]).await?)?;
        Ok(ElementState {
            display: state.display,
            visibility: state.visibility,
            opacity: state.opacity,
            rect: state.rect.into(),
        })
    }

    async fn bounding_rect(&self, element: &ElementHandle) -> Result<Rect, DriverError> {
        let rect: RectValue = decode(self.call_on(element, scripts::BOUNDING_RECT, &[]).await?)?;
        Ok(rect.into())
    }

    async fn viewport(&self) -> Result<Viewport, DriverError> {
        let metrics: WindowMetrics = decode(self.session.evaluate(scripts::VIEWPORT).await?)?;
        Ok(Viewport::new(metrics.width, metrics.height, metrics.dpr))
    }

    async fn set_outline(
        &self,
        element: &ElementHandle,
        outline: &str,
    ) -> Result<String, DriverError> {
        let previous = self
            .call_on(element, scripts::SET_OUTLINE, &[json!(outline)])
            .await?;
        Ok(previous.as_str().unwrap_or_default().to_string())
    }

    async fn set_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), DriverError> {
        self.call_on(element, scripts::SET_ATTRIBUTE, &[json!(name), json!(value)])
            .await?;
        Ok(())
    }

    async fn flush_render(&self) -> Result<(), DriverError> {
        self.session.evaluate(scripts::FLUSH_RENDER).await?;
        Ok(())
    }

    async fn scroll_by(&self, dy: f64) -> Result<(), DriverError> {
        self.session.evaluate(&scripts::scroll_by(dy)).await?;
        Ok(())
    }

    async fn scroll_to_center(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.call_on(element, scripts::SCROLL_TO_CENTER, &[]).await?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.call_on(element, scripts::CLICK, &[]).await?;
        Ok(())
    }

    async fn href(&self, element: &ElementHandle) -> Result<Option<String>, DriverError> {
        let value = self.call_on(element, scripts::HREF, &[]).await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        Ok(self.session.save_screenshot(path).await?)
    }

    async fn release(&self, element: &ElementHandle) -> Result<(), DriverError> {
        Ok(self.session.release_object(element.remote_id()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_element_state() {
        let state: StateValue = decode(json!({
            "display": "block",
            "visibility": "visible",
            "opacity": "1",
            "rect": {"x": 10.5, "y": -4.0, "width": 300.0, "height": 120.0}
        }))
        .unwrap();
        assert_eq!(state.display, "block");
        assert_eq!(Rect::from(state.rect), Rect::new(10.5, -4.0, 300.0, 120.0));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let err = decode::<RectValue>(json!({"x": 1.0})).unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_decode_window_metrics() {
        let metrics: WindowMetrics = decode(json!({"width": 1280, "height": 800, "dpr": 2})).unwrap();
        assert_eq!(metrics.width, 1280.0);
        assert_eq!(metrics.dpr, 2.0);
    }
}
