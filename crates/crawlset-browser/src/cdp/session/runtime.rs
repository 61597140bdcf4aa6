//! Runtime and DOM object operations for CDP page session.

use serde_json::{json, Value};

use crate::cdp::error::CdpError;
use crate::cdp::protocol::{
    array_elements, DescribedNode, ExceptionDetails, PropertyDescriptor, RemoteObject,
};

use super::core::{PageSession, OBJECT_GROUP};

/// Parameters for `Runtime.callFunctionOn`.
pub(super) fn function_params(
    object_id: &str,
    declaration: &str,
    args: &[Value],
    by_value: bool,
) -> Value {
    let mut params = json!({
        "objectId": object_id,
        "functionDeclaration": declaration,
        "returnByValue": by_value,
        "awaitPromise": true,
    });
    if !args.is_empty() {
        params["arguments"] = json!(args.iter().map(|v| json!({"value": v})).collect::<Vec<_>>());
    }
    if !by_value {
        params["objectGroup"] = json!(OBJECT_GROUP);
    }
    params
}

/// Turn `exceptionDetails` in a Runtime result into an error.
pub(super) fn check_exception(result: &Value) -> Result<(), CdpError> {
    match result.get("exceptionDetails") {
        Some(details) => {
            let message = serde_json::from_value::<ExceptionDetails>(details.clone())
                .map(|d| d.message())
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(CdpError::JavaScript(message))
        }
        None => Ok(()),
    }
}

impl PageSession {
    /// Evaluate a JavaScript expression and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;
        check_exception(&result)?;
        Ok(result["result"]["value"].clone())
    }

    /// Evaluate a JavaScript expression and keep the result remote.
    pub async fn evaluate_handle(&self, expression: &str) -> Result<RemoteObject, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": false,
                    "objectGroup": OBJECT_GROUP,
                })),
            )
            .await?;
        check_exception(&result)?;
        Ok(serde_json::from_value(result["result"].clone())?)
    }

    /// Call `declaration` with `this` bound to a remote object; returns the
    /// JSON value of the result.
    pub async fn call_function(
        &self,
        object_id: &str,
        declaration: &str,
        args: &[Value],
    ) -> Result<Value, CdpError> {
        let params = function_params(object_id, declaration, args, true);
        let result = self.call("Runtime.callFunctionOn", Some(params)).await?;
        check_exception(&result)?;
        Ok(result["result"]["value"].clone())
    }

    /// Like [`call_function`](Self::call_function) but the result stays remote.
    pub async fn call_function_handle(
        &self,
        object_id: &str,
        declaration: &str,
        args: &[Value],
    ) -> Result<RemoteObject, CdpError> {
        let params = function_params(object_id, declaration, args, false);
        let result = self.call("Runtime.callFunctionOn", Some(params)).await?;
        check_exception(&result)?;
        Ok(serde_json::from_value(result["result"].clone())?)
    }

    /// Object ids of a remote array's elements, in index order.
    pub async fn array_object_ids(&self, object_id: &str) -> Result<Vec<String>, CdpError> {
        let result = self
            .call(
                "Runtime.getProperties",
                Some(json!({
                    "objectId": object_id,
                    "ownProperties": true,
                })),
            )
            .await?;
        check_exception(&result)?;
        let properties: Vec<PropertyDescriptor> = serde_json::from_value(result["result"].clone())?;
        Ok(array_elements(&properties))
    }

    pub async fn describe_node(&self, object_id: &str) -> Result<DescribedNode, CdpError> {
        let result = self
            .call("DOM.describeNode", Some(json!({"objectId": object_id})))
            .await?;
        Ok(serde_json::from_value(result["node"].clone())?)
    }

    pub async fn release_object(&self, object_id: &str) -> Result<(), CdpError> {
        self.call("Runtime.releaseObject", Some(json!({"objectId": object_id})))
            .await?;
        Ok(())
    }
}
