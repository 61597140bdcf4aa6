use super::*;

#[test]
fn test_cdp_request_serialize() {
    let req = CdpRequest {
        id: 1,
        method: "Page.navigate".to_string(),
        params: Some(serde_json::json!({"url": "https://example.com"})),
        session_id: Some("S1".to_string()),
    };
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("Page.navigate"));
    assert!(json.contains("example.com"));
    assert!(json.contains("\"sessionId\":\"S1\""));
}

#[test]
fn test_cdp_request_omits_empty_fields() {
    let req = CdpRequest {
        id: 2,
        method: "Target.getTargets".to_string(),
        params: None,
        session_id: None,
    };
    let json = serde_json::to_string(&req).unwrap();
    assert_eq!(json, r#"{"id":2,"method":"Target.getTargets"}"#);
}

#[test]
fn test_cdp_response_deserialize() {
    let json = r#"{"id": 1, "result": {"frameId": "abc"}}"#;
    let resp: CdpResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.id, Some(1));
    assert!(resp.result.is_some());
}

#[test]
fn test_cdp_event_deserialize() {
    let json = r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}, "sessionId": "S1"}"#;
    let resp: CdpResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.id, None);
    assert_eq!(resp.method.as_deref(), Some("Page.loadEventFired"));
    assert_eq!(resp.session_id.as_deref(), Some("S1"));
}

#[test]
fn test_page_info_deserialize() {
    let json = r#"{
        "id": "page123",
        "type": "page",
        "title": "Test",
        "url": "https://example.com",
        "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/page123"
    }"#;
    let info: PageInfo = serde_json::from_str(json).unwrap();
    assert_eq!(info.id, "page123");
    assert_eq!(info.page_type, "page");
}

#[test]
fn test_remote_object_null() {
    let null: RemoteObject =
        serde_json::from_str(r#"{"type": "object", "subtype": "null", "value": null}"#).unwrap();
    assert!(null.is_null());

    let node: RemoteObject = serde_json::from_str(
        r#"{"type": "object", "subtype": "node", "className": "HTMLDivElement", "objectId": "1.2.3"}"#,
    )
    .unwrap();
    assert!(!node.is_null());
    assert_eq!(node.object_id.as_deref(), Some("1.2.3"));
}

#[test]
fn test_exception_message_prefers_description() {
    let details: ExceptionDetails = serde_json::from_str(
        r#"{
            "text": "Uncaught",
            "exception": {
                "type": "object",
                "subtype": "error",
                "description": "SyntaxError: Failed to execute 'querySelectorAll' on 'Document': 'div[' is not a valid selector.\n    at <anonymous>:1:38"
            }
        }"#,
    )
    .unwrap();
    assert_eq!(
        details.message(),
        "SyntaxError: Failed to execute 'querySelectorAll' on 'Document': 'div[' is not a valid selector."
    );

    let bare: ExceptionDetails = serde_json::from_str(r#"{"text": "Uncaught"}"#).unwrap();
    assert_eq!(bare.message(), "Uncaught");
}

#[test]
fn test_array_elements_in_index_order() {
    let properties: Vec<PropertyDescriptor> = serde_json::from_str(
        r#"[
            {"name": "1", "value": {"type": "object", "subtype": "node", "objectId": "b"}},
            {"name": "0", "value": {"type": "object", "subtype": "node", "objectId": "a"}},
            {"name": "10", "value": {"type": "object", "subtype": "node", "objectId": "k"}},
            {"name": "2", "value": {"type": "object", "subtype": "node", "objectId": "c"}},
            {"name": "length", "value": {"type": "number", "value": 4}},
            {"name": "__proto__", "value": {"type": "object", "objectId": "proto"}}
        ]"#,
    )
    .unwrap();
    assert_eq!(array_elements(&properties), vec!["a", "b", "c", "k"]);
}

#[test]
fn test_described_node_deserialize() {
    let node: DescribedNode = serde_json::from_str(
        r#"{"nodeId": 0, "backendNodeId": 42, "nodeType": 1, "nodeName": "ARTICLE", "localName": "article"}"#,
    )
    .unwrap();
    assert_eq!(node.backend_node_id, 42);
    assert_eq!(node.node_name, "ARTICLE");
}

#[test]
fn test_screenshot_format_serialize() {
    let fmt = ScreenshotFormat::Png;
    let json = serde_json::to_string(&fmt).unwrap();
    assert_eq!(json, "\"png\"");
}
