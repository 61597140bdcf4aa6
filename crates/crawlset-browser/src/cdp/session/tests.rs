use serde_json::json;

use super::navigation::is_loaded;
use super::runtime::{check_exception, function_params};
use crate::cdp::error::CdpError;

#[test]
fn test_function_params_by_value() {
    let params = function_params("obj-1", "function(s){ return this.matches(s); }", &[json!("a")], true);
    assert_eq!(params["objectId"], "obj-1");
    assert_eq!(params["returnByValue"], true);
    assert_eq!(params["arguments"], json!([{"value": "a"}]));
    assert!(params.get("objectGroup").is_none());
}

#[test]
fn test_function_params_handle_uses_object_group() {
    let params = function_params("obj-1", "function(){ return this.shadowRoot; }", &[], false);
    assert_eq!(params["returnByValue"], false);
    assert_eq!(params["objectGroup"], "crawlset");
    assert!(params.get("arguments").is_none());
}

#[test]
fn test_function_params_null_argument() {
    let params = function_params("obj-1", "function(n, v){}", &[json!("data-x"), json!(null)], true);
    assert_eq!(params["arguments"], json!([{"value": "data-x"}, {"value": null}]));
}

#[test]
fn test_check_exception() {
    assert!(check_exception(&json!({"result": {"type": "undefined"}})).is_ok());

    let err = check_exception(&json!({
        "result": {"type": "object", "subtype": "error"},
        "exceptionDetails": {
            "text": "Uncaught",
            "exception": {"type": "object", "description": "SyntaxError: 'a >>> b' is not a valid selector."}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, CdpError::JavaScript(ref m) if m.contains("not a valid selector")));
    assert!(err.is_selector_error());
}

#[test]
fn test_is_loaded() {
    assert!(is_loaded(&json!("complete")));
    assert!(is_loaded(&json!("interactive")));
    assert!(!is_loaded(&json!("loading")));
    assert!(!is_loaded(&json!("previous")));
    assert!(!is_loaded(&json!(null)));
}
