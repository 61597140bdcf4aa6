use super::*;
use crate::schema::{AnnotationSpec, InteractionConfig, LinksConfig};
use crate::ConfigLoader;

fn base_config() -> Config {
    ConfigLoader::load_str(
        r#"
        target_url = "https://example.com/feed"

        [[pages]]
        label = "feed"
        targets = ["article"]
        annotations = [{ selector = "h2", category = "title" }]

        [[pages]]
        label = "post"
        targets = ["main"]
        annotations = [{ selector = "h1", category = "title" }]
        "#,
    )
    .unwrap()
}

fn links(page: &str, follow: &str) -> LinksConfig {
    LinksConfig {
        page: page.to_string(),
        follow: follow.to_string(),
        targets: vec!["article".to_string()],
        open_selector: None,
        comments_pattern: None,
        max_links: 5,
    }
}

#[test]
fn test_validate_base_config() {
    let result = ConfigValidator::validate(&base_config());
    assert!(result.is_valid(), "{:?}", result.errors);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_empty_target_url() {
    let mut config = base_config();
    config.target_url = "  ".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "target_url"));
}

#[test]
fn test_validate_non_http_target_url() {
    let mut config = base_config();
    config.target_url = "file:///etc/passwd".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors[0].message.contains("file"));
}

#[test]
fn test_validate_scroll_step_bounds() {
    let mut config = base_config();
    config.scroll.step = 0.0;
    assert!(!ConfigValidator::validate(&config).is_valid());

    config.scroll.step = 5.0;
    assert!(!ConfigValidator::validate(&config).is_valid());

    config.scroll.step = 1.0;
    assert!(ConfigValidator::validate(&config).is_valid());
}

#[test]
fn test_validate_zero_stable_rounds() {
    let mut config = base_config();
    config.scroll.stable_rounds = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "scroll.stable_rounds"));
}

#[test]
fn test_validate_no_pages() {
    let mut config = base_config();
    config.pages.clear();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "pages"));
}

#[test]
fn test_validate_duplicate_and_bad_labels() {
    let mut config = base_config();
    config.pages[1].label = "feed".to_string();
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.message.contains("duplicate")));

    config.pages[1].label = "my page".to_string();
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "pages[1].label"));
}

#[test]
fn test_validate_page_without_targets() {
    let mut config = base_config();
    config.pages[0].targets = vec![" ".to_string()];

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "pages[0].targets"));
}

#[test]
fn test_validate_max_shots() {
    let mut config = base_config();
    config.pages[0].max_shots = 0;
    assert!(!ConfigValidator::validate(&config).is_valid());

    config.pages[0].max_shots = 1000;
    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "pages[0].max_shots"));
}

#[test]
fn test_validate_empty_annotation_fields() {
    let mut config = base_config();
    config.pages[0].annotations.push(AnnotationSpec::new("", "title"));

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "pages[0].annotations[1]"));
}

#[test]
fn test_validate_missing_annotations_warns() {
    let mut config = base_config();
    config.pages[1].annotations.clear();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_validate_links_unknown_labels() {
    let mut config = base_config();
    config.links = Some(links("feed", "comments"));

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "links.follow"));
}

#[test]
fn test_validate_links_bad_pattern() {
    let mut config = base_config();
    let mut l = links("feed", "post");
    l.comments_pattern = Some("(unclosed".to_string());
    config.links = Some(l);

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "links.comments_pattern"));
}

#[test]
fn test_validate_links_ok() {
    let mut config = base_config();
    let mut l = links("feed", "post");
    l.comments_pattern = Some(r"/comments/\d+".to_string());
    config.links = Some(l);

    assert!(ConfigValidator::validate(&config).is_valid());
}

#[test]
fn test_validate_interaction_requires_selectors() {
    let mut config = base_config();
    config.interaction = Some(InteractionConfig {
        component_selectors: vec!["details".to_string()],
        trigger_selector: String::new(),
        expected_selector: ".body".to_string(),
        timeout_ms: 1000,
    });

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "interaction.trigger_selector"));
}

#[test]
fn test_into_result_joins_errors() {
    let mut config = base_config();
    config.pages.clear();
    config.scroll.stable_rounds = 0;

    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("pages"));
    assert!(msg.contains("scroll.stable_rounds"));
}
