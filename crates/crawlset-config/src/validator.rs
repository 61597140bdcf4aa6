//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse the errors into a single `ConfigError::Invalid`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.is_valid() {
            return Ok(self.warnings);
        }
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid(joined))
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_target(config, &mut result);
        Self::validate_scroll(config, &mut result);
        Self::validate_pages(config, &mut result);
        Self::validate_links(config, &mut result);
        Self::validate_interaction(config, &mut result);

        result
    }

    fn validate_target(config: &Config, result: &mut ValidationResult) {
        if config.target_url.trim().is_empty() {
            result.add_error(ValidationError::new("target_url", "target_url cannot be empty"));
            return;
        }
        match url::Url::parse(&config.target_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => result.add_error(ValidationError::new(
                "target_url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => result.add_error(ValidationError::new(
                "target_url",
                format!("invalid URL: {}", e),
            )),
        }

        if config.browser.navigation_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "browser.navigation_timeout_ms",
                "navigation timeout must be greater than 0",
            ));
        }
        if config.browser.viewport_width == 0 || config.browser.viewport_height == 0 {
            result.add_error(ValidationError::new(
                "browser.viewport",
                "viewport dimensions must be greater than 0",
            ));
        }
    }

    fn validate_scroll(config: &Config, result: &mut ValidationResult) {
        let step = config.scroll.step;
        if !(step > 0.0 && step <= 4.0) {
            result.add_error(ValidationError::new(
                "scroll.step",
                "step must be in (0, 4] viewport heights",
            ));
        }
        if config.scroll.stable_rounds == 0 {
            result.add_error(ValidationError::new(
                "scroll.stable_rounds",
                "stable_rounds must be greater than 0",
            ));
        }
    }

    fn validate_pages(config: &Config, result: &mut ValidationResult) {
        if config.pages.is_empty() {
            result.add_error(ValidationError::new(
                "pages",
                "at least one page is required",
            ));
            return;
        }

        let mut labels = HashSet::new();
        for (i, page) in config.pages.iter().enumerate() {
            let path = format!("pages[{}]", i);

            if page.label.is_empty()
                || !page
                    .label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                result.add_error(ValidationError::new(
                    format!("{}.label", path),
                    "label must be non-empty and contain only [A-Za-z0-9_-]",
                ));
            }
            if !labels.insert(page.label.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.label", path),
                    format!("duplicate page label '{}'", page.label),
                ));
            }

            if page.targets.iter().all(|t| t.trim().is_empty()) {
                result.add_error(ValidationError::new(
                    format!("{}.targets", path),
                    "at least one target selector is required",
                ));
            }

            if page.max_shots == 0 {
                result.add_error(ValidationError::new(
                    format!("{}.max_shots", path),
                    "max_shots must be greater than 0",
                ));
            } else if page.max_shots > 500 {
                result.add_warning(ValidationWarning::new(
                    format!("{}.max_shots", path),
                    "max_shots is very high (>500), the run may take a long time",
                ));
            }

            if page.annotations.is_empty() {
                result.add_warning(ValidationWarning::new(
                    format!("{}.annotations", path),
                    "no annotations configured, captures will carry no boxes",
                ));
            }

            for (j, spec) in page.annotations.iter().enumerate() {
                if spec.selector.trim().is_empty() || spec.category.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("{}.annotations[{}]", path, j),
                        "selector and category cannot be empty",
                    ));
                }
            }
        }
    }

    fn validate_links(config: &Config, result: &mut ValidationResult) {
        let Some(links) = &config.links else {
            return;
        };

        for (field, label) in [("links.page", &links.page), ("links.follow", &links.follow)] {
            if config.page(label).is_none() {
                result.add_error(ValidationError::new(
                    field,
                    format!("unknown page label '{}'", label),
                ));
            }
        }

        if links.targets.is_empty() {
            result.add_error(ValidationError::new(
                "links.targets",
                "at least one link target selector is required",
            ));
        }

        if let Some(pattern) = &links.comments_pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                result.add_error(ValidationError::new(
                    "links.comments_pattern",
                    format!("invalid regex: {}", e),
                ));
            }
        }

        if links.max_links == 0 {
            result.add_warning(ValidationWarning::new(
                "links.max_links",
                "max_links is 0, no links will be followed",
            ));
        }
    }

    fn validate_interaction(config: &Config, result: &mut ValidationResult) {
        let Some(interaction) = &config.interaction else {
            return;
        };

        if interaction.component_selectors.is_empty() {
            result.add_warning(ValidationWarning::new(
                "interaction.component_selectors",
                "no component selectors, the interaction never triggers",
            ));
            return;
        }
        if interaction.trigger_selector.trim().is_empty() {
            result.add_error(ValidationError::new(
                "interaction.trigger_selector",
                "trigger_selector cannot be empty",
            ));
        }
        if interaction.expected_selector.trim().is_empty() {
            result.add_error(ValidationError::new(
                "interaction.expected_selector",
                "expected_selector cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
