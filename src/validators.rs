//! Validation of entered field values.
//!
//! Validation is advisory: results are data, never errors, and an invalid field
//! still fills and copies like any other. Hints double as a lightweight type
//! contract: a hint mentioning "email" expects an address, "url" a link, and so on.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::template::{FieldValues, ParsedTemplate, is_filled, parse_template};

/// Values longer than this (in characters) earn a length warning by default.
pub const DEFAULT_LONG_VALUE_WARNING: usize = 500;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// `scheme:rest` where the scheme needs an authority (`//host`).
static SPECIAL_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?|ftp|wss?)://[^\s/?#]+(?:[/?#]\S*)?$").expect("valid url pattern")
});

static SPECIAL_SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?|ftp|wss?|file):").expect("valid scheme pattern"));

/// Any other absolute URL, e.g. `mailto:someone`.
static SCHEME_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").expect("valid scheme pattern"));

/// A bare host and optional path, as in `example.com/page`.
static BARE_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s/?#]+(?:[/?#]\S*)?$").expect("valid host pattern"));

/// Kind of validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// Value missing for a required field.
    Required,
    /// Value does not match the type implied by the hint.
    Format,
    /// Value is unusually long.
    Length,
}

impl ValidationCode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Format => "format",
            Self::Length => "length",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field_id: String,
    pub message: String,
    pub code: ValidationCode,
}

/// Advisory note that never makes a field invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub field_id: String,
    pub message: String,
    pub code: ValidationCode,
}

/// Outcome of validating one field or a whole template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub filled_count: usize,
    pub total_count: usize,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error for a given field, if any.
    pub fn error_for(&self, field_id: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.field_id == field_id)
    }
}

/// The rule set applied by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Treat every field as required, not only those whose hint says so.
    pub require_all: bool,
    /// Character count above which a length warning is raised.
    pub long_value_warning: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            require_all: true,
            long_value_warning: DEFAULT_LONG_VALUE_WARNING,
        }
    }
}

impl ValidationRules {
    /// Whether a field with this hint must be filled.
    pub fn is_required(&self, hint: &str) -> bool {
        self.require_all || hint.to_lowercase().contains("required")
    }

    /// Validate a single value against the rules implied by its hint.
    pub fn validate_field(&self, field_id: &str, value: &str, hint: &str) -> ValidationResult {
        let mut result = ValidationResult {
            total_count: 1,
            ..ValidationResult::default()
        };
        let hint_lower = hint.to_lowercase();

        if !is_filled(value) {
            if self.is_required(hint) {
                result.errors.push(error(
                    field_id,
                    ValidationCode::Required,
                    "This field is required",
                ));
            }
            return result;
        }
        result.filled_count = 1;

        if mentions_any(&hint_lower, &["email", "@"]) && !check_email(value) {
            result.errors.push(error(
                field_id,
                ValidationCode::Format,
                "Please enter a valid email address",
            ));
        }

        if mentions_any(&hint_lower, &["url", "website", "link"]) && !check_url(value) {
            result.errors.push(error(
                field_id,
                ValidationCode::Format,
                "Please enter a valid URL",
            ));
        }

        if mentions_any(&hint_lower, &["number", "amount", "count", "age"]) && !check_number(value)
        {
            result.errors.push(error(
                field_id,
                ValidationCode::Format,
                "Please enter a valid number",
            ));
        }

        if value.chars().count() > self.long_value_warning {
            result.warnings.push(ValidationWarning {
                field_id: field_id.to_string(),
                message: "This field is quite long. Consider being more concise.".to_string(),
                code: ValidationCode::Length,
            });
        }

        result
    }

    /// Validate every field of a parsed template.
    pub fn validate_parsed(&self, parsed: &ParsedTemplate, values: &FieldValues) -> ValidationResult {
        let mut result = ValidationResult::default();

        for field in &parsed.fields {
            let value = values.get(&field.id).map(String::as_str).unwrap_or("");
            let field_result = self.validate_field(&field.id, value, &field.placeholder);
            result.errors.extend(field_result.errors);
            result.warnings.extend(field_result.warnings);
            result.filled_count += field_result.filled_count;
        }
        result.total_count = parsed.fields.len();

        result
    }

    /// Validate every field found in `content`.
    pub fn validate_all(&self, content: &str, values: &FieldValues) -> ValidationResult {
        self.validate_parsed(&parse_template(content), values)
    }

    /// Check that every required field has a value.
    pub fn required_fields_filled(&self, content: &str, values: &FieldValues) -> bool {
        parse_template(content).fields.iter().all(|field| {
            !self.is_required(&field.placeholder)
                || values.get(&field.id).is_some_and(|v| is_filled(v))
        })
    }
}

/// Validate a single field with the default rules.
pub fn validate_template_field(field_id: &str, value: &str, hint: &str) -> ValidationResult {
    ValidationRules::default().validate_field(field_id, value, hint)
}

/// Validate every field of a template with the default rules.
pub fn validate_all_fields(content: &str, values: &FieldValues) -> ValidationResult {
    ValidationRules::default().validate_all(content, values)
}

/// Check that every required field has a value, using the default rules.
pub fn has_required_fields_filled(content: &str, values: &FieldValues) -> bool {
    ValidationRules::default().required_fields_filled(content, values)
}

fn error(field_id: &str, code: ValidationCode, message: &str) -> ValidationError {
    ValidationError {
        field_id: field_id.to_string(),
        message: message.to_string(),
        code,
    }
}

fn mentions_any(hint_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| hint_lower.contains(k))
}

/// Check for a `local@domain.tld` shaped address (pure function).
fn check_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Check that a value is an absolute URL, or a dotted host once `https://` is assumed.
fn check_url(value: &str) -> bool {
    let value = value.trim();
    if SPECIAL_SCHEME_REGEX.is_match(value) {
        // `file:` needs no host
        return SPECIAL_URL_REGEX.is_match(value)
            || (value.len() > 5
                && value
                    .get(..5)
                    .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file:")));
    }
    if SCHEME_URL_REGEX.is_match(value) {
        return true;
    }
    BARE_URL_REGEX.is_match(value) && value.contains('.')
}

/// Check that a value parses as a finite number (pure function).
fn check_number(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok_and(f64::is_finite)
}
