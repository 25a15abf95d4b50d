//! Inline fill engine for `{{field:hint}}` prompt templates.
//!
//! [`template`] parses and fills templates, [`validators`] checks values,
//! [`field`] drives one placeholder's view/edit cycle and [`renderer`] ties
//! the fields of a whole template together.

pub mod field;
pub mod renderer;
pub mod template;
pub mod validators;

pub use field::{FieldController, FieldEvent, FieldInput, FieldMode, NavDirection};
pub use renderer::{RendererHost, RendererOptions, TemplateRenderer};
pub use template::{
    Field, FieldOccurrence, FieldValues, ParsedTemplate, Progress, Segment, fill_template,
    get_field_progress, is_template, parse_template,
};
pub use validators::{
    ValidationCode, ValidationError, ValidationResult, ValidationRules, ValidationWarning,
    has_required_fields_filled, validate_all_fields, validate_template_field,
};
