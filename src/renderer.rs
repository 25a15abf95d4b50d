//! Template orchestration.
//!
//! `TemplateRenderer` splits the content into text and field segments, owns the
//! single value map, and brokers Tab navigation between field controllers.
//! Controllers never write values themselves: they emit [`FieldEvent`]s and the
//! renderer decides. Everything the host needs to hear about goes through
//! [`RendererHost`].

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::{debug, info, warn};

use crate::field::{FieldController, FieldEvent, FieldInput, NavDirection};
use crate::template::{
    FieldValues, ParsedTemplate, Progress, Segment, fill_template, parse_template,
};
use crate::validators::{ValidationResult, ValidationRules};

/// Callbacks from the renderer to whatever hosts it. Both default to no-ops.
pub trait RendererHost {
    /// A value was committed; `filled` is the freshly filled content.
    fn filled_content_changed(&mut self, _filled: &str) {}

    /// Forward navigation left the last field.
    fn tab_out(&mut self) {}
}

impl RendererHost for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererOptions {
    /// Show inline errors on touched fields.
    pub show_validation: bool,
    /// Show the "N of M fields filled" line.
    pub show_progress: bool,
    pub rules: ValidationRules,
}

#[derive(Debug)]
pub struct TemplateRenderer {
    content: String,
    parsed: ParsedTemplate,
    segments: Vec<Segment>,
    /// One controller per field occurrence, in document order.
    controllers: Vec<FieldController>,
    /// Field index for each occurrence.
    occurrence_fields: Vec<usize>,
    /// Occurrence index of each field's first appearance.
    first_occurrence: Vec<usize>,
    values: FieldValues,
    /// Occurrence that receives keys.
    focused: Option<usize>,
    /// Field to activate on the next sync, then forget.
    pending_activation: Option<usize>,
    options: RendererOptions,
}

impl TemplateRenderer {
    pub fn new(content: &str, options: RendererOptions) -> Self {
        let mut renderer = Self {
            content: String::new(),
            parsed: parse_template(""),
            segments: Vec::new(),
            controllers: Vec::new(),
            occurrence_fields: Vec::new(),
            first_occurrence: Vec::new(),
            values: FieldValues::new(),
            focused: None,
            pending_activation: None,
            options,
        };
        renderer.derive(content);
        renderer
    }

    /// Re-derive everything from a new template.
    ///
    /// Identical content is a no-op. Otherwise fields, segments, controllers,
    /// values and focus are all rebuilt; nothing carries over. Returns whether
    /// the template changed.
    pub fn set_content(&mut self, content: &str) -> bool {
        if content == self.content {
            return false;
        }
        self.derive(content);
        true
    }

    fn derive(&mut self, content: &str) {
        let parsed = parse_template(content);
        let segments = parsed.segments();

        let mut controllers = Vec::new();
        let mut occurrence_fields = Vec::new();
        let mut first_occurrence = vec![usize::MAX; parsed.fields.len()];
        for segment in &segments {
            if let Segment::Field(occurrence) = segment {
                let field = &parsed.fields[occurrence.field_index];
                if first_occurrence[occurrence.field_index] == usize::MAX {
                    first_occurrence[occurrence.field_index] = controllers.len();
                }
                occurrence_fields.push(occurrence.field_index);
                controllers.push(FieldController::new(
                    field.id.clone(),
                    field.placeholder.clone(),
                    self.options.rules,
                    self.options.show_validation,
                ));
            }
        }

        info!(
            field_count = parsed.fields.len(),
            occurrence_count = controllers.len(),
            "template_loaded"
        );

        self.content = content.to_string();
        self.parsed = parsed;
        self.segments = segments;
        self.controllers = controllers;
        self.occurrence_fields = occurrence_fields;
        self.first_occurrence = first_occurrence;
        self.values = FieldValues::new();
        self.focused = None;
        self.pending_activation = None;
        self.sync_controllers();
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn parsed(&self) -> &ParsedTemplate {
        &self.parsed
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn options(&self) -> RendererOptions {
        self.options
    }

    /// Replace display and validation options, keeping values and focus.
    pub fn set_options(&mut self, options: RendererOptions) {
        if options == self.options {
            return;
        }
        debug!(?options, "renderer_options_changed");
        self.options = options;
        for controller in &mut self.controllers {
            let committed = self
                .values
                .get(controller.field_id())
                .map(String::as_str)
                .unwrap_or("");
            controller.set_validation(options.rules, options.show_validation, committed);
        }
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    /// Committed value of a field, empty when unset.
    pub fn value(&self, field_id: &str) -> &str {
        self.values.get(field_id).map(String::as_str).unwrap_or("")
    }

    pub fn occurrence_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn controller(&self, occurrence: usize) -> Option<&FieldController> {
        self.controllers.get(occurrence)
    }

    /// Mutable access for platform focus handling (`take_focus_request`).
    pub fn controller_mut(&mut self, occurrence: usize) -> Option<&mut FieldController> {
        self.controllers.get_mut(occurrence)
    }

    pub fn field_index_of(&self, occurrence: usize) -> Option<usize> {
        self.occurrence_fields.get(occurrence).copied()
    }

    pub fn focused(&self) -> Option<usize> {
        self.focused
    }

    pub fn filled_content(&self) -> String {
        fill_template(&self.content, &self.values)
    }

    pub fn progress(&self) -> Progress {
        self.parsed.progress(&self.values)
    }

    pub fn validation(&self) -> ValidationResult {
        self.options.rules.validate_parsed(&self.parsed, &self.values)
    }

    /// Errors on fields the user has already committed at least once.
    pub fn touched_error_count(&self) -> usize {
        self.validation()
            .errors
            .iter()
            .filter(|e| {
                self.controllers
                    .iter()
                    .any(|c| c.field_id() == e.field_id && c.is_touched())
            })
            .count()
    }

    /// Seed values before interaction. Unknown ids are dropped.
    pub fn prefill<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (id, value) in values {
            let id = id.into();
            if self.parsed.index_of(&id).is_some() {
                self.values.insert(id, value.into());
            } else {
                warn!(field_id = %id, "prefill_unknown_field");
            }
        }
        self.sync_controllers();
    }

    /// Clear all values and touched state, keeping the template.
    pub fn reset(&mut self) {
        let content = std::mem::take(&mut self.content);
        self.derive(&content);
    }

    /// Deliver an input to one occurrence and apply whatever it asks for.
    ///
    /// Returns false when the field did not consume the input.
    pub fn handle_input(
        &mut self,
        occurrence: usize,
        input: FieldInput,
        host: &mut impl RendererHost,
    ) -> bool {
        let Some(field_index) = self.field_index_of(occurrence) else {
            return false;
        };

        if input == FieldInput::Click && self.focused != Some(occurrence) {
            self.blur(host);
        }

        let committed = self.value(&self.parsed.fields[field_index].id).to_string();
        let Some(events) = self.controllers[occurrence].handle_input(input, &committed) else {
            return false;
        };

        for event in events {
            match event {
                FieldEvent::Activated => self.focused = Some(occurrence),
                FieldEvent::Commit { field_id, value } => self.commit_value(field_id, value, host),
                FieldEvent::Navigate(direction) => self.navigate(field_index, direction, host),
            }
        }

        self.sync_controllers();
        true
    }

    /// Route a key press to the focused field.
    ///
    /// A Viewing field does not take Tab, so Tab then moves plain focus along
    /// the same field order used for navigation. Returns whether the key was
    /// consumed.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        host: &mut impl RendererHost,
    ) -> bool {
        let Some(occurrence) = self.focused else {
            return false;
        };

        if self.handle_input(occurrence, FieldInput::Key(code, modifiers), host) {
            return true;
        }

        let direction = match code {
            KeyCode::Tab if modifiers.contains(KeyModifiers::SHIFT) => NavDirection::Prev,
            KeyCode::Tab => NavDirection::Next,
            KeyCode::BackTab => NavDirection::Prev,
            _ => return false,
        };
        let Some(field_index) = self.field_index_of(occurrence) else {
            return false;
        };
        match self.adjacent_field(field_index, direction) {
            Some(target) => self.focused = Some(self.first_occurrence[target]),
            None if direction == NavDirection::Next => {
                self.focused = None;
                debug!("renderer_tab_out");
                host.tab_out();
            }
            None => {}
        }
        true
    }

    /// Give plain focus to the first occurrence of a field, without editing it.
    pub fn focus_field(&mut self, field_index: usize, host: &mut impl RendererHost) {
        if let Some(&occurrence) = self.first_occurrence.get(field_index) {
            if self.focused != Some(occurrence) {
                self.blur(host);
            }
            self.focused = Some(occurrence);
        }
    }

    /// Focus a field and put it into editing on the next sync.
    pub fn activate_field(&mut self, field_index: usize, host: &mut impl RendererHost) {
        if field_index < self.first_occurrence.len() {
            self.focus_field(field_index, host);
            self.pending_activation = Some(field_index);
            self.sync_controllers();
        }
    }

    /// Drop focus, committing the focused field if it is mid-edit.
    pub fn blur(&mut self, host: &mut impl RendererHost) {
        if let Some(occurrence) = self.focused.take()
            && self.controllers[occurrence].is_editing()
        {
            let committed = self.value(self.controllers[occurrence].field_id()).to_string();
            if let Some(events) =
                self.controllers[occurrence].handle_input(FieldInput::Blur, &committed)
            {
                for event in events {
                    if let FieldEvent::Commit { field_id, value } = event {
                        self.commit_value(field_id, value, host);
                    }
                }
            }
            self.sync_controllers();
        }
    }

    fn commit_value(&mut self, field_id: String, value: String, host: &mut impl RendererHost) {
        debug!(field_id = %field_id, "value_committed");
        self.values.insert(field_id, value);
        let filled = fill_template(&self.content, &self.values);
        host.filled_content_changed(&filled);
    }

    fn adjacent_field(&self, field_index: usize, direction: NavDirection) -> Option<usize> {
        match direction {
            NavDirection::Next if field_index + 1 < self.parsed.fields.len() => Some(field_index + 1),
            NavDirection::Prev if field_index > 0 => Some(field_index - 1),
            _ => None,
        }
    }

    fn navigate(&mut self, field_index: usize, direction: NavDirection, host: &mut impl RendererHost) {
        match self.adjacent_field(field_index, direction) {
            Some(target) => {
                debug!(from = field_index, to = target, "field_navigate");
                self.pending_activation = Some(target);
                self.focused = Some(self.first_occurrence[target]);
            }
            None if direction == NavDirection::Next => {
                debug!("renderer_tab_out");
                self.focused = None;
                host.tab_out();
            }
            // Shift+Tab on the first field stays put
            None => {}
        }
    }

    /// Push committed values into every controller and apply any pending
    /// activation, which lasts for exactly this one pass.
    fn sync_controllers(&mut self) {
        let activate = self
            .pending_activation
            .take()
            .and_then(|index| self.first_occurrence.get(index).copied());

        for (occurrence, controller) in self.controllers.iter_mut().enumerate() {
            let committed = self
                .values
                .get(controller.field_id())
                .map(String::as_str)
                .unwrap_or("");
            controller.sync(committed);
            if activate == Some(occurrence) {
                controller.set_active(true, committed);
            }
        }
    }
}
