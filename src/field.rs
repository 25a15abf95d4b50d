//! Inline field widget state.
//!
//! A `FieldController` is a two-state machine (Viewing / Editing) for one
//! placeholder occurrence. It keeps only a local edit buffer: the committed
//! value lives with the renderer and is passed in on every call, and every
//! change the controller wants is reported back as a [`FieldEvent`].

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::validators::{ValidationError, ValidationRules};

/// Narrowest a field is drawn, in terminal columns.
pub const MIN_FIELD_WIDTH: usize = 6;
/// Widest a field is drawn before its text is truncated.
pub const MAX_FIELD_WIDTH: usize = 40;
/// Columns of padding around the field text.
pub const FIELD_PADDING: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldMode {
    #[default]
    Viewing,
    Editing,
}

/// Direction of a Tab / Shift+Tab navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Next,
    Prev,
}

/// Input delivered to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInput {
    Click,
    Key(KeyCode, KeyModifiers),
    /// Focus left the field.
    Blur,
}

/// Request from a field to its renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEvent {
    /// The field entered Editing on its own (click, Enter, Space).
    Activated,
    /// Store `value` as the field's committed value.
    Commit { field_id: String, value: String },
    /// Move to the adjacent field.
    Navigate(NavDirection),
}

#[derive(Debug, Clone)]
pub struct FieldController {
    field_id: String,
    hint: String,
    mode: FieldMode,
    buffer: String,
    /// Cursor position in chars within `buffer`.
    cursor: usize,
    touched: bool,
    show_validation: bool,
    rules: ValidationRules,
    errors: Vec<ValidationError>,
    focus_requested: bool,
}

impl FieldController {
    pub fn new(
        field_id: impl Into<String>,
        hint: impl Into<String>,
        rules: ValidationRules,
        show_validation: bool,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            hint: hint.into(),
            mode: FieldMode::Viewing,
            buffer: String::new(),
            cursor: 0,
            touched: false,
            show_validation,
            rules,
            errors: Vec::new(),
            focus_requested: false,
        }
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == FieldMode::Editing
    }

    /// Whether the field has been committed at least once.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Cursor position in chars.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// True when validation is shown and the touched field is invalid.
    pub fn has_error(&self) -> bool {
        self.show_validation && !self.errors.is_empty()
    }

    /// Message of the first error to show inline.
    pub fn error_message(&self) -> Option<&str> {
        if self.show_validation {
            self.errors.first().map(|e| e.message.as_str())
        } else {
            None
        }
    }

    /// Bring the controller up to date with the committed value.
    ///
    /// Outside of editing the buffer mirrors the committed value. Errors are
    /// recomputed only once the field is touched.
    pub fn sync(&mut self, committed: &str) {
        if self.mode == FieldMode::Viewing && self.buffer != committed {
            self.buffer = committed.to_string();
            self.cursor = self.buffer.chars().count();
        }
        if self.show_validation && self.touched {
            self.errors = self
                .rules
                .validate_field(&self.field_id, committed, &self.hint)
                .errors;
        }
    }

    /// Swap validation settings and recompute errors against `committed`.
    pub fn set_validation(&mut self, rules: ValidationRules, show_validation: bool, committed: &str) {
        self.rules = rules;
        self.show_validation = show_validation;
        self.errors.clear();
        self.sync(committed);
    }

    /// Focus intent from the renderer. An active Viewing field starts editing.
    ///
    /// Returns true if this caused a transition.
    pub fn set_active(&mut self, active: bool, committed: &str) -> bool {
        if active && self.mode == FieldMode::Viewing {
            self.begin_edit(committed);
            true
        } else {
            false
        }
    }

    /// Consume a pending request to move the platform focus (terminal cursor)
    /// into this field.
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_requested)
    }

    /// Handle one input.
    ///
    /// Returns `None` when the input is not for this field (so the caller may
    /// act on it), otherwise the events it produced, possibly none.
    pub fn handle_input(&mut self, input: FieldInput, committed: &str) -> Option<Vec<FieldEvent>> {
        match self.mode {
            FieldMode::Viewing => self.handle_viewing(input, committed),
            FieldMode::Editing => self.handle_editing(input, committed),
        }
    }

    fn handle_viewing(&mut self, input: FieldInput, committed: &str) -> Option<Vec<FieldEvent>> {
        match input {
            FieldInput::Click
            | FieldInput::Key(KeyCode::Enter, _)
            | FieldInput::Key(KeyCode::Char(' '), _) => {
                self.begin_edit(committed);
                Some(vec![FieldEvent::Activated])
            }
            _ => None,
        }
    }

    fn handle_editing(&mut self, input: FieldInput, committed: &str) -> Option<Vec<FieldEvent>> {
        let key = match input {
            FieldInput::Click => return Some(Vec::new()),
            FieldInput::Blur => return Some(vec![self.commit()]),
            FieldInput::Key(code, modifiers) => (code, modifiers),
        };

        match key {
            (KeyCode::Enter, _) => Some(vec![self.commit()]),
            (KeyCode::Esc, _) => {
                self.cancel(committed);
                Some(Vec::new())
            }
            (KeyCode::Tab, modifiers) => {
                let direction = if modifiers.contains(KeyModifiers::SHIFT) {
                    NavDirection::Prev
                } else {
                    NavDirection::Next
                };
                Some(vec![self.commit(), FieldEvent::Navigate(direction)])
            }
            (KeyCode::BackTab, _) => Some(vec![self.commit(), FieldEvent::Navigate(NavDirection::Prev)]),
            // Leave control chords to the host
            (KeyCode::Char(_), modifiers)
                if modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                None
            }
            (KeyCode::Char(c), _) => {
                self.insert_char(c);
                Some(Vec::new())
            }
            (KeyCode::Backspace, _) => {
                self.delete_char_before();
                Some(Vec::new())
            }
            (KeyCode::Delete, _) => {
                self.delete_char_at();
                Some(Vec::new())
            }
            (KeyCode::Left, _) => {
                self.cursor = self.cursor.saturating_sub(1);
                Some(Vec::new())
            }
            (KeyCode::Right, _) => {
                if self.cursor < self.buffer.chars().count() {
                    self.cursor += 1;
                }
                Some(Vec::new())
            }
            (KeyCode::Home, _) => {
                self.cursor = 0;
                Some(Vec::new())
            }
            (KeyCode::End, _) => {
                self.cursor = self.buffer.chars().count();
                Some(Vec::new())
            }
            _ => Some(Vec::new()),
        }
    }

    fn begin_edit(&mut self, committed: &str) {
        self.buffer = committed.to_string();
        self.cursor = self.buffer.chars().count();
        self.mode = FieldMode::Editing;
        self.focus_requested = true;
    }

    /// Leave editing, keeping the buffer, and mark the field touched.
    fn commit(&mut self) -> FieldEvent {
        self.mode = FieldMode::Viewing;
        self.touched = true;
        debug!(field_id = %self.field_id, len = self.buffer.len(), "field_committed");
        FieldEvent::Commit {
            field_id: self.field_id.clone(),
            value: self.buffer.clone(),
        }
    }

    /// Leave editing and throw the buffer away. Does not touch the field.
    fn cancel(&mut self, committed: &str) {
        self.buffer = committed.to_string();
        self.cursor = self.buffer.chars().count();
        self.mode = FieldMode::Viewing;
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
    }

    fn delete_char_before(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let at = self.byte_offset(self.cursor - 1);
        self.buffer.remove(at);
        self.cursor -= 1;
    }

    fn delete_char_at(&mut self) {
        if self.cursor < self.buffer.chars().count() {
            let at = self.byte_offset(self.cursor);
            self.buffer.remove(at);
        }
    }

    /// Text shown while viewing: the committed value, or the hint when empty.
    pub fn display_text<'a>(&'a self, committed: &'a str) -> &'a str {
        if committed.is_empty() {
            &self.hint
        } else {
            committed
        }
    }

    /// Columns the field occupies, clamped to `[MIN_FIELD_WIDTH, MAX_FIELD_WIDTH]`.
    pub fn display_width(&self, committed: &str) -> usize {
        let content = if self.is_editing() {
            self.buffer.as_str()
        } else {
            committed
        };
        let content = if content.is_empty() {
            self.hint.as_str()
        } else {
            content
        };
        (content.width() + FIELD_PADDING).clamp(MIN_FIELD_WIDTH, MAX_FIELD_WIDTH)
    }
}
