//! Placeholder grammar for prompt templates.
//!
//! A placeholder is `{{id}}` or `{{id:hint}}`. The id is one or more characters
//! other than `:` and `}`; the hint is any run of characters other than `}`.
//! Both are trimmed. Anything that does not complete the grammar (a lone `{{`,
//! a single `}`) stays literal text.
//!
//! Scanning is a single left-to-right pass with no backtracking: every failed
//! match attempt resumes past the byte that made it fail.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Current value per field id. Absent and blank values both mean "unfilled".
pub type FieldValues = HashMap<String, String>;

/// A named placeholder extracted from template text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    /// Trimmed text between `{{` and `:`/`}}`.
    pub id: String,
    /// Human-readable label derived from the id.
    pub name: String,
    /// Trimmed text after `:`, empty when absent.
    pub hint: String,
    /// Text shown while the field is empty: the hint, else the id.
    pub placeholder: String,
    /// Byte offset of the opening `{{`.
    pub start_index: usize,
    /// Byte offset just past the closing `}}`.
    pub end_index: usize,
    /// The placeholder exactly as written.
    pub full_match: String,
}

/// Fields of a template in document order, one entry per distinct id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTemplate {
    pub content: String,
    pub fields: Vec<Field>,
}

/// Interleaved piece of template content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, preserved byte-for-byte.
    Text(String),
    /// One placeholder occurrence.
    Field(FieldOccurrence),
}

/// A single placeholder occurrence in the content.
///
/// Repeated ids produce several occurrences pointing at the same
/// `field_index`, so they share a value and the first occurrence's hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOccurrence {
    /// Index into [`ParsedTemplate::fields`].
    pub field_index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub full_match: String,
}

/// Filled vs total field counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub filled: usize,
    pub total: usize,
    /// `filled / total * 100` rounded half up; 0 when there are no fields.
    pub percentage: u32,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.filled == self.total
    }
}

impl ParsedTemplate {
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Look up a field by id.
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Position of a field id in tab order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Split the content into text and field segments.
    ///
    /// Concatenating every segment's source text reproduces `content`.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut last_index = 0;

        for placeholder in placeholders(&self.content) {
            let Some(field_index) = self.index_of(placeholder.id) else {
                continue;
            };

            if placeholder.start > last_index {
                segments.push(Segment::Text(
                    self.content[last_index..placeholder.start].to_string(),
                ));
            }

            segments.push(Segment::Field(FieldOccurrence {
                field_index,
                start_index: placeholder.start,
                end_index: placeholder.end,
                full_match: placeholder.full_match.to_string(),
            }));
            last_index = placeholder.end;
        }

        if last_index < self.content.len() {
            segments.push(Segment::Text(self.content[last_index..].to_string()));
        }

        segments
    }

    /// Progress of `values` against this template's fields.
    pub fn progress(&self, values: &FieldValues) -> Progress {
        let filled = self
            .fields
            .iter()
            .filter(|f| values.get(&f.id).is_some_and(|v| is_filled(v)))
            .count();
        let total = self.fields.len();
        let percentage = if total == 0 {
            0
        } else {
            // Round half up, in integers.
            ((filled * 200 + total) / (total * 2)) as u32
        };

        Progress {
            filled,
            total,
            percentage,
        }
    }
}

/// Whether a value counts as filled in.
pub fn is_filled(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Parse template content and extract its fields in document order.
///
/// A repeated id is reported once, at its first occurrence.
pub fn parse_template(content: &str) -> ParsedTemplate {
    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for placeholder in placeholders(content) {
        if !seen.insert(placeholder.id) {
            continue;
        }

        let placeholder_text = if placeholder.hint.is_empty() {
            placeholder.id
        } else {
            placeholder.hint
        };

        fields.push(Field {
            id: placeholder.id.to_string(),
            name: format_field_name(placeholder.id),
            hint: placeholder.hint.to_string(),
            placeholder: placeholder_text.to_string(),
            start_index: placeholder.start,
            end_index: placeholder.end,
            full_match: placeholder.full_match.to_string(),
        });
    }

    ParsedTemplate {
        content: content.to_string(),
        fields,
    }
}

/// Check whether content contains at least one placeholder.
pub fn is_template(content: &str) -> bool {
    placeholders(content).next().is_some()
}

/// Substitute every placeholder with its value.
///
/// Unfilled fields become the empty string; hints never leak into the output.
/// Values for ids that do not appear in the content are ignored.
pub fn fill_template(content: &str, values: &FieldValues) -> String {
    let mut filled = String::with_capacity(content.len());
    let mut last_index = 0;

    for placeholder in placeholders(content) {
        filled.push_str(&content[last_index..placeholder.start]);
        if let Some(value) = values.get(placeholder.id)
            && is_filled(value)
        {
            filled.push_str(value);
        }
        last_index = placeholder.end;
    }

    filled.push_str(&content[last_index..]);
    filled
}

/// Count filled vs total fields.
pub fn get_field_progress(content: &str, values: &FieldValues) -> Progress {
    parse_template(content).progress(values)
}

/// Short preview with each placeholder collapsed to `[...]`.
pub fn template_preview(content: &str, max_length: usize) -> String {
    let mut preview = String::with_capacity(content.len());
    let mut last_index = 0;
    for placeholder in placeholders(content) {
        preview.push_str(&content[last_index..placeholder.start]);
        preview.push_str("[...]");
        last_index = placeholder.end;
    }
    preview.push_str(&content[last_index..]);

    if preview.chars().count() <= max_length {
        return preview;
    }
    let truncated: String = preview.chars().take(max_length).collect();
    format!("{}...", truncated.trim())
}

/// Unique field ids in tab order.
pub fn field_ids(content: &str) -> Vec<String> {
    parse_template(content)
        .fields
        .into_iter()
        .map(|f| f.id)
        .collect()
}

/// A value map with every field present and empty.
pub fn initialize_field_values(content: &str) -> FieldValues {
    parse_template(content)
        .fields
        .into_iter()
        .map(|f| (f.id, String::new()))
        .collect()
}

/// Turn a field id into a label: `target_audience` and `targetAudience`
/// both become `Target Audience`.
pub fn format_field_name(field_id: &str) -> String {
    let mut spaced = String::with_capacity(field_id.len() + 4);
    let mut prev: Option<char> = None;
    for c in field_id.chars() {
        let c = if c == '_' { ' ' } else { c };
        if let Some(p) = prev
            && p.is_ascii_lowercase()
            && c.is_ascii_uppercase()
        {
            spaced.push(' ');
        }
        spaced.push(c);
        prev = Some(c);
    }

    let mut name = String::with_capacity(spaced.len());
    let mut in_word = false;
    for c in spaced.chars() {
        let is_word = c.is_ascii_alphanumeric();
        if is_word && !in_word {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push(c);
        }
        in_word = is_word;
    }
    name
}

/// One syntactically complete placeholder with a non-blank id.
struct Placeholder<'a> {
    start: usize,
    end: usize,
    id: &'a str,
    hint: &'a str,
    full_match: &'a str,
}

/// Outcome of trying to match a placeholder at a `{{`.
enum Scan {
    Match {
        end: usize,
        id: (usize, usize),
        hint: Option<(usize, usize)>,
    },
    /// `{{` followed directly by `:` or `}`.
    EmptyId,
    /// A single `}` not followed by another; no start before it can match.
    StrayBrace(usize),
    /// Ran off the end without a `}`; no later start can match either.
    Unterminated,
}

fn scan_at(bytes: &[u8], start: usize) -> Scan {
    let len = bytes.len();
    let mut i = start + 2;

    let id_start = i;
    while i < len && bytes[i] != b':' && bytes[i] != b'}' {
        i += 1;
    }
    if i == len {
        return Scan::Unterminated;
    }
    if i == id_start {
        return Scan::EmptyId;
    }
    let id = (id_start, i);

    let mut hint = None;
    if bytes[i] == b':' {
        i += 1;
        let hint_start = i;
        while i < len && bytes[i] != b'}' {
            i += 1;
        }
        if i == len {
            return Scan::Unterminated;
        }
        hint = Some((hint_start, i));
    }

    if i + 1 < len && bytes[i + 1] == b'}' {
        Scan::Match {
            end: i + 2,
            id,
            hint,
        }
    } else {
        Scan::StrayBrace(i)
    }
}

struct Placeholders<'a> {
    content: &'a str,
    pos: usize,
}

fn placeholders(content: &str) -> Placeholders<'_> {
    Placeholders { content, pos: 0 }
}

impl<'a> Iterator for Placeholders<'a> {
    type Item = Placeholder<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let content = self.content;
        let bytes = content.as_bytes();

        // All delimiters are ASCII, so every position we resume at is a char boundary.
        while self.pos < bytes.len() {
            let start = self.pos + content[self.pos..].find("{{")?;

            match scan_at(bytes, start) {
                Scan::Match { end, id, hint } => {
                    self.pos = end;
                    let id = content[id.0..id.1].trim();
                    if id.is_empty() {
                        continue;
                    }
                    let hint = hint.map(|(s, e)| content[s..e].trim()).unwrap_or("");
                    return Some(Placeholder {
                        start,
                        end,
                        id,
                        hint,
                        full_match: &content[start..end],
                    });
                }
                Scan::EmptyId => self.pos = start + 1,
                Scan::StrayBrace(at) => self.pos = at + 1,
                Scan::Unterminated => {
                    self.pos = bytes.len();
                    return None;
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_simple_field() {
        let parsed = parse_template("Use {{x}}");
        assert_eq!(parsed.fields.len(), 1);
        let field = &parsed.fields[0];
        assert_eq!(field.id, "x");
        assert_eq!(field.hint, "");
        assert_eq!(field.placeholder, "x");
        assert_eq!(field.start_index, 4);
        assert_eq!(field.end_index, 9);
        assert_eq!(field.full_match, "{{x}}");
    }

    #[test]
    fn test_parse_field_with_hint() {
        let parsed = parse_template("Hello {{ name : Your name }}!");
        let field = &parsed.fields[0];
        assert_eq!(field.id, "name");
        assert_eq!(field.hint, "Your name");
        assert_eq!(field.placeholder, "Your name");
        assert_eq!(field.full_match, "{{ name : Your name }}");
    }

    #[test]
    fn test_parse_empty_hint_falls_back_to_id() {
        let parsed = parse_template("{{topic:}}");
        assert_eq!(parsed.fields[0].hint, "");
        assert_eq!(parsed.fields[0].placeholder, "topic");
    }

    #[test]
    fn test_parse_hint_may_contain_colons() {
        let parsed = parse_template("{{time:HH:MM}}");
        assert_eq!(parsed.fields[0].id, "time");
        assert_eq!(parsed.fields[0].hint, "HH:MM");
    }

    #[test]
    fn test_parse_preserves_document_order() {
        let parsed = parse_template("{{b}} then {{a}} then {{c:last}}");
        let ids: Vec<_> = parsed.fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_parse_duplicate_ids_keep_first_hint() {
        let parsed = parse_template("{{x:first}} and {{x:second}}");
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].hint, "first");
        assert_eq!(parsed.fields[0].start_index, 0);
    }

    #[test]
    fn test_parse_excludes_empty_ids() {
        assert!(parse_template("{{}}").fields.is_empty());
        assert!(parse_template("{{:hint}}").fields.is_empty());
        assert!(parse_template("{{   }}").fields.is_empty());
    }

    #[test]
    fn test_parse_unterminated_is_literal() {
        assert!(parse_template("Hello {{name").fields.is_empty());
        assert!(parse_template("Hello {{name:hint").fields.is_empty());
        assert!(parse_template("Hello {{name}").fields.is_empty());
    }

    #[test]
    fn test_parse_recovers_after_stray_brace() {
        let parsed = parse_template("{{a} b {{c}}");
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].id, "c");
        assert_eq!(parsed.fields[0].start_index, 7);
    }

    #[test]
    fn test_parse_extra_opening_braces() {
        // The first `{{` wins and the extra brace becomes part of the id.
        let parsed = parse_template("{{{x}}");
        assert_eq!(parsed.fields[0].id, "{x");

        let parsed = parse_template("{{:a}} {{b}}");
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].id, "b");
    }

    #[test]
    fn test_parse_byte_offsets_with_multibyte_text() {
        let content = "héllo {{x}}";
        let field = &parse_template(content).fields[0];
        assert_eq!(&content[field.start_index..field.end_index], "{{x}}");
    }

    #[test]
    fn test_parse_adversarial_input_terminates() {
        let content = "{{".repeat(50_000);
        assert!(parse_template(&content).fields.is_empty());
        let content = "{{a}".repeat(50_000);
        assert!(parse_template(&content).fields.is_empty());
    }

    #[test]
    fn test_is_template() {
        assert!(!is_template("plain text"));
        assert!(is_template("Use {{x}}"));
        assert!(!is_template("{{}}"));
        assert!(!is_template("{{ }}"));
        assert!(!is_template("{{open"));
    }

    #[test]
    fn test_fill_with_value() {
        let filled = fill_template("Hello {{name:Your name}}!", &values(&[("name", "World")]));
        assert_eq!(filled, "Hello World!");
    }

    #[test]
    fn test_fill_unfilled_becomes_empty() {
        assert_eq!(
            fill_template("Hello {{name:Your name}}!", &FieldValues::new()),
            "Hello !"
        );
        assert_eq!(
            fill_template("Hello {{name}}!", &values(&[("name", "   ")])),
            "Hello !"
        );
    }

    #[test]
    fn test_fill_duplicate_ids() {
        assert_eq!(
            fill_template("{{x}} and {{x}}", &values(&[("x", "A")])),
            "A and A"
        );
    }

    #[test]
    fn test_fill_ignores_unknown_ids() {
        assert_eq!(
            fill_template("{{a}}-{{b}}", &values(&[("a", "1"), ("zzz", "9")])),
            "1-"
        );
    }

    #[test]
    fn test_fill_preserves_surrounding_text() {
        let content = "Line one\n\n  {{a}}\t{{b:hint}}\r\nend {{unterminated";
        let filled = fill_template(content, &values(&[("a", "A"), ("b", "B")]));
        assert_eq!(filled, "Line one\n\n  A\tB\r\nend {{unterminated");
    }

    #[test]
    fn test_fill_leaves_blank_id_placeholder_literal() {
        assert_eq!(fill_template("a {{ }} b", &FieldValues::new()), "a {{ }} b");
    }

    #[test]
    fn test_segments_interleave_text_and_fields() {
        let parsed = parse_template("Hi {{a}}, {{b:x}} and {{a}}.");
        let segments = parsed.segments();
        assert_eq!(segments.len(), 7);
        assert_eq!(segments[0], Segment::Text("Hi ".to_string()));
        match &segments[1] {
            Segment::Field(occ) => {
                assert_eq!(occ.field_index, 0);
                assert_eq!(occ.full_match, "{{a}}");
            }
            other => panic!("expected field, got {:?}", other),
        }
        match &segments[5] {
            Segment::Field(occ) => {
                assert_eq!(occ.field_index, 0);
                assert_eq!(occ.start_index, 22);
            }
            other => panic!("expected field, got {:?}", other),
        }
        assert_eq!(segments[6], Segment::Text(".".to_string()));
    }

    #[test]
    fn test_segments_reassemble_content() {
        let content = "{{a}}x{{ }}y{{b";
        let parsed = parse_template(content);
        let rebuilt: String = parsed
            .segments()
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.clone(),
                Segment::Field(occ) => occ.full_match.clone(),
            })
            .collect();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn test_progress_rounds_to_nearest() {
        let progress = get_field_progress("{{a}} {{b}} {{c}}", &values(&[("b", "x")]));
        assert_eq!(
            progress,
            Progress {
                filled: 1,
                total: 3,
                percentage: 33
            }
        );

        let progress = get_field_progress("{{a}} {{b}} {{c}}", &values(&[("a", "1"), ("b", "2")]));
        assert_eq!(progress.percentage, 67);
    }

    #[test]
    fn test_progress_counts_duplicates_once() {
        let progress = get_field_progress("{{a}} {{a}} {{b}}", &values(&[("a", "1")]));
        assert_eq!(progress.filled, 1);
        assert_eq!(progress.total, 2);
        assert_eq!(progress.percentage, 50);
    }

    #[test]
    fn test_progress_no_fields() {
        let progress = get_field_progress("plain", &FieldValues::new());
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percentage, 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_progress_blank_values_unfilled() {
        let progress = get_field_progress("{{a}}", &values(&[("a", " \n")]));
        assert_eq!(progress.filled, 0);
    }

    #[test]
    fn test_template_preview() {
        assert_eq!(
            template_preview("Write about {{topic:subject}} for {{who}}", 150),
            "Write about [...] for [...]"
        );
        assert_eq!(template_preview("abcdef ghij", 7), "abcdef...");
    }

    #[test]
    fn test_field_ids_and_initial_values() {
        let content = "{{b}} {{a}} {{b}}";
        assert_eq!(field_ids(content), vec!["b".to_string(), "a".to_string()]);
        let initial = initialize_field_values(content);
        assert_eq!(initial.len(), 2);
        assert_eq!(initial.get("a").map(String::as_str), Some(""));
    }

    #[test]
    fn test_format_field_name() {
        assert_eq!(format_field_name("target_audience"), "Target Audience");
        assert_eq!(format_field_name("targetAudience"), "Target Audience");
        assert_eq!(format_field_name("x"), "X");
        assert_eq!(format_field_name("api_v2_key"), "Api V2 Key");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn template_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                "[a-z ]{0,8}",
                "\\{\\{[a-z_]{1,6}\\}\\}",
                "\\{\\{[a-z]{1,4}:[A-Za-z ]{0,6}\\}\\}",
                Just("{{".to_string()),
                Just("}".to_string()),
                Just(":".to_string()),
                Just("\n".to_string()),
            ],
            0..12,
        )
        .prop_map(|parts| parts.concat())
    }

    fn values_strategy() -> impl Strategy<Value = FieldValues> {
        prop::collection::hash_map("[a-z_]{1,6}", "[A-Za-z0-9 ]{0,6}", 0..6)
    }

    proptest! {
        #[test]
        fn fields_are_ordered_by_start_index(content in template_strategy()) {
            let parsed = parse_template(&content);
            for pair in parsed.fields.windows(2) {
                prop_assert!(pair[0].start_index < pair[1].start_index);
            }
            for field in &parsed.fields {
                prop_assert_eq!(&content[field.start_index..field.end_index], field.full_match.as_str());
            }
        }

        #[test]
        fn parse_is_deterministic(content in template_strategy()) {
            prop_assert_eq!(parse_template(&content), parse_template(&content));
        }

        #[test]
        fn fill_without_fields_is_identity(content in "[^{}]{0,40}", values in values_strategy()) {
            prop_assert!(parse_template(&content).fields.is_empty());
            prop_assert_eq!(fill_template(&content, &values), content);
        }

        #[test]
        fn fill_is_pure(content in template_strategy(), values in values_strategy()) {
            prop_assert_eq!(fill_template(&content, &values), fill_template(&content, &values));
        }

        #[test]
        fn is_template_matches_field_list(content in template_strategy()) {
            prop_assert_eq!(is_template(&content), !parse_template(&content).fields.is_empty());
        }
    }
}
