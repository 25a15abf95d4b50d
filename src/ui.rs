//! UI rendering functions.

use std::time::Duration;

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use promptfill::field::FIELD_PADDING;
use promptfill::{FieldController, Progress, Segment, TemplateRenderer};

use crate::app::{App, Focus};

/// Columns a tab expands to inside template text.
const TAB_WIDTH: usize = 4;

/// How long the "Reloaded" indicator stays visible.
const RELOADED_INDICATOR: Duration = Duration::from_secs(2);

/// Template content laid out as terminal lines.
pub struct TemplateView {
    pub lines: Vec<Line<'static>>,
    /// Line holding the focused occurrence, if any.
    pub focus_line: Option<usize>,
}

/// Fit `text` into exactly `width` columns, padded by one space on each side.
///
/// Newlines become spaces; text too wide is cut and ends in "…".
pub fn fit_to_width(text: &str, width: usize) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .collect();
    let inner = width.saturating_sub(FIELD_PADDING);

    let mut fitted = String::new();
    if single_line.width() <= inner {
        fitted.push_str(&single_line);
    } else {
        let mut used = 0;
        for c in single_line.chars() {
            let w = c.width().unwrap_or(0);
            if used + w + 1 > inner {
                break;
            }
            fitted.push(c);
            used += w;
        }
        fitted.push('…');
    }

    let pad = inner.saturating_sub(fitted.width());
    format!(" {}{} ", fitted, " ".repeat(pad))
}

/// Expand tabs and drop carriage returns from one line of template text.
fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\r' => {}
            '\t' => {
                let spaces = TAB_WIDTH - column % TAB_WIDTH;
                out.push_str(&" ".repeat(spaces));
                column += spaces;
            }
            _ => {
                out.push(c);
                column += c.width().unwrap_or(0);
            }
        }
    }
    out
}

/// Spans for one field occurrence.
pub fn field_spans(controller: &FieldController, committed: &str, focused: bool) -> Vec<Span<'static>> {
    let width = controller.display_width(committed);

    if controller.is_editing() {
        let edit_style = Style::default().fg(Color::Black).bg(Color::Yellow);
        let cursor_style = Style::default().fg(Color::Black).bg(Color::White);
        let buffer = controller.buffer();
        let chars: Vec<char> = buffer.chars().collect();
        let cursor = controller.cursor().min(chars.len());

        let before: String = chars[..cursor].iter().collect();
        let cursor_char = chars.get(cursor).map(|c| c.to_string()).unwrap_or_else(|| " ".to_string());
        let after: String = chars.get(cursor + 1..).map(|rest| rest.iter().collect()).unwrap_or_default();

        let used = 1 + before.width() + cursor_char.width() + after.width();
        let pad = width.saturating_sub(used);
        return vec![
            Span::styled(format!(" {}", before), edit_style),
            Span::styled(cursor_char, cursor_style),
            Span::styled(format!("{}{}", after, " ".repeat(pad)), edit_style),
        ];
    }

    let mut style = if committed.is_empty() {
        Style::default()
            .fg(Color::DarkGray)
            .bg(Color::Rgb(40, 40, 40))
            .add_modifier(Modifier::ITALIC)
    } else {
        Style::default().fg(Color::Cyan).bg(Color::Rgb(20, 40, 50))
    };
    if controller.has_error() {
        style = style.fg(Color::Red);
    }
    if focused {
        style = style.add_modifier(Modifier::REVERSED);
    }

    let mut spans = vec![Span::styled(
        fit_to_width(controller.display_text(committed), width),
        style,
    )];
    if controller.has_error() {
        spans.push(Span::styled(
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    spans
}

/// Lay out the renderer's segments as lines, splitting text on newlines.
pub fn build_template_view(renderer: &TemplateRenderer) -> TemplateView {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut focus_line = None;
    let mut occurrence = 0;

    for segment in renderer.segments() {
        match segment {
            Segment::Text(text) => {
                let mut pieces = text.split('\n').peekable();
                while let Some(piece) = pieces.next() {
                    if !piece.is_empty() {
                        current.push(Span::raw(clean_text(piece)));
                    }
                    if pieces.peek().is_some() {
                        lines.push(Line::from(std::mem::take(&mut current)));
                    }
                }
            }
            Segment::Field(field) => {
                if let Some(controller) = renderer.controller(occurrence) {
                    let id = &renderer.parsed().fields[field.field_index].id;
                    let focused = renderer.focused() == Some(occurrence);
                    if focused {
                        focus_line = Some(lines.len());
                    }
                    current.extend(field_spans(controller, renderer.value(id), focused));
                }
                occurrence += 1;
            }
        }
    }
    lines.push(Line::from(current));

    TemplateView { lines, focus_line }
}

/// "2 of 3 fields filled (67%)". The percentage is left off at 0% and 100%.
pub fn format_progress(progress: Progress) -> String {
    let mut text = format!("{} of {} fields filled", progress.filled, progress.total);
    if progress.percentage > 0 && progress.percentage < 100 {
        text.push_str(&format!(" ({}%)", progress.percentage));
    }
    text
}

fn rows_to_u16(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Rows the given lines take once wrapped to `width` columns.
fn wrapped_rows(lines: &[Line<'static>], width: u16) -> u16 {
    if lines.is_empty() || width == 0 {
        return 0;
    }
    rows_to_u16(
        Paragraph::new(lines.to_vec())
            .wrap(Wrap { trim: false })
            .line_count(width),
    )
}

/// Calculate a centered rectangle within the given area.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

/// Draw the main UI.
pub fn draw_ui(f: &mut Frame, app: &mut App) {
    // Two-panel layout: template (flexible) + command (fixed height 3)
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    app.main_pane_height = chunks[0].height.saturating_sub(2);
    app.main_pane_width = chunks[0].width.saturating_sub(2);

    let view = build_template_view(&app.renderer);
    app.content_rows = wrapped_rows(&view.lines, app.main_pane_width);

    // Keep the focused field visible when focus moves or a field starts editing
    let focused = app.renderer.focused();
    let focus_requested = focused
        .and_then(|occurrence| app.renderer.controller_mut(occurrence))
        .is_some_and(|controller| controller.take_focus_request());
    if (focus_requested || focused != app.last_scrolled_focus)
        && let Some(line) = view.focus_line
    {
        let row = wrapped_rows(&view.lines[..line], app.main_pane_width);
        app.scroll_row_into_view(row);
    }
    app.last_scrolled_focus = focused;
    app.scroll_offset = app.scroll_offset.min(app.max_scroll());

    let border_color = match app.focus {
        Focus::Fields => Color::Cyan,
        Focus::CopyButton => Color::DarkGray,
    };
    let mut template_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(format!(" {} ", app.source_name)).left_aligned());

    let options = app.renderer.options();
    if options.show_progress && app.renderer.parsed().has_fields() {
        let progress = app.renderer.progress();
        let mut spans = vec![Span::styled(
            format!(" {}", format_progress(progress)),
            Style::default().fg(if progress.is_complete() {
                Color::Green
            } else {
                Color::Yellow
            }),
        )];
        let errors = if options.show_validation {
            app.renderer.touched_error_count()
        } else {
            0
        };
        if errors > 0 {
            spans.push(Span::styled(
                format!(" · {} {}", errors, if errors == 1 { "error" } else { "errors" }),
                Style::default().fg(Color::Red),
            ));
        }
        spans.push(Span::raw(" "));
        template_block = template_block.title(Line::from(spans).right_aligned());
    }

    // Inline error for the focused field
    if let Some(message) = focused
        .and_then(|occurrence| app.renderer.controller(occurrence))
        .and_then(|controller| controller.error_message())
    {
        template_block = template_block.title_bottom(
            Line::from(Span::styled(
                format!(" {} ", message),
                Style::default().fg(Color::Red),
            ))
            .left_aligned(),
        );
    }

    if app.config_reloaded_at.is_some_and(|at| at.elapsed() < RELOADED_INDICATOR) {
        template_block = template_block.title_bottom(
            Line::from(Span::styled(" Reloaded ", Style::default().fg(Color::Green)))
                .right_aligned(),
        );
    } else if let Some(error) = &app.config_reload_error {
        template_block = template_block.title_bottom(
            Line::from(Span::styled(
                format!(" ⚠ {} ", error),
                Style::default().fg(Color::Yellow),
            ))
            .right_aligned(),
        );
    }

    let template_panel = Paragraph::new(view.lines)
        .block(template_block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset, 0));
    f.render_widget(template_panel, chunks[0]);

    // Scrollbar - only visible when content exceeds viewport
    if app.content_rows > app.main_pane_height {
        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::default()
            .content_length(app.content_rows as usize)
            .position(app.scroll_offset as usize)
            .viewport_content_length(app.main_pane_height as usize);
        f.render_stateful_widget(scrollbar, chunks[0], &mut scrollbar_state);
    }

    // Command panel with keyboard shortcuts (left) and the Copy button (right)
    let editing = focused
        .and_then(|occurrence| app.renderer.controller(occurrence))
        .is_some_and(FieldController::is_editing);
    let shortcuts = match (app.focus, editing) {
        (Focus::Fields, true) => "[Tab] Next  [S-Tab] Prev  [Enter] Done  [Esc] Cancel",
        (Focus::Fields, false) => "[Enter] Edit  [Tab] Next  [?] Help  [q] Quit",
        (Focus::CopyButton, _) => "[Enter] Copy  [S-Tab] Back  [?] Help  [q] Quit",
    };

    let button_text = format!(" Copy · {} chars ", app.filled_chars);
    let button_style = match app.focus {
        Focus::CopyButton => Style::default()
            .fg(Color::Black)
            .bg(Color::Green)
            .add_modifier(Modifier::BOLD),
        Focus::Fields => Style::default().fg(Color::Green),
    };

    let inner_width = chunks[1].width.saturating_sub(2) as usize;
    let spacing = inner_width.saturating_sub(shortcuts.width() + button_text.width());

    let command_line = Line::from(vec![
        Span::styled(shortcuts, Style::default().fg(Color::DarkGray)),
        Span::raw(" ".repeat(spacing)),
        Span::styled(button_text, button_style),
    ]);
    let command_panel = Paragraph::new(command_line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(command_panel, chunks[1]);

    if app.show_help {
        draw_help_modal(f, app);
    }
}

/// Draw the key reference.
fn draw_help_modal(f: &mut Frame, app: &App) {
    let modal_width: u16 = 56;
    let modal_height: u16 = 20;
    let modal_area = centered_rect(modal_width, modal_height, f.area());

    f.render_widget(Clear, modal_area);

    let key_style = Style::default().fg(Color::Cyan);
    let desc_style = Style::default().fg(Color::DarkGray);
    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::raw("    "),
            Span::styled(format!("{:<10}", key), key_style),
            Span::styled(desc, desc_style),
        ])
    };

    let session = app.session_id.as_deref().unwrap_or("---");
    let logs = app
        .log_directory
        .as_deref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "---".to_string());

    let inner_width = modal_width.saturating_sub(4) as usize;
    let footer_text = "? or Esc to close";
    let footer_padding = inner_width.saturating_sub(footer_text.len());

    let content = vec![
        Line::from(Span::styled("  Fields", header_style)),
        entry("Enter", "Edit / finish editing"),
        entry("Tab", "Save and go to next field"),
        entry("S-Tab", "Save and go to previous field"),
        entry("Esc", "Discard edit"),
        Line::from(""),
        Line::from(Span::styled("  Session", header_style)),
        entry("Ctrl+s", "Copy filled prompt and exit"),
        entry("Ctrl+r", "Clear all fields"),
        entry("q / Esc", "Quit without output"),
        Line::from(""),
        Line::from(Span::styled("  Scroll", header_style)),
        entry("j/k ↑/↓", "Scroll down/up"),
        entry("Ctrl+u/d", "Half page up/down"),
        Line::from(""),
        Line::from(Span::styled(
            format!("  Session {}  Logs {}", session, logs),
            desc_style,
        )),
        Line::from(vec![
            Span::raw(" ".repeat(footer_padding)),
            Span::styled(footer_text, desc_style),
        ]),
    ];

    let modal = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(Color::White)),
    );

    f.render_widget(modal, modal_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptfill::{FieldInput, RendererOptions};
    use promptfill::field::{MAX_FIELD_WIDTH, MIN_FIELD_WIDTH};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn renderer(content: &str) -> TemplateRenderer {
        TemplateRenderer::new(
            content,
            RendererOptions {
                show_validation: true,
                show_progress: true,
                rules: Default::default(),
            },
        )
    }

    #[test]
    fn test_fit_to_width_pads() {
        assert_eq!(fit_to_width("abc", 7), " abc   ");
        assert_eq!(fit_to_width("", MIN_FIELD_WIDTH).width(), MIN_FIELD_WIDTH);
    }

    #[test]
    fn test_fit_to_width_truncates_with_ellipsis() {
        let fitted = fit_to_width(&"x".repeat(100), MAX_FIELD_WIDTH);
        assert_eq!(fitted.width(), MAX_FIELD_WIDTH);
        assert!(fitted.trim_end().ends_with('…'));
    }

    #[test]
    fn test_fit_to_width_wide_chars() {
        let fitted = fit_to_width("日本語日本語", 8);
        assert_eq!(fitted.width(), 8);
        assert_eq!(fitted, " 日本…  ");
    }

    #[test]
    fn test_fit_to_width_flattens_newlines() {
        assert_eq!(fit_to_width("a\nb", 5), " a b ");
    }

    #[test]
    fn test_clean_text_expands_tabs() {
        assert_eq!(clean_text("a\tb"), "a   b");
        assert_eq!(clean_text("\tx\r"), "    x");
    }

    #[test]
    fn test_view_splits_lines_and_tracks_focus() {
        let mut r = renderer("Title\n\nHello {{name}}!\nBye {{name}}");
        r.activate_field(0, &mut ());

        let view = build_template_view(&r);
        assert_eq!(view.lines.len(), 4);
        assert_eq!(line_text(&view.lines[0]), "Title");
        assert_eq!(line_text(&view.lines[1]), "");
        assert!(line_text(&view.lines[2]).starts_with("Hello "));
        assert!(line_text(&view.lines[2]).ends_with('!'));
        assert_eq!(view.focus_line, Some(2));
    }

    #[test]
    fn test_view_shows_hint_and_value() {
        let mut r = renderer("To: {{who:Recipient}}");
        let view = build_template_view(&r);
        assert!(line_text(&view.lines[0]).contains("Recipient"));
        assert_eq!(view.focus_line, None);

        r.prefill([("who", "Ada")]);
        let view = build_template_view(&r);
        assert!(line_text(&view.lines[0]).contains(" Ada "));
        assert!(!line_text(&view.lines[0]).contains("Recipient"));
    }

    #[test]
    fn test_editing_field_shows_cursor_block() {
        let mut r = renderer("{{a}}");
        r.prefill([("a", "hey")]);
        r.handle_input(0, FieldInput::Click, &mut ());

        let controller = r.controller(0).unwrap();
        let spans = field_spans(controller, "hey", true);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].content, " hey");
        assert_eq!(spans[1].content, " ");
        let total: usize = spans.iter().map(|s| s.content.width()).sum();
        assert_eq!(total, controller.display_width("hey"));
    }

    #[test]
    fn test_error_marker_after_commit() {
        let mut r = renderer("{{email:Your email}}");
        r.activate_field(0, &mut ());
        for c in "nope".chars() {
            r.handle_key(
                crossterm::event::KeyCode::Char(c),
                crossterm::event::KeyModifiers::NONE,
                &mut (),
            );
        }
        r.blur(&mut ());

        let controller = r.controller(0).unwrap();
        let spans = field_spans(controller, r.value("email"), false);
        assert_eq!(spans.last().unwrap().content, "!");
    }

    #[test]
    fn test_format_progress() {
        let r = renderer("{{a}} {{b}} {{c}}");
        assert_eq!(format_progress(r.progress()), "0 of 3 fields filled");

        let mut r = renderer("{{a}} {{b}}");
        r.prefill([("a", "x")]);
        assert_eq!(format_progress(r.progress()), "1 of 2 fields filled (50%)");
        r.prefill([("b", "y")]);
        assert_eq!(format_progress(r.progress()), "2 of 2 fields filled");
    }

    #[test]
    fn test_rows_saturate_at_u16_max() {
        assert_eq!(rows_to_u16(12), 12);
        assert_eq!(rows_to_u16(70_000), u16::MAX);
    }

    #[test]
    fn test_centered_rect_clamps() {
        let area = Rect::new(0, 0, 20, 10);
        assert_eq!(centered_rect(10, 4, area), Rect::new(5, 3, 10, 4));
        assert_eq!(centered_rect(40, 40, area), Rect::new(0, 0, 20, 10));
    }
}
