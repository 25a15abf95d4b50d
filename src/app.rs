//! Application state and core logic.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tracing::{debug, info, warn};

use promptfill::{RendererHost, RendererOptions, TemplateRenderer};

use crate::config::{ConfigLoadStatus, LoadedConfig, get_file_mtime, reload_config};
use crate::logging::{self, ReloadHandle};

/// Which part of the screen receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// The template's fields.
    Fields,
    /// The "Copy" button after the last field.
    CopyButton,
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppOutcome {
    /// Emit the filled template.
    Copy,
    /// Leave without output.
    Quit,
}

/// Display switches forced off from the command line, surviving config reloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayOverrides {
    pub no_validation: bool,
    pub no_progress: bool,
}

impl DisplayOverrides {
    pub fn apply(self, mut options: RendererOptions) -> RendererOptions {
        if self.no_validation {
            options.show_validation = false;
        }
        if self.no_progress {
            options.show_progress = false;
        }
        options
    }
}

/// Collects renderer callbacks during one key press.
#[derive(Debug, Default)]
struct HostEvents {
    filled: Option<String>,
    tabbed_out: bool,
}

impl RendererHost for HostEvents {
    fn filled_content_changed(&mut self, filled: &str) {
        self.filled = Some(filled.to_string());
    }

    fn tab_out(&mut self) {
        self.tabbed_out = true;
    }
}

pub struct App {
    pub renderer: TemplateRenderer,
    /// File name or "stdin", shown as the template pane title.
    pub source_name: String,
    pub focus: Focus,
    pub outcome: Option<AppOutcome>,
    pub show_help: bool,
    pub overrides: DisplayOverrides,
    pub session_id: Option<String>,
    pub log_directory: Option<PathBuf>,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    /// Last seen mtime of the config file.
    pub config_mtime: Option<SystemTime>,
    pub last_config_poll: Instant,
    /// When config was last successfully reloaded (for the "Reloaded" indicator).
    pub config_reloaded_at: Option<Instant>,
    /// Error message if config reload failed (invalid TOML, etc.).
    pub config_reload_error: Option<String>,
    /// Handle for dynamically reloading the log level.
    pub log_level_handle: Option<Arc<Mutex<ReloadHandle>>>,
    /// Current log level from config (to detect changes on reload).
    pub current_log_level: String,
    /// Character count of the filled content after the last commit.
    pub filled_chars: usize,
    pub scroll_offset: u16,
    /// Height of the template pane content area (excluding borders).
    pub main_pane_height: u16,
    /// Width of the template pane content area (excluding borders).
    pub main_pane_width: u16,
    /// Wrapped row count of the template at the last draw.
    pub content_rows: u16,
    /// Occurrence last scrolled into view.
    pub last_scrolled_focus: Option<usize>,
}

impl App {
    pub fn new(
        renderer: TemplateRenderer,
        source_name: String,
        session_id: Option<String>,
        log_directory: Option<PathBuf>,
        loaded_config: LoadedConfig,
        overrides: DisplayOverrides,
        log_level_handle: Option<Arc<Mutex<ReloadHandle>>>,
    ) -> Self {
        let current_log_level = loaded_config.config.logging.level.clone();
        let config_error = match &loaded_config.status {
            ConfigLoadStatus::Error(e) => Some(e.clone()),
            ConfigLoadStatus::Loaded | ConfigLoadStatus::Created => None,
        };
        let filled_chars = renderer.filled_content().chars().count();
        let mut app = Self {
            renderer,
            source_name,
            focus: Focus::Fields,
            outcome: None,
            show_help: false,
            overrides,
            session_id,
            log_directory,
            config_mtime: get_file_mtime(&loaded_config.config_path),
            config_path: loaded_config.config_path,
            project_config_path: loaded_config.project_config_path,
            // Initialize to "long ago" so we poll immediately on start
            last_config_poll: Instant::now() - Duration::from_secs(10),
            config_reloaded_at: None,
            config_reload_error: config_error,
            log_level_handle,
            current_log_level,
            filled_chars,
            scroll_offset: 0,
            main_pane_height: 0,
            main_pane_width: 0,
            content_rows: 0,
            last_scrolled_focus: None,
        };
        app.start();
        app
    }

    /// Put the first field into editing, or go straight to Copy when there are none.
    fn start(&mut self) {
        if self.renderer.parsed().has_fields() {
            self.focus = Focus::Fields;
            let mut host = HostEvents::default();
            self.renderer.activate_field(0, &mut host);
            self.apply_host_events(host);
        } else {
            self.focus = Focus::CopyButton;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Chords work everywhere, even mid-edit
        match key.code {
            KeyCode::Char('c') if ctrl => {
                info!("quit_requested");
                self.outcome = Some(AppOutcome::Quit);
                return;
            }
            KeyCode::Char('s') if ctrl => {
                self.finish();
                return;
            }
            KeyCode::Char('r') if ctrl => {
                info!("values_reset");
                self.renderer.reset();
                self.filled_chars = self.renderer.filled_content().chars().count();
                self.scroll_offset = 0;
                self.last_scrolled_focus = None;
                self.start();
                return;
            }
            _ => {}
        }

        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::F(1)
            ) {
                self.show_help = false;
            }
            return;
        }

        match self.focus {
            Focus::CopyButton => self.handle_copy_button_key(key),
            Focus::Fields => self.handle_fields_key(key),
        }
    }

    fn handle_copy_button_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => self.finish(),
            KeyCode::BackTab => self.enter_fields_from_end(),
            KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.enter_fields_from_end()
            }
            KeyCode::Tab => {
                if self.renderer.parsed().has_fields() {
                    let mut host = HostEvents::default();
                    self.renderer.focus_field(0, &mut host);
                    self.apply_host_events(host);
                    self.focus = Focus::Fields;
                }
            }
            _ => self.handle_common_key(key),
        }
    }

    fn handle_fields_key(&mut self, key: KeyEvent) {
        let mut host = HostEvents::default();
        let consumed = self.renderer.handle_key(key.code, key.modifiers, &mut host);
        self.apply_host_events(host);
        if consumed {
            return;
        }

        match key.code {
            // Focus was lost (e.g. after a reset); pick up from the top
            KeyCode::Tab | KeyCode::Enter if self.renderer.focused().is_none() => {
                let mut host = HostEvents::default();
                if key.code == KeyCode::Enter {
                    self.renderer.activate_field(0, &mut host);
                } else {
                    self.renderer.focus_field(0, &mut host);
                }
                self.apply_host_events(host);
            }
            _ => self.handle_common_key(key),
        }
    }

    /// Keys shared by every focus target when nothing else took them.
    fn handle_common_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                info!("quit_requested");
                self.outcome = Some(AppOutcome::Quit);
            }
            KeyCode::Char('?') | KeyCode::F(1) => self.show_help = true,
            KeyCode::Char('k') | KeyCode::Up => self.scroll_up(1),
            KeyCode::Char('j') | KeyCode::Down => self.scroll_down(1),
            KeyCode::Char('u') if ctrl => self.scroll_up(self.main_pane_height / 2),
            KeyCode::Char('d') if ctrl => self.scroll_down(self.main_pane_height / 2),
            KeyCode::PageUp => self.scroll_up(self.main_pane_height),
            KeyCode::PageDown => self.scroll_down(self.main_pane_height),
            _ => {}
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll_up(3),
            MouseEventKind::ScrollDown => self.scroll_down(3),
            _ => {}
        }
    }

    /// Shift+Tab from the Copy button edits the last field.
    fn enter_fields_from_end(&mut self) {
        let count = self.renderer.parsed().fields.len();
        if count == 0 {
            return;
        }
        let mut host = HostEvents::default();
        self.renderer.activate_field(count - 1, &mut host);
        self.apply_host_events(host);
        self.focus = Focus::Fields;
    }

    /// Commit whatever is being edited and end the session with output.
    fn finish(&mut self) {
        let mut host = HostEvents::default();
        self.renderer.blur(&mut host);
        self.apply_host_events(host);

        let progress = self.renderer.progress();
        info!(
            filled = progress.filled,
            total = progress.total,
            valid = self.renderer.validation().is_valid(),
            "copy_requested"
        );
        self.outcome = Some(AppOutcome::Copy);
    }

    fn apply_host_events(&mut self, host: HostEvents) {
        if let Some(filled) = host.filled {
            self.filled_chars = filled.chars().count();
            debug!(chars = self.filled_chars, "filled_content_changed");
        }
        if host.tabbed_out {
            debug!("focus_copy_button");
            self.focus = Focus::CopyButton;
        }
    }

    pub fn max_scroll(&self) -> u16 {
        self.content_rows.saturating_sub(self.main_pane_height)
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount).min(self.max_scroll());
    }

    /// Scroll so that wrapped row `row` is inside the viewport.
    pub fn scroll_row_into_view(&mut self, row: u16) {
        if row < self.scroll_offset {
            self.scroll_offset = row;
        } else if self.main_pane_height > 0 && row >= self.scroll_offset + self.main_pane_height {
            self.scroll_offset = row + 1 - self.main_pane_height;
        }
    }

    /// Pick up edits to the config file while the editor is open.
    pub fn poll_config(&mut self) {
        // Throttle: poll every 2 seconds
        if self.last_config_poll.elapsed() < Duration::from_secs(2) {
            return;
        }
        self.last_config_poll = Instant::now();

        let Some(current_mtime) = get_file_mtime(&self.config_path) else {
            debug!(path = ?self.config_path, "config_mtime_check_failed");
            return;
        };
        if self.config_mtime == Some(current_mtime) {
            return;
        }
        self.config_mtime = Some(current_mtime);

        match reload_config(&self.config_path, self.project_config_path.as_deref()) {
            Ok(new_config) => {
                let new_log_level = &new_config.logging.level;
                if new_log_level != &self.current_log_level
                    && let Some(ref handle) = self.log_level_handle
                {
                    match logging::update_log_level(handle, new_log_level) {
                        Ok(()) => {
                            debug!(
                                old_level = %self.current_log_level,
                                new_level = %new_log_level,
                                "log_level_updated"
                            );
                            self.current_log_level = new_log_level.clone();
                        }
                        Err(e) => warn!(error = %e, "log_level_update_failed"),
                    }
                }

                self.renderer
                    .set_options(self.overrides.apply(new_config.renderer_options()));
                self.config_reload_error = None;
                self.config_reloaded_at = Some(Instant::now());
            }
            Err(error) => {
                // Keep previous config, show error
                self.config_reload_error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn app_for(content: &str) -> App {
        let loaded = LoadedConfig {
            config: Config::default(),
            config_path: PathBuf::from("/nonexistent/promptfill/config.toml"),
            project_config_path: None,
            status: ConfigLoadStatus::Loaded,
        };
        let options = loaded.config.renderer_options();
        App::new(
            TemplateRenderer::new(content, options),
            "test.md".to_string(),
            None,
            None,
            loaded,
            DisplayOverrides::default(),
            None,
        )
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn press_with(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        app.handle_key(KeyEvent::new(code, modifiers));
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn starts_editing_first_field() {
        let app = app_for("Hi {{name}}, about {{topic}}");
        assert_eq!(app.focus, Focus::Fields);
        assert_eq!(app.renderer.focused(), Some(0));
        assert!(app.renderer.controller(0).unwrap().is_editing());
    }

    #[test]
    fn plain_text_starts_on_copy_button() {
        let mut app = app_for("nothing to fill");
        assert_eq!(app.focus, Focus::CopyButton);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.outcome, Some(AppOutcome::Copy));
        assert_eq!(app.renderer.filled_content(), "nothing to fill");
    }

    #[test]
    fn tab_through_fields_to_copy() {
        let mut app = app_for("Hi {{name}}, about {{topic}}");
        type_str(&mut app, "Al");
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.renderer.value("name"), "Al");
        assert!(app.renderer.controller(1).unwrap().is_editing());

        type_str(&mut app, "rust");
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::CopyButton);
        assert_eq!(app.filled_chars, "Hi Al, about rust".len());

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.outcome, Some(AppOutcome::Copy));
        assert_eq!(app.renderer.filled_content(), "Hi Al, about rust");
    }

    #[test]
    fn typing_q_in_a_field_does_not_quit() {
        let mut app = app_for("{{word}}");
        type_str(&mut app, "quiet");
        assert_eq!(app.outcome, None);
        assert_eq!(app.renderer.controller(0).unwrap().buffer(), "quiet");
    }

    #[test]
    fn esc_cancels_then_quits() {
        let mut app = app_for("{{word}}");
        type_str(&mut app, "draft");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.outcome, None);
        assert_eq!(app.renderer.value("word"), "");

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.outcome, Some(AppOutcome::Quit));
    }

    #[test]
    fn shift_tab_from_copy_edits_last_field() {
        let mut app = app_for("{{a}} {{b}}");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::CopyButton);

        press_with(&mut app, KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(app.focus, Focus::Fields);
        assert!(app.renderer.controller(1).unwrap().is_editing());
    }

    #[test]
    fn ctrl_s_commits_the_open_edit() {
        let mut app = app_for("Dear {{name}}");
        type_str(&mut app, "Sam");
        press_with(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);
        assert_eq!(app.outcome, Some(AppOutcome::Copy));
        assert_eq!(app.renderer.filled_content(), "Dear Sam");
    }

    #[test]
    fn ctrl_c_quits_mid_edit() {
        let mut app = app_for("{{a}}");
        type_str(&mut app, "x");
        press_with(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.outcome, Some(AppOutcome::Quit));
    }

    #[test]
    fn ctrl_r_clears_values_and_restarts() {
        let mut app = app_for("{{a}} {{b}}");
        type_str(&mut app, "x");
        press(&mut app, KeyCode::Tab);
        press_with(&mut app, KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert!(app.renderer.values().is_empty());
        assert_eq!(app.renderer.focused(), Some(0));
        assert!(app.renderer.controller(0).unwrap().is_editing());
    }

    #[test]
    fn help_toggles_when_viewing() {
        let mut app = app_for("{{a}}");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('?'));
        assert!(app.show_help);
        press(&mut app, KeyCode::Char('x'));
        assert!(app.show_help);
        press(&mut app, KeyCode::Esc);
        assert!(!app.show_help);
        assert_eq!(app.outcome, None);
    }

    #[test]
    fn scroll_is_clamped() {
        let mut app = app_for("{{a}}");
        app.content_rows = 30;
        app.main_pane_height = 10;
        app.scroll_down(100);
        assert_eq!(app.scroll_offset, 20);
        app.scroll_up(5);
        assert_eq!(app.scroll_offset, 15);
        app.scroll_row_into_view(2);
        assert_eq!(app.scroll_offset, 2);
        app.scroll_row_into_view(25);
        assert_eq!(app.scroll_offset, 16);
    }

    #[test]
    fn poll_config_applies_display_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\nshow_progress = false\n").unwrap();

        let mut app = app_for("{{a}}");
        app.config_path = path;
        app.config_mtime = None;
        app.poll_config();

        assert!(!app.renderer.options().show_progress);
        assert!(app.config_reloaded_at.is_some());
        assert_eq!(
            app.renderer.options(),
            RendererOptions {
                show_progress: false,
                ..Config::default().renderer_options()
            }
        );
    }

    #[test]
    fn poll_config_keeps_command_line_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\nshow_validation = true\n").unwrap();

        let mut app = app_for("{{a}}");
        app.overrides.no_validation = true;
        app.config_path = path;
        app.config_mtime = None;
        app.poll_config();

        assert!(!app.renderer.options().show_validation);
        assert!(app.renderer.options().show_progress);
    }

    #[test]
    fn overrides_only_turn_things_off() {
        let options = Config::default().renderer_options();
        assert_eq!(DisplayOverrides::default().apply(options), options);

        let hidden = DisplayOverrides {
            no_validation: false,
            no_progress: true,
        }
        .apply(options);
        assert!(hidden.show_validation);
        assert!(!hidden.show_progress);
    }
}
