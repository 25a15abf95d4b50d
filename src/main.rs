mod app;
mod config;
mod logging;
mod ui;

use std::collections::HashMap;
use std::fs;
use std::io::{self, IsTerminal, Read, Stderr, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, info};

use promptfill::{TemplateRenderer, ValidationResult};

use crate::app::{App, AppOutcome, DisplayOverrides};
use crate::config::LoadedConfig;
use crate::ui::{draw_ui, format_progress};

/// Fill the {{field}} placeholders of a prompt template in place.
#[derive(Parser, Debug)]
#[command(name = "promptfill", version, about)]
struct Cli {
    /// Template file; "-" or nothing reads stdin
    file: Option<PathBuf>,

    /// Prefill a field (repeatable)
    #[arg(long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Prefill fields from a JSON object of id to value
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,

    /// Print the filled template and exit without opening the editor
    #[arg(long, conflicts_with = "check")]
    print: bool,

    /// Report progress and validation problems; exit 1 when invalid
    #[arg(long)]
    check: bool,

    /// Hide inline validation errors
    #[arg(long)]
    no_validation: bool,

    /// Hide the progress line
    #[arg(long)]
    no_progress: bool,
}

/// Parse `ID=VALUE`. The value may itself contain `=`.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{}'", raw))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing field id in '{}'", raw));
    }
    Ok((id.to_string(), value.to_string()))
}

/// Contract a path by replacing the home directory with `~` for display.
fn contract_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(suffix) = path.strip_prefix(&home)
    {
        return format!("~/{}", suffix.display());
    }
    path.display().to_string()
}

/// Read the template and a display name for it.
fn read_template(file: Option<&Path>) -> Result<(String, String)> {
    match file {
        Some(path) if path != Path::new("-") => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            Ok((content, contract_path(path)))
        }
        _ => {
            if io::stdin().is_terminal() {
                bail!("No template given: pass a file or pipe one on stdin");
            }
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read template from stdin")?;
            Ok((content, "stdin".to_string()))
        }
    }
}

/// Values from `--values` followed by `--set`, so `--set` wins.
fn collect_prefill(cli: &Cli) -> Result<Vec<(String, String)>> {
    let mut values = Vec::new();

    if let Some(path) = &cli.values {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read values file {}", path.display()))?;
        let map: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON object", path.display()))?;
        for (id, value) in map {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            values.push((id, value));
        }
    }

    values.extend(cli.set.iter().cloned());
    Ok(values)
}

fn display_overrides(cli: &Cli) -> DisplayOverrides {
    DisplayOverrides {
        no_validation: cli.no_validation,
        no_progress: cli.no_progress,
    }
}

/// Human-readable validation report for `--check`.
fn format_report(renderer: &TemplateRenderer, result: &ValidationResult) -> String {
    let mut report = format_progress(renderer.progress());
    report.push('\n');
    for error in &result.errors {
        report.push_str(&format!(
            "error: {}: {} [{}]\n",
            error.field_id,
            error.message,
            error.code.label()
        ));
    }
    for warning in &result.warnings {
        report.push_str(&format!(
            "warning: {}: {} [{}]\n",
            warning.field_id,
            warning.message,
            warning.code.label()
        ));
    }
    report
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let start_time = Instant::now();

    // Initialize logging before anything else
    let logging = match logging::init() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    let loaded_config = config::load_config();
    debug!(
        config_path = %loaded_config.config_path.display(),
        status = ?loaded_config.status,
        "config_loaded"
    );
    if let Some(ctx) = &logging {
        ctx.apply_config_level(&loaded_config.config.logging.level);
        logging::cleanup_old_logs(&ctx.log_directory);
    }

    let (content, source_name) = read_template(cli.file.as_deref())?;
    let overrides = display_overrides(&cli);
    let mut renderer = TemplateRenderer::new(
        &content,
        overrides.apply(loaded_config.config.renderer_options()),
    );
    renderer.prefill(collect_prefill(&cli)?);

    let result = if cli.print {
        io::stdout()
            .write_all(renderer.filled_content().as_bytes())
            .context("Failed to write filled template")?;
        Ok(ExitCode::SUCCESS)
    } else if cli.check {
        let validation = renderer.validation();
        print!("{}", format_report(&renderer, &validation));
        info!(
            valid = validation.is_valid(),
            errors = validation.errors.len(),
            "check_completed"
        );
        Ok(if validation.is_valid() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    } else {
        run_interactive(renderer, source_name, logging.as_ref(), loaded_config, overrides)
    };

    if let Some(ctx) = &logging {
        info!(
            session_id = %ctx.session_id,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }

    result
}

/// Run the editor on stderr so stdout stays free for the filled template.
fn run_interactive(
    renderer: TemplateRenderer,
    source_name: String,
    logging: Option<&logging::LoggingContext>,
    loaded_config: LoadedConfig,
    overrides: DisplayOverrides,
) -> Result<ExitCode> {
    let mut app = App::new(
        renderer,
        source_name,
        logging.map(|ctx| ctx.session_id.clone()),
        logging.map(|ctx| ctx.log_directory.clone()),
        loaded_config,
        overrides,
        logging.map(|ctx| ctx.level_handle.clone()),
    );

    // Setup terminal
    enable_raw_mode()?;
    let mut stderr = io::stderr();
    execute!(stderr, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stderr))?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(io::stderr(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    result?;

    match app.outcome {
        Some(AppOutcome::Copy) => {
            let filled = app.renderer.filled_content();
            io::stdout()
                .write_all(filled.as_bytes())
                .context("Failed to write filled template")?;
            info!(len = filled.len(), "filled_template_written");
            Ok(ExitCode::SUCCESS)
        }
        Some(AppOutcome::Quit) | None => {
            info!("exited_without_output");
            Ok(ExitCode::from(130))
        }
    }
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stderr>>, app: &mut App) -> Result<()> {
    loop {
        app.poll_config();

        terminal.draw(|f| draw_ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(50))? {
            match crossterm::event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                // Resize is picked up by the next draw
                _ => {}
            }
        }

        if app.outcome.is_some() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptfill::RendererOptions;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("name=Ada"),
            Ok(("name".to_string(), "Ada".to_string()))
        );
        assert_eq!(
            parse_assignment(" url =a=b"),
            Ok(("url".to_string(), "a=b".to_string()))
        );
        assert_eq!(
            parse_assignment("empty="),
            Ok(("empty".to_string(), String::new()))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "promptfill",
            "t.md",
            "--set",
            "a=1",
            "--set",
            "b=2",
            "--check",
            "--no-progress",
        ])
        .unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("t.md")));
        assert_eq!(cli.set.len(), 2);
        assert!(cli.check);
        assert!(cli.no_progress);
        assert!(!cli.no_validation);
    }

    #[test]
    fn test_print_conflicts_with_check() {
        assert!(Cli::try_parse_from(["promptfill", "--print", "--check"]).is_err());
    }

    #[test]
    fn test_collect_prefill_set_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        fs::write(&path, r#"{"a": "from json", "n": 3, "skip": null}"#).unwrap();

        let cli = Cli::try_parse_from([
            "promptfill",
            "--values",
            path.to_str().unwrap(),
            "--set",
            "a=from flag",
        ])
        .unwrap();
        let values = collect_prefill(&cli).unwrap();

        let mut renderer = TemplateRenderer::new("{{a}} {{n}} {{skip}}", RendererOptions::default());
        renderer.prefill(values);
        assert_eq!(renderer.value("a"), "from flag");
        assert_eq!(renderer.value("n"), "3");
        assert_eq!(renderer.value("skip"), "");
    }

    #[test]
    fn test_collect_prefill_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        fs::write(&path, "[1, 2]").unwrap();

        let cli = Cli::try_parse_from(["promptfill", "--values", path.to_str().unwrap()]).unwrap();
        assert!(collect_prefill(&cli).is_err());
    }

    #[test]
    fn test_read_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.md");
        fs::write(&path, "Hi {{name}}").unwrap();

        let (content, name) = read_template(Some(&path)).unwrap();
        assert_eq!(content, "Hi {{name}}");
        assert!(name.ends_with("t.md"));
        assert!(read_template(Some(&dir.path().join("missing.md"))).is_err());
    }

    #[test]
    fn test_format_report_lists_errors() {
        let mut renderer = TemplateRenderer::new(
            "{{name}} {{email:Contact email}}",
            RendererOptions::default(),
        );
        renderer.prefill([("email", "not-an-email")]);
        let validation = renderer.validation();
        let report = format_report(&renderer, &validation);

        assert!(report.starts_with("1 of 2 fields filled (50%)\n"));
        assert!(report.contains("error: name: This field is required [required]"));
        assert!(report.contains("error: email: Please enter a valid email address [format]"));
        assert!(!validation.is_valid());
    }

    #[test]
    fn test_renderer_options_flags_override_config() {
        let cli = Cli::try_parse_from(["promptfill", "--no-validation"]).unwrap();
        let loaded = config::load_config_from(
            tempfile::tempdir().unwrap().path().join("config.toml"),
            None,
            |_| None,
        );
        let options = display_overrides(&cli).apply(loaded.config.renderer_options());
        assert!(!options.show_validation);
        assert!(options.show_progress);
    }
}
