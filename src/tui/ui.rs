use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

use super::app::{App, AppState};
use super::input::{is_quit_chord, parse_command, UiCommand, COMMAND_HINTS};
use super::render::render_ui;
use crate::constants::{UI_REFRESH_INTERVAL_MS, UI_SCROLL_LINES};
use crate::utils::log_debug;

/// Run the terminal UI
pub async fn run_ui(mut app: App) -> Result<()> {
    if !crossterm::tty::IsTty::is_tty(&io::stdout()) {
        eprintln!("❌ persona-chat requires an interactive terminal.");
        eprintln!("   Use --prompt for pipes and scripts.");
        return Err(anyhow::anyhow!("No interactive terminal available"));
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut app_state = AppState::Insert;

    while app.running {
        terminal.draw(|f| render_ui(f, app, app_state))?;

        if event::poll(Duration::from_millis(UI_REFRESH_INTERVAL_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, &mut app_state, key).await;
                }
            }
        }

        app.poll_turn().await;
        app.drain_notifications();
    }

    Ok(())
}

/// Apply one key press; returns with `app.running` cleared on quit
pub async fn handle_key(app: &mut App, app_state: &mut AppState, key: KeyEvent) {
    if is_quit_chord(&key) {
        app.quit();
        return;
    }

    match *app_state {
        AppState::Normal => match key.code {
            KeyCode::Char('q') => app.quit(),
            KeyCode::Char('i') | KeyCode::Enter => *app_state = AppState::Insert,
            KeyCode::Char(':') => {
                *app_state = AppState::Command;
                app.input.clear();
            }
            KeyCode::Char('p') => app.cycle_persona(true).await,
            KeyCode::Char('P') => app.cycle_persona(false).await,
            KeyCode::Up | KeyCode::Char('k') => app.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => app.scroll_down(1),
            KeyCode::PageUp => app.scroll_up(UI_SCROLL_LINES * 5),
            KeyCode::PageDown => app.scroll_down(UI_SCROLL_LINES * 5),
            KeyCode::Tab => app.toggle_sidebar(),
            _ => {}
        },
        AppState::Insert => match key.code {
            KeyCode::Esc => *app_state = AppState::Normal,
            KeyCode::Enter => app.submit_input(),
            KeyCode::Char(c) => app.input.push(c),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Up => app.scroll_up(UI_SCROLL_LINES),
            KeyCode::Down => app.scroll_down(UI_SCROLL_LINES),
            _ => {}
        },
        AppState::Command => match key.code {
            KeyCode::Esc => {
                *app_state = AppState::Normal;
                app.input.clear();
            }
            KeyCode::Enter => {
                let command = std::mem::take(&mut app.input);
                run_command(app, &command).await;
                *app_state = AppState::Normal;
            }
            KeyCode::Char(c) => app.input.push(c),
            KeyCode::Backspace => {
                if app.input.pop().is_none() {
                    *app_state = AppState::Normal;
                }
            }
            _ => {}
        },
    }
}

async fn run_command(app: &mut App, input: &str) {
    log_debug(format!("Command: {}", input));

    let command = match parse_command(input) {
        Ok(c) => c,
        Err(message) => {
            app.set_status(message);
            return;
        }
    };

    match command {
        UiCommand::Quit => app.quit(),
        UiCommand::Persona(Some(id)) => app.select_persona(&id).await,
        UiCommand::Persona(None) => {
            let current = app.view.persona_id().unwrap_or("custom").to_string();
            app.set_status(format!("Current persona: {}", current));
        }
        UiCommand::Personas => {
            let active = app.view.persona_id().map(str::to_string);
            let lines = std::iter::once("Personas:".to_string())
                .chain(app.personas.iter().map(|p| {
                    let marker = if active.as_deref() == Some(p.id.as_str()) { "▶" } else { " " };
                    format!(" {} {:<16} {}", marker, p.id, p.label)
                }))
                .collect();
            app.show_info(lines);
        }
        UiCommand::System(Some(text)) => app.set_instruction(&text).await,
        UiCommand::System(None) => {
            let lines = vec![
                "Current instruction:".to_string(),
                app.view.instruction().to_string(),
            ];
            app.show_info(lines);
        }
        UiCommand::Reset => app.reset().await,
        UiCommand::Clear => app.clear().await,
        UiCommand::Sidebar => app.toggle_sidebar(),
        UiCommand::Help => {
            let mut lines = vec!["Commands:".to_string()];
            lines.extend(
                COMMAND_HINTS
                    .iter()
                    .map(|(cmd, desc)| format!("  {:<18} {}", cmd, desc)),
            );
            lines.extend(
                [
                    "",
                    "Keys:",
                    "  i / Enter         Type a message (insert mode)",
                    "  Esc               Normal mode",
                    "  p / P             Next / previous persona",
                    "  ↑ ↓ PgUp PgDn     Scroll",
                    "  Tab               Toggle sidebar",
                    "  Ctrl+C            Quit",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
            app.show_info(lines);
        }
    }
}
