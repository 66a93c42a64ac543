use chrono::{DateTime, Local};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use super::app::{App, AppState};
use super::input::matching_hints;
use super::markdown::parse_markdown;
use crate::conversation::Role;

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App, app_state: AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(input_height(app, app_state)),
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);

    if app.show_sidebar {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(chunks[1]);
        render_sidebar(frame, content[0], app);
        render_chat(frame, content[1], app);
    } else {
        render_chat(frame, chunks[1], app);
    }

    render_input(frame, chunks[2], app, app_state);
    render_status_bar(frame, chunks[3], app, app_state);
}

fn input_height(app: &App, app_state: AppState) -> u16 {
    if app_state == AppState::Command {
        let hints = matching_hints(&app.input).len().min(6) as u16;
        if hints > 0 {
            return 3 + hints + 2;
        }
    }
    3
}

/// Render the header
fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let header_text = vec![Line::from(vec![
        Span::styled(
            "persona-chat",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Persona: "),
        Span::styled(app.persona_label(), Style::default().fg(Color::Yellow)),
        Span::raw(" | Model: "),
        Span::styled(&app.model_name, Style::default().fg(Color::Green)),
    ])];

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(header, area);
}

/// Render the sidebar: persona list on top, active instruction below
fn render_sidebar(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(app.personas.len() as u16 + 2),
            Constraint::Min(3),
        ])
        .split(area);

    let active = app.view.persona_id();
    let items: Vec<ListItem> = app
        .personas
        .iter()
        .map(|persona| {
            let is_active = active == Some(persona.id.as_str());
            let (marker, style) = if is_active {
                (
                    "▶ ",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                ("  ", Style::default().fg(Color::White))
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, style),
                Span::styled(persona.label.clone(), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Personas (p/P) ")
            .borders(Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(list, chunks[0]);

    let instruction = Paragraph::new(app.view.instruction().to_string())
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(" Instruction ")
                .borders(Borders::RIGHT)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(instruction, chunks[1]);
}

fn role_line(
    label: &str,
    color: Color,
    time: Option<&DateTime<Local>>,
    suffix: Option<Span<'static>>,
) -> Line<'static> {
    let mut spans = vec![Span::styled(
        format!("[{}] ", label),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(time) = time {
        spans.push(Span::styled(
            format!("{} ", time.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.extend(suffix);
    Line::from(spans)
}

/// Render the chat area
fn render_chat(frame: &mut Frame, area: Rect, app: &App) {
    let mut lines: Vec<Line> = Vec::new();

    for (idx, turn) in app.view.transcript().iter().enumerate() {
        match turn.role {
            Role::User => {
                let flag = app.view.is_orphaned(idx).then(|| {
                    Span::styled(
                        format!("⚠ no reply ({})", app.orphan_policy),
                        Style::default()
                            .fg(Color::Red)
                            .add_modifier(Modifier::ITALIC),
                    )
                });
                lines.push(role_line("You", Color::Blue, Some(&turn.created_at), flag));
                for line in turn.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Role::Assistant => {
                lines.push(role_line(
                    app.persona_label(),
                    Color::Green,
                    Some(&turn.created_at),
                    None,
                ));
                if app.render_markdown {
                    lines.extend(parse_markdown(&turn.content));
                } else {
                    for line in turn.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
            }
        }
        lines.push(Line::from(""));
    }

    if let Some(prompt) = &app.pending_prompt {
        lines.push(role_line("You", Color::Blue, None, None));
        for line in prompt.lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "▋ thinking...",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::SLOW_BLINK),
        )));
    }

    if !app.info_lines.is_empty() {
        for line in &app.info_lines {
            lines.push(Line::from(Span::styled(
                line.clone(),
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    let title = match app.last_replayed {
        Some(n) => format!(
            " Chat ({} messages, {} replayed last turn) ",
            app.view.transcript().len(),
            n
        ),
        None => format!(" Chat ({} messages) ", app.view.transcript().len()),
    };

    // Keep the newest lines in view; scroll_offset counts lines up from the bottom
    let visible = area.height.saturating_sub(2);
    let total = lines.len() as u16;
    let top = total
        .saturating_sub(visible)
        .saturating_sub(app.scroll_offset);

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false })
        .scroll((top, 0));

    frame.render_widget(paragraph, area);
}

/// Render the input area
fn render_input(frame: &mut Frame, area: Rect, app: &App, app_state: AppState) {
    let hints = if app_state == AppState::Command {
        matching_hints(&app.input)
    } else {
        Vec::new()
    };

    let input_area = if !hints.is_empty() && area.height > 3 {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(3)])
            .split(area);

        let hint_lines: Vec<Line> = hints
            .iter()
            .take(6)
            .map(|(cmd, desc)| {
                Line::from(vec![
                    Span::styled(
                        format!("  {:<18}", cmd),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(*desc, Style::default().fg(Color::Gray)),
                ])
            })
            .collect();

        let hints_block = Paragraph::new(hint_lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Commands "),
        );
        frame.render_widget(hints_block, chunks[0]);
        chunks[1]
    } else {
        area
    };

    let (title, border, prefix) = match app_state {
        AppState::Command => (" Enter Command ", Color::Yellow, ":"),
        AppState::Insert if app.is_generating => (" Waiting for reply... ", Color::DarkGray, ""),
        AppState::Insert => (" Message (Enter to send • Esc for normal mode) ", Color::Cyan, ""),
        AppState::Normal => (" i: type • p/P: persona • :help ", Color::DarkGray, ""),
    };

    let input = Paragraph::new(format!("{}{}", prefix, app.input))
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        );
    frame.render_widget(input, input_area);

    if app_state != AppState::Normal {
        let cursor_offset = (prefix.len() + app.input.chars().count()) as u16;
        let cursor_x = (input_area.x + 1 + cursor_offset)
            .min(input_area.x + input_area.width.saturating_sub(2));
        frame.set_cursor_position((cursor_x, input_area.y + 1));
    }
}

/// Render the status bar
fn render_status_bar(frame: &mut Frame, area: Rect, app: &App, app_state: AppState) {
    let (mode_str, mode_color) = match app_state {
        AppState::Normal => ("NORMAL", Color::Blue),
        AppState::Insert => ("INSERT", Color::Green),
        AppState::Command => ("COMMAND", Color::Yellow),
    };

    let status_text = if let Some(status) = &app.status_message {
        status.clone()
    } else if app.is_generating {
        "Generating response...".to_string()
    } else {
        "Ready".to_string()
    };

    let spans = vec![
        Span::styled(
            format!(" {} ", mode_str),
            Style::default()
                .bg(mode_color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(status_text),
        Span::raw(" | "),
        Span::styled(
            format!("orphans: {}", app.orphan_policy),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" | "),
        Span::styled("Ctrl+C: quit", Style::default().fg(Color::DarkGray)),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .style(Style::default().bg(Color::Black))
        .block(Block::default());

    frame.render_widget(status_bar, area);
}
