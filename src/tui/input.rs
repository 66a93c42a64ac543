use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A `:` command typed in command mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Quit,
    /// Switch persona; `None` shows the current one
    Persona(Option<String>),
    Personas,
    /// Replace the system instruction; `None` shows the current one
    System(Option<String>),
    /// Back to the default persona
    Reset,
    Clear,
    Sidebar,
    Help,
}

/// Parse the text after `:`
pub fn parse_command(input: &str) -> Result<UiCommand, String> {
    let input = input.trim().trim_start_matches(':');
    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match name.to_lowercase().as_str() {
        "quit" | "q" => Ok(UiCommand::Quit),
        "persona" | "p" => Ok(UiCommand::Persona(argument)),
        "personas" | "ls" => Ok(UiCommand::Personas),
        "system" | "sys" => Ok(UiCommand::System(argument)),
        "reset" => Ok(UiCommand::Reset),
        "clear" => Ok(UiCommand::Clear),
        "sidebar" | "sb" => Ok(UiCommand::Sidebar),
        "help" | "h" => Ok(UiCommand::Help),
        "" => Err("Empty command".to_string()),
        other => Err(format!("Unknown command: {}", other)),
    }
}

/// Commands shown as hints while typing in command mode
pub const COMMAND_HINTS: &[(&str, &str)] = &[
    (":persona <id>", "Switch persona (resets the chat)"),
    (":personas", "List personas"),
    (":system <text>", "Set a custom instruction (resets the chat)"),
    (":reset", "Back to the default persona"),
    (":clear", "Clear the chat, keep the persona"),
    (":sidebar", "Toggle persona sidebar"),
    (":help", "Show command help"),
    (":quit", "Quit the application"),
];

/// Hints whose command starts with what has been typed so far
pub fn matching_hints(typed: &str) -> Vec<(&'static str, &'static str)> {
    let typed = typed.trim_start_matches(':').to_lowercase();
    COMMAND_HINTS
        .iter()
        .filter(|(cmd, _)| cmd.trim_start_matches(':').starts_with(typed.trim()))
        .copied()
        .collect()
}

pub fn is_quit_chord(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}
