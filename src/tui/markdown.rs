use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Accumulates spans into lines while walking the markdown events
#[derive(Default)]
struct LineBuilder {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
}

impl LineBuilder {
    fn push(&mut self, span: Span<'static>) {
        self.spans.push(span);
    }

    fn break_line(&mut self) {
        if !self.spans.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        }
    }

    fn push_line(&mut self, line: Line<'static>) {
        self.break_line();
        self.lines.push(line);
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.break_line();
        self.lines
    }
}

fn fence() -> Span<'static> {
    Span::styled("```", Style::default().fg(Color::DarkGray))
}

/// Parse a model reply as markdown into styled ratatui lines
pub fn parse_markdown(input: &str) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut out = LineBuilder::default();
    let mut style_stack = vec![Style::default()];
    let mut code_block: Option<String> = None;
    let mut list_depth: usize = 0;

    for event in Parser::new_ext(input, options) {
        let current = style_stack.last().copied().unwrap_or_default();
        match event {
            Event::Start(tag) => {
                let style = match tag {
                    Tag::Heading { level, .. } => {
                        out.break_line();
                        let (prefix, color) = match level {
                            HeadingLevel::H1 => ("# ", Color::Cyan),
                            HeadingLevel::H2 => ("## ", Color::Blue),
                            HeadingLevel::H3 => ("### ", Color::Green),
                            _ => ("#### ", Color::Yellow),
                        };
                        let style = Style::default().fg(color).add_modifier(Modifier::BOLD);
                        out.push(Span::styled(prefix, style));
                        style
                    }
                    Tag::Emphasis => current.add_modifier(Modifier::ITALIC),
                    Tag::Strong => current.add_modifier(Modifier::BOLD),
                    Tag::Strikethrough => current.add_modifier(Modifier::CROSSED_OUT),
                    Tag::CodeBlock(kind) => {
                        code_block = Some(String::new());
                        let lang = match kind {
                            CodeBlockKind::Fenced(lang) => lang.to_string(),
                            CodeBlockKind::Indented => String::new(),
                        };
                        out.push_line(Line::from(vec![
                            fence(),
                            Span::styled(lang, Style::default().fg(Color::Magenta)),
                        ]));
                        Style::default().fg(Color::Gray)
                    }
                    Tag::List(_) => {
                        list_depth += 1;
                        out.break_line();
                        current
                    }
                    Tag::Item => {
                        out.push(Span::raw("  ".repeat(list_depth.saturating_sub(1))));
                        out.push(Span::styled("• ", Style::default().fg(Color::Yellow)));
                        current
                    }
                    Tag::Link { .. } => {
                        out.push(Span::styled("[", Style::default().fg(Color::Blue)));
                        Style::default()
                            .fg(Color::Blue)
                            .add_modifier(Modifier::UNDERLINED)
                    }
                    Tag::BlockQuote(_) => {
                        out.break_line();
                        out.push(Span::styled("│ ", Style::default().fg(Color::DarkGray)));
                        Style::default()
                            .fg(Color::Gray)
                            .add_modifier(Modifier::ITALIC)
                    }
                    _ => current,
                };
                style_stack.push(style);
            }
            Event::End(tag) => {
                style_stack.pop();
                match tag {
                    TagEnd::Heading(_)
                    | TagEnd::Paragraph
                    | TagEnd::Item
                    | TagEnd::BlockQuote(_) => out.break_line(),
                    TagEnd::CodeBlock => {
                        for line in code_block.take().unwrap_or_default().lines() {
                            out.push_line(Line::from(Span::styled(
                                line.to_string(),
                                Style::default().fg(Color::Gray),
                            )));
                        }
                        out.push_line(Line::from(fence()));
                    }
                    TagEnd::List(_) => list_depth = list_depth.saturating_sub(1),
                    TagEnd::Link => out.push(Span::styled("]", Style::default().fg(Color::Blue))),
                    _ => {}
                }
            }
            Event::Text(text) => match code_block.as_mut() {
                Some(buffer) => buffer.push_str(&text),
                None => out.push(Span::styled(text.to_string(), current)),
            },
            Event::Code(code) => {
                let style = Style::default()
                    .fg(Color::Yellow)
                    .bg(Color::Rgb(40, 40, 40));
                out.push(Span::styled(format!(" {} ", code), style));
            }
            Event::SoftBreak | Event::HardBreak => out.break_line(),
            _ => {}
        }
    }

    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_plain_paragraphs() {
        let lines = parse_markdown("Vanakkam!\nHow are you?");
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered, vec!["Vanakkam!", "How are you?"]);
    }

    #[test]
    fn test_list_and_emphasis() {
        let lines = parse_markdown("Try:\n\n- **Namaste**\n- *Dhanyavaad*");
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered, vec!["Try:", "• Namaste", "• Dhanyavaad"]);

        let bold = &lines[1].spans[2];
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_code_block() {
        let lines = parse_markdown("```rust\nfn main() {}\n```");
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered, vec!["```rust", "fn main() {}", "```"]);
    }

    #[test]
    fn test_heading() {
        let lines = parse_markdown("## Phrases");
        assert_eq!(text(&lines[0]), "## Phrases");
    }
}
