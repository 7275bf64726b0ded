//! Dialog rendering module
//!
//! Prompts from the worker are drawn as a centered dialog over the log:
//! button rows for confirmations, an input line for text prompts. Both show
//! the time left before the worker stops waiting.

use crate::app::{buttons, AppState};
use crate::coordinator::{Prompt, PromptKind, UiRequest};
use crate::theme::{Colors, Styles};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::time::Instant;

const DIALOG_WIDTH: u16 = 64;
const DIALOG_HEIGHT: u16 = 12;

/// Centered rect of at most `width` x `height` inside `area`
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width - width) / 2;
    let y = area.y + (area.height - height) / 2;
    Rect::new(x, y, width, height)
}

/// Render the open prompt, if any
pub fn render_prompt(f: &mut Frame, state: &AppState) {
    let Some(request) = state.pending.as_ref() else {
        return;
    };

    let area = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, f.area());
    f.render_widget(Clear, area);

    let danger = matches!(request.prompt, Prompt::FailureExit { .. });
    let (border, background) = if danger {
        (Style::default().fg(Colors::ERROR), Styles::panel_bg_danger())
    } else {
        (Styles::border_active(), Styles::panel_bg())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(format!(" {} ", request.prompt.title()))
        .title_alignment(Alignment::Center)
        .style(background);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Message
            Constraint::Length(3), // Buttons or input
            Constraint::Length(1), // Countdown
        ])
        .split(inner);

    let message = Paragraph::new(request.prompt.message())
        .style(Styles::text())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    f.render_widget(message, chunks[0]);

    match request.prompt.kind() {
        PromptKind::Text => render_input(f, chunks[1], &state.input),
        _ => render_buttons(f, chunks[1], request, state.selection),
    }

    render_countdown(f, chunks[2], request);
}

fn render_buttons(f: &mut Frame, area: Rect, request: &UiRequest, selection: usize) {
    let mut spans = Vec::new();
    for (i, (label, _)) in buttons(&request.prompt).iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("   "));
        }
        let style = if i == selection {
            Styles::selected()
        } else {
            Styles::unselected()
        };
        spans.push(Span::styled(format!("[ {} ]", label), style));
    }
    let row = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::NONE));
    // Center vertically within the three rows
    let middle = Rect::new(area.x, area.y + area.height / 2, area.width, 1.min(area.height));
    f.render_widget(row, middle);
}

fn render_input(f: &mut Frame, area: Rect, input: &str) {
    let (text, style) = if input.is_empty() {
        ("Enter value...".to_string(), Styles::text_muted())
    } else {
        (format!("{}▏", input), Style::default().fg(Colors::SUCCESS))
    };
    let widget = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Input"));
    f.render_widget(widget, area);
}

fn render_countdown(f: &mut Frame, area: Rect, request: &UiRequest) {
    let secs = request.remaining(Instant::now()).as_secs();
    let text = format!("{}:{:02} left", secs / 60, secs % 60);
    let widget = Paragraph::new(text)
        .style(Styles::text_muted())
        .alignment(Alignment::Right);
    f.render_widget(widget, area);
}
