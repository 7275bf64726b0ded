//! Header and common widget rendering
//!
//! The ASCII art header, the current step, the progress gauge, the log pane
//! and the bottom status bar.

use crate::app::{AppState, UiMode};
use crate::theme::{Colors, Styles, Theme};
use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

/// Rows the header art needs
pub const HEADER_HEIGHT: u16 = 5;

/// Header renderer containing the ASCII art header
pub struct HeaderRenderer {
    header_lines: Vec<Line<'static>>,
}

impl Default for HeaderRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderRenderer {
    pub fn new() -> Self {
        Self {
            header_lines: Self::create_header(),
        }
    }

    pub fn render_header(&self, f: &mut Frame, area: Rect) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let header = Paragraph::new(self.header_lines.clone())
            .block(Block::default().borders(Borders::NONE))
            .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    fn create_header() -> Vec<Line<'static>> {
        const ART: [&str; 5] = [
            " ▄▀█ █▀█ █▀▀ █ █ █▀█ █ █▀█ ▀█▀",
            " █▀█ █▀▄ █▄▄ █▀█ █▀▄ █ █▄█  █ ",
            "",
            "desktop installer",
            "",
        ];
        ART.iter()
            .enumerate()
            .map(|(i, text)| {
                let style = if i < 2 { Styles::title() } else { Styles::text_muted() };
                Line::from(Span::styled(*text, style))
            })
            .collect()
    }
}

/// Render the current step label
pub fn render_step(f: &mut Frame, area: Rect, state: &AppState) {
    let (label, style) = if state.failure.is_some() {
        ("Failed".to_string(), Styles::error())
    } else if state.done.is_some() {
        ("Complete".to_string(), Styles::success())
    } else {
        (state.step.clone(), Styles::step())
    };
    let step = Paragraph::new(Line::from(vec![
        Span::styled("▶ ", Styles::title()),
        Span::styled(label, style),
    ]));
    f.render_widget(step, area);
}

/// Render progress bar
pub fn render_progress_bar(f: &mut Frame, area: Rect, percent: u16) {
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Styles::border_active())
                .title(" Progress "),
        )
        .gauge_style(Styles::gauge())
        .percent(percent.min(100));
    f.render_widget(gauge, area);
}

/// Render the scrolling log pane
pub fn render_log(f: &mut Frame, area: Rect, state: &AppState) {
    let inner_height = area.height.saturating_sub(2) as usize;
    let range = state.visible_range(inner_height);
    let lines: Vec<Line> = state.log[range]
        .iter()
        .map(|line| Line::from(Span::styled(line.text.as_str(), Theme::log_style(line.level))))
        .collect();

    let title = if state.scroll_offset > 0 {
        format!(" Log (scrolled {} line(s), End to follow) ", state.scroll_offset)
    } else {
        " Log ".to_string()
    };

    // No wrapping: the visible range is counted in log lines
    let pane = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Colors::FG_MUTED))
            .title(title),
    );
    f.render_widget(pane, area);
}

/// Render the key hints and status message
pub fn render_status_bar(f: &mut Frame, area: Rect, state: &AppState) {
    let hints = match state.mode {
        UiMode::Idle if state.worker_finished => "q quit  ↑↓ PgUp PgDn scroll",
        UiMode::Idle => "↑↓ PgUp PgDn scroll  q quit (applied modules stay installed)",
        UiMode::TextInput => "type your answer  Enter confirm  Esc clear",
        UiMode::Confirm(crate::coordinator::PromptKind::Ternary) => "←→ choose  Enter confirm  y/n/r",
        UiMode::Confirm(_) => "←→ choose  Enter confirm  y/n",
    };

    let mut spans = vec![Span::styled(hints, Styles::text_muted())];
    if !state.status_message.is_empty() {
        let style = if state.failure.is_some() {
            Styles::error()
        } else {
            Styles::success()
        };
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(state.status_message.as_str(), style));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
