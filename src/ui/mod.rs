//! User interface rendering module
//!
//! - `header` - Header art, step line, progress gauge, log pane, status bar
//! - `dialogs` - Prompt dialogs drawn over the log

mod dialogs;
mod header;

use crate::app::AppState;
use header::HeaderRenderer;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

/// Below this height the header art is skipped
const MIN_HEIGHT_FOR_HEADER: u16 = 24;

/// Main UI renderer
pub struct UiRenderer {
    header: HeaderRenderer,
}

impl Default for UiRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl UiRenderer {
    pub fn new() -> Self {
        Self {
            header: HeaderRenderer::new(),
        }
    }

    /// Render the complete UI from application state
    pub fn render(&self, f: &mut Frame, state: &AppState) {
        let area = f.area();
        let header_height = if area.height >= MIN_HEIGHT_FOR_HEADER {
            header::HEADER_HEIGHT
        } else {
            0
        };
        let failure_height = if state.failure.is_some() { 4 } else { 0 };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(header_height),  // Header art
                Constraint::Length(1),              // Current step
                Constraint::Length(3),              // Progress gauge
                Constraint::Length(failure_height), // Failure message
                Constraint::Min(3),                 // Log pane
                Constraint::Length(1),              // Status bar
            ])
            .split(area);

        self.header.render_header(f, chunks[0]);
        header::render_step(f, chunks[1], state);
        header::render_progress_bar(f, chunks[2], state.percent());
        if let Some(message) = &state.failure {
            render_failure(f, chunks[3], message);
        }
        header::render_log(f, chunks[4], state);
        header::render_status_bar(f, chunks[5], state);

        dialogs::render_prompt(f, state);
    }
}

fn render_failure(f: &mut Frame, area: Rect, message: &str) {
    let widget = Paragraph::new(Line::from(message.to_string()))
        .style(crate::theme::Styles::error())
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Failure "));
    f.render_widget(widget, area);
}
