//! Application module
//!
//! The terminal front end. The install itself runs on a worker thread and
//! talks to this loop only through the coordinator channel; the loop owns
//! the terminal, folds messages into [`AppState`] and answers prompts from
//! key presses.
//!
//! # Module Structure
//! - `state` - Application state and key handling
//! - Main module - App struct and event loop

mod state;

pub use state::{buttons, AppState, KeyOutcome, UiMode};

use crate::coordinator::UiMessage;
use crate::orchestrator::RunOutcome;
use crate::ui::UiRenderer;
use crossterm::event::{Event, KeyEventKind};
use ratatui::{backend::Backend, Terminal};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Input poll interval; also bounds how stale the screen can get.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Main application struct
pub struct App {
    state: AppState,
    rx: Receiver<UiMessage>,
    worker: Option<JoinHandle<RunOutcome>>,
    outcome: Option<RunOutcome>,
    ui_renderer: UiRenderer,
}

impl App {
    pub fn new(rx: Receiver<UiMessage>, worker: JoinHandle<RunOutcome>) -> Self {
        Self {
            state: AppState::default(),
            rx,
            worker: Some(worker),
            outcome: None,
            ui_renderer: UiRenderer::new(),
        }
    }

    /// Run the event loop until the user quits, or the worker ends without
    /// anything left to show.
    ///
    /// Returns the worker's outcome, or `None` if the user quit while it was
    /// still running.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> anyhow::Result<Option<RunOutcome>> {
        info!("Starting main application loop");

        loop {
            self.poll_messages();
            self.poll_worker();
            self.state.drop_expired(Instant::now());

            if self.should_auto_exit() {
                break;
            }

            terminal.draw(|f| self.ui_renderer.render(f, &self.state))?;

            if crossterm::event::poll(POLL_INTERVAL)? {
                match crossterm::event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.state.handle_key(key) == KeyOutcome::Quit {
                            if !self.state.worker_finished {
                                warn!("Quit requested while the install is running");
                            }
                            break;
                        }
                    }
                    // Next draw picks up the new size
                    Event::Resize(..) => {}
                    _ => {}
                }
            }
        }

        Ok(self.outcome.take())
    }

    /// Apply everything the worker has sent since the last frame.
    fn poll_messages(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(UiMessage::Event(event)) => self.state.apply_event(event),
                Ok(UiMessage::Request(request)) => {
                    debug!("Prompt: {}", request.prompt.title());
                    self.state.accept_request(request);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.state.worker_finished = true;
                    break;
                }
            }
        }
    }

    fn poll_worker(&mut self) {
        if !self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            return;
        }
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.state.worker_finished = true;
        match handle.join() {
            Ok(outcome) => {
                info!("Worker finished: {:?}", outcome);
                self.state.status_message = match &outcome {
                    RunOutcome::Completed { .. } => "Installation complete, press q to exit",
                    RunOutcome::Failed { .. } => "Installation failed, press q to exit",
                    RunOutcome::Cancelled | RunOutcome::Exited { .. } => "Exiting",
                }
                .to_string();
                self.outcome = Some(outcome);
            }
            Err(_) => {
                let message = "install worker panicked".to_string();
                self.state.failure = Some(message.clone());
                self.state.status_message = "Installation failed, press q to exit".to_string();
                self.outcome = Some(RunOutcome::Failed { message });
            }
        }
    }

    /// Cancel and exit answers leave nothing to read on screen.
    fn should_auto_exit(&self) -> bool {
        matches!(
            self.outcome,
            Some(RunOutcome::Cancelled) | Some(RunOutcome::Exited { .. })
        )
    }
}
