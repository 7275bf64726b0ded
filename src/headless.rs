//! Headless front end
//!
//! Drains the coordinator channel without a terminal UI: events are printed
//! as plain lines and prompts are answered automatically. Confirmations are
//! answered Yes, the reboot prompt No, and text prompts are read from the
//! input stream one line each.

use crate::coordinator::{Answer, Prompt, PromptKind, UiEvent, UiMessage};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;
use tracing::debug;

/// Final state seen by the responder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessSummary {
    pub answered: usize,
    pub last_progress: f64,
    pub done: bool,
    pub failure: Option<String>,
}

pub struct HeadlessResponder<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> HeadlessResponder<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }

    /// Handle messages until the worker drops its end of the channel.
    pub fn run(mut self, rx: Receiver<UiMessage>) -> io::Result<HeadlessSummary> {
        let mut summary = HeadlessSummary::default();
        for message in rx {
            match message {
                UiMessage::Event(event) => self.print_event(event, &mut summary)?,
                UiMessage::Request(request) => {
                    let answer = self.answer(&request.prompt)?;
                    writeln!(self.out, "? {}: {}", request.prompt.title(), describe(&answer))?;
                    if !request.respond(answer) {
                        debug!("worker stopped waiting before the answer arrived");
                    }
                    summary.answered += 1;
                }
            }
        }
        self.out.flush()?;
        Ok(summary)
    }

    fn print_event(&mut self, event: UiEvent, summary: &mut HeadlessSummary) -> io::Result<()> {
        match event {
            UiEvent::Log(line) => writeln!(self.out, "{}", line.text),
            UiEvent::Progress(value) => {
                summary.last_progress = value;
                writeln!(self.out, "[{:>3.0}%]", value * 100.0)
            }
            UiEvent::Step(label) => writeln!(self.out, "==> {}", label),
            UiEvent::Done { reboot_default } => {
                summary.done = true;
                if reboot_default {
                    writeln!(self.out, "Installation complete. A new kernel was installed, reboot when convenient.")
                } else {
                    writeln!(self.out, "Installation complete.")
                }
            }
            UiEvent::Failure(message) => {
                summary.failure = Some(message.clone());
                writeln!(self.out, "Installation failed: {}", message)
            }
        }
    }

    /// Automatic answer for `prompt`.
    pub fn answer(&mut self, prompt: &Prompt) -> io::Result<Answer> {
        match prompt.kind() {
            PromptKind::Text => {
                write!(self.out, "{}: ", prompt.title())?;
                self.out.flush()?;
                let mut line = String::new();
                self.input.read_line(&mut line)?;
                Ok(Answer::Text(line.trim().to_string()))
            }
            _ if matches!(prompt, Prompt::Reboot { .. }) => Ok(Answer::No),
            _ => Ok(Answer::Yes),
        }
    }
}

fn describe(answer: &Answer) -> &str {
    match answer {
        Answer::Yes => "yes",
        Answer::No => "no",
        Answer::Retry => "retry",
        Answer::Text(text) if text.is_empty() => "(empty)",
        Answer::Text(text) => text,
    }
}
