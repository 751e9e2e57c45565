use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use serde::Serialize;
use tracing::info;

use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchDecision {
    Regather,
    Reuse,
}

impl BatchDecision {
    pub fn from_regather(regather: bool) -> Self {
        if regather {
            BatchDecision::Regather
        } else {
            BatchDecision::Reuse
        }
    }

    pub fn regathers(self) -> bool {
        matches!(self, BatchDecision::Regather)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionOrigin {
    NoBatchTable,
    Flag,
    Operator,
    Timeout,
    NonInteractive,
}

#[derive(Debug, Clone, Copy)]
pub enum DecisionInput {
    Flag(BatchDecision),
    Prompt { timeout: Duration, default: BatchDecision },
    Default(BatchDecision),
}

pub trait Asker {
    fn ask(&self, question: &str, timeout: Duration) -> Result<Option<bool>, ReconcileError>;
}

pub fn decide(
    batch_table_exists: bool,
    input: DecisionInput,
    asker: &dyn Asker,
) -> Result<(BatchDecision, DecisionOrigin), ReconcileError> {
    if !batch_table_exists {
        return Ok((BatchDecision::Regather, DecisionOrigin::NoBatchTable));
    }
    let decided = match input {
        DecisionInput::Flag(decision) => (decision, DecisionOrigin::Flag),
        DecisionInput::Default(decision) => (decision, DecisionOrigin::NonInteractive),
        DecisionInput::Prompt { timeout, default } => {
            let question = format!(
                "Re-extract all DArT batches? [y/n] (defaults to {} in {}s)",
                if default.regathers() { "yes" } else { "no" },
                timeout.as_secs()
            );
            match asker.ask(&question, timeout)? {
                Some(answer) => (BatchDecision::from_regather(answer), DecisionOrigin::Operator),
                None => (default, DecisionOrigin::Timeout),
            }
        }
    };
    info!(decision = ?decided.0, origin = ?decided.1, "batch decision");
    Ok(decided)
}

pub struct TerminalAsker;

struct RawMode;

impl RawMode {
    fn enable() -> Result<Self, ReconcileError> {
        terminal::enable_raw_mode().map_err(prompt_err)?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Asker for TerminalAsker {
    fn ask(&self, question: &str, timeout: Duration) -> Result<Option<bool>, ReconcileError> {
        let mut stderr = io::stderr();
        write!(stderr, "{question} ").map_err(prompt_err)?;
        stderr.flush().map_err(prompt_err)?;

        let answer = {
            let _raw = RawMode::enable()?;
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break None;
                }
                if !event::poll(remaining.min(Duration::from_millis(120))).map_err(prompt_err)? {
                    continue;
                }
                let Event::Key(key) = event::read().map_err(prompt_err)? else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => break Some(true),
                    KeyCode::Char('n') | KeyCode::Char('N') => break Some(false),
                    KeyCode::Esc => break None,
                    _ => {}
                }
            }
        };

        let shown = match answer {
            Some(true) => "y",
            Some(false) => "n",
            None => "(no answer)",
        };
        writeln!(stderr, "{shown}").map_err(prompt_err)?;
        Ok(answer)
    }
}

fn prompt_err(err: io::Error) -> ReconcileError {
    ReconcileError::Prompt(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Scripted {
        answer: Option<bool>,
        asked: Cell<usize>,
    }

    impl Asker for Scripted {
        fn ask(&self, _question: &str, _timeout: Duration) -> Result<Option<bool>, ReconcileError> {
            self.asked.set(self.asked.get() + 1);
            Ok(self.answer)
        }
    }

    fn prompt(default: BatchDecision) -> DecisionInput {
        DecisionInput::Prompt {
            timeout: Duration::from_secs(10),
            default,
        }
    }

    #[test]
    fn missing_batch_table_always_regathers_without_asking() {
        let asker = Scripted { answer: Some(false), asked: Cell::new(0) };
        let decided = decide(false, DecisionInput::Flag(BatchDecision::Reuse), &asker).unwrap();
        assert_eq!(decided, (BatchDecision::Regather, DecisionOrigin::NoBatchTable));
        assert_eq!(asker.asked.get(), 0);
    }

    #[test]
    fn silence_selects_the_default() {
        let asker = Scripted { answer: None, asked: Cell::new(0) };
        let decided = decide(true, prompt(BatchDecision::Regather), &asker).unwrap();
        assert_eq!(decided, (BatchDecision::Regather, DecisionOrigin::Timeout));
        assert_eq!(asker.asked.get(), 1);
    }

    #[test]
    fn operator_answer_overrides_default() {
        let asker = Scripted { answer: Some(false), asked: Cell::new(0) };
        let decided = decide(true, prompt(BatchDecision::Regather), &asker).unwrap();
        assert_eq!(decided, (BatchDecision::Reuse, DecisionOrigin::Operator));
    }
}
