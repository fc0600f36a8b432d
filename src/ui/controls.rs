use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use thiserror::Error;

use crate::shared::constants;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("{msg}", msg = constants::INVALID_WIDTH_MESSAGE)]
    InvalidWidth(String),
}

/// What a key press asks the session to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    TogglePause,
    ApplyWidth(u32),
    StepWidth(i32),
    ToggleColor,
    ToggleAxis,
    ToggleFlicker,
    /// Width input buffer changed; only the status bar needs a redraw.
    InputChanged,
    Rejected(ControlError),
    Quit,
}

/// Positive integer width no larger than the supported maximum.
pub fn parse_width(input: &str) -> Result<u32, ControlError> {
    let trimmed = input.trim();
    match trimmed.parse::<u32>() {
        Ok(width) if width > 0 && width <= constants::MAX_WIDTH => Ok(width),
        _ => Err(ControlError::InvalidWidth(trimmed.to_string())),
    }
}

/// `current` moved by `delta`, kept within `1..=MAX_WIDTH`.
pub fn stepped_width(current: u32, delta: i32) -> u32 {
    let next = current as i64 + delta as i64;
    next.clamp(1, constants::MAX_WIDTH as i64) as u32
}

/// Key handling for the live view, including the width entry field.
#[derive(Debug)]
pub struct ControlSurface {
    input: String,
    step: u32,
}

impl ControlSurface {
    pub fn new(step: u32) -> Self {
        Self {
            input: String::new(),
            step: step.max(1),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ControlAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(ControlAction::Quit);
        }

        let step = self.step.min(i32::MAX as u32) as i32;
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Some(ControlAction::Quit),
            KeyCode::Char(' ') | KeyCode::Char('p') => Some(ControlAction::TogglePause),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                // longer than any valid width can be
                if self.input.len() < 6 {
                    self.input.push(c);
                }
                Some(ControlAction::InputChanged)
            }
            KeyCode::Backspace => {
                self.input.pop();
                Some(ControlAction::InputChanged)
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.input);
                Some(match parse_width(&input) {
                    Ok(width) => ControlAction::ApplyWidth(width),
                    Err(err) => ControlAction::Rejected(err),
                })
            }
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => Some(ControlAction::StepWidth(step)),
            KeyCode::Char('-') | KeyCode::Down => Some(ControlAction::StepWidth(-step)),
            KeyCode::Char('c') => Some(ControlAction::ToggleColor),
            KeyCode::Char('a') => Some(ControlAction::ToggleAxis),
            KeyCode::Char('f') => Some(ControlAction::ToggleFlicker),
            _ => None,
        }
    }
}
