//! Undo/redo history of committed transactions

use crate::transaction::Operation;

/// A committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    operations: Vec<Operation>,
}

impl Command {
    pub fn new(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            name: name.into(),
            operations,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Linear history with a cursor.
///
/// `commands[..current]` are applied; `commands[current..]` can be redone.
/// Pushing a new command discards the redo tail.
#[derive(Debug)]
pub struct CommandHistory {
    commands: Vec<Command>,
    current: usize,
    /// Cursor position of the last save; `None` once that state is unreachable
    clean_mark: Option<usize>,
    limit: Option<usize>,
    recording: bool,
    replaying: bool,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CommandHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            commands: Vec::new(),
            current: 0,
            clean_mark: Some(0),
            limit,
            recording: true,
            replaying: false,
        }
    }

    pub(crate) fn push(&mut self, command: Command) {
        if self.clean_mark.is_some_and(|m| m > self.current) {
            self.clean_mark = None;
        }
        self.commands.truncate(self.current);
        self.commands.push(command);
        self.current += 1;

        if let Some(limit) = self.limit {
            while self.commands.len() > limit {
                self.commands.remove(0);
                self.current -= 1;
                self.clean_mark = match self.clean_mark {
                    Some(0) | None => None,
                    Some(m) => Some(m - 1),
                };
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current < self.commands.len()
    }

    pub fn undo_command(&self) -> Option<&Command> {
        self.current.checked_sub(1).and_then(|i| self.commands.get(i))
    }

    pub fn redo_command(&self) -> Option<&Command> {
        self.commands.get(self.current)
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_command().map(Command::name)
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_command().map(Command::name)
    }

    pub(crate) fn step_back(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub(crate) fn step_forward(&mut self) {
        self.current = (self.current + 1).min(self.commands.len());
    }

    /// True when the document differs from the last [`mark_clean`](Self::mark_clean)
    pub fn is_dirty(&self) -> bool {
        self.clean_mark != Some(self.current)
    }

    pub fn mark_clean(&mut self) {
        self.clean_mark = Some(self.current);
    }

    /// When false, committed transactions are not added
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// True while an undo, redo or cancel is replaying operations
    pub fn is_undoing_or_redoing(&self) -> bool {
        self.replaying
    }

    pub(crate) fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.current = 0;
        self.clean_mark = None;
    }
}
