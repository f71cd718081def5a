//! Command line parser.
//!
//! A captured line is resolved one sub-command at a time. Each call to
//! [`CommandParser::step`] scans forward from the cursor, classifying every
//! byte into a [`ParserState`]. The pair (previous state, new state) selects a
//! [`ParseAction`] from a fixed transition table; any pair not in the table
//! rejects the whole line.
//!
//! When a sub-command is resolved the step stops and returns it for dispatch.
//! The next step is only taken after that command's successful final response,
//! so `AT+FOO;+BAR` resolves `AT+BAR` only once `AT+FOO` has answered OK.
//!
//! Sub-commands after the first are parsed in place: the two bytes in front of
//! the next sub-command are overwritten with `AT`, so every sub-command is
//! looked up by its full name (`AT+FOO;+BAR` becomes `AT+FOAT+BAR`, and the
//! second step starts at the second `AT`).

use atserver_protocol::{
    is_basic_command_char, is_number, is_parameter_char, is_quote, is_separator, CommandType,
    AT_PREFIX, AT_TOKEN_COMMA, AT_TOKEN_EQUAL, AT_TOKEN_QUESTIONMARK, AT_TOKEN_SEMICOLON,
    MIN_BASIC_CANDIDATE_LENGTH,
};
use tracing::trace;

use crate::error::{AtError, AtResult};
use crate::registry::CommandRegistry;
use crate::types::{CommandRef, DeviceRef};

/// Token class of the byte under the cursor.
///
/// The order matters: every state from [`ParserState::Basic`] on belongs to
/// the basic-command family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserState {
    /// Part of a command name.
    CmdName,
    /// `=`
    Equal,
    /// `?`
    QuestionMark,
    /// `,`, or any byte inside an extended command's parameter list.
    Comma,
    /// `;`
    Semicolon,
    /// First symbol of a basic command, right after `AT`.
    Basic,
    /// Digit or quote following a basic command.
    BasicParam,
    /// Anything else following a basic command: the start of the next one.
    BasicEnd,
    /// Last byte of the line.
    Last,
}

impl ParserState {
    fn is_basic_family(self) -> bool {
        self >= ParserState::Basic
    }
}

/// Side effect selected by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAction {
    /// Invalid transition; the line fails.
    Reject,
    /// Nothing to do.
    Accept,
    /// Uppercase the byte as part of the name.
    Uppercase,
    /// `=?` after a resolved name: test command.
    MarkTest,
    /// `?` after a name: resolve it as a read command.
    MarkRead,
    /// `=` after a name: resolve it as a parameter command.
    OpenParameters,
    /// Capture one extended-command parameter.
    CaptureParameter,
    /// `;`: resolve the name if needed and prepare the next sub-command.
    SplitCommand,
    /// Last byte of a bare name: resolve it as an action command.
    ResolveLast,
    /// Longest-match lookup of a basic command.
    ResolveBasic,
    /// Capture a basic-command numeric parameter.
    CaptureBasicParameter,
    /// End of a basic command followed by another one.
    EndBasic,
}

/// Transition table, indexed by (previous state, current state).
pub fn transition(last: ParserState, current: ParserState) -> ParseAction {
    use ParseAction::*;
    use ParserState as S;

    match last {
        S::CmdName => match current {
            S::CmdName => Uppercase,
            S::Equal => OpenParameters,
            S::QuestionMark => MarkRead,
            S::Semicolon => SplitCommand,
            S::Basic => ResolveBasic,
            S::Last => ResolveLast,
            _ => Reject,
        },
        S::Equal => match current {
            S::QuestionMark => MarkTest,
            S::Comma => CaptureParameter,
            S::Last => Accept,
            _ => Reject,
        },
        S::QuestionMark => match current {
            S::CmdName => EndBasic,
            S::Semicolon => SplitCommand,
            S::Last => Accept,
            _ => Reject,
        },
        S::Comma => match current {
            S::Comma => CaptureParameter,
            S::Semicolon => SplitCommand,
            S::Last => Accept,
            _ => Reject,
        },
        S::Semicolon => match current {
            S::CmdName => Uppercase,
            S::Equal => SplitCommand,
            S::Last => Accept,
            _ => Reject,
        },
        S::Basic => match current {
            S::CmdName => Uppercase,
            S::QuestionMark => MarkRead,
            S::Semicolon => SplitCommand,
            S::BasicParam => CaptureBasicParameter,
            S::BasicEnd => EndBasic,
            S::Last => Accept,
            _ => Reject,
        },
        S::BasicParam => match current {
            S::QuestionMark => MarkRead,
            S::Semicolon => SplitCommand,
            S::BasicParam => CaptureBasicParameter,
            S::BasicEnd => EndBasic,
            _ => Reject,
        },
        S::BasicEnd => match current {
            S::Last => Accept,
            _ => Reject,
        },
        S::Last => match current {
            S::CmdName => Uppercase,
            S::Last => Accept,
            _ => Reject,
        },
    }
}

/// Result of one parser step.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A sub-command was resolved and bound; run its handler.
    Dispatch(CommandRef),
    /// Nothing is left on the line; send the final response.
    Complete,
    /// The line is malformed or names an unavailable command.
    Failed(AtError),
}

/// Per-device parser state.
#[derive(Debug, Clone)]
pub struct CommandParser {
    line: Vec<u8>,
    cursor: usize,
    cmd_start: usize,
    state: ParserState,
    last_state: ParserState,
    current: Option<CommandRef>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandParser {
    pub fn new() -> Self {
        CommandParser {
            line: Vec::new(),
            cursor: 0,
            cmd_start: 0,
            state: ParserState::CmdName,
            last_state: ParserState::CmdName,
            current: None,
        }
    }

    /// Start parsing a freshly captured line.
    pub fn load(&mut self, line: Vec<u8>) {
        *self = CommandParser {
            line,
            ..CommandParser::new()
        };
    }

    /// Forget the current line.
    pub fn reset(&mut self) {
        *self = CommandParser::new();
    }

    /// The line being parsed, as rewritten so far.
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Command resolved by the last step.
    pub fn current(&self) -> Option<CommandRef> {
        self.current
    }

    /// Resolve the next sub-command of the line.
    ///
    /// On failure any command bound during this step is released again.
    pub fn step(&mut self, registry: &mut CommandRegistry, device: DeviceRef) -> ParseOutcome {
        self.state = ParserState::CmdName;
        self.current = None;

        if self.cursor >= self.line.len() {
            return ParseOutcome::Complete;
        }

        while !matches!(self.state, ParserState::Semicolon | ParserState::Last) {
            self.state = self.classify(registry);
            let action = transition(self.last_state, self.state);
            trace!(
                "byte {} {:?} -> {:?}: {:?}",
                self.cursor,
                self.last_state,
                self.state,
                action
            );

            match self.apply(action, registry, device) {
                Ok(next) => self.cursor = next,
                Err(e) => {
                    self.abandon(registry);
                    return ParseOutcome::Failed(e);
                }
            }

            self.last_state = self.state;
            if self.cursor >= self.line.len() {
                self.state = ParserState::Last;
            }
        }

        match self.current {
            Some(command) => ParseOutcome::Dispatch(command),
            None => ParseOutcome::Failed(AtError::Parse("no command on line".into())),
        }
    }

    fn abandon(&mut self, registry: &mut CommandRegistry) {
        if let Some(command) = self.current.take() {
            registry.release(command);
        }
    }

    fn current_kind(&self, registry: &CommandRegistry) -> Option<CommandType> {
        self.current
            .and_then(|command| registry.get(command).ok())
            .map(|entry| entry.kind())
    }

    fn classify(&self, registry: &CommandRegistry) -> ParserState {
        let byte = self.line[self.cursor];
        match byte {
            AT_TOKEN_EQUAL => ParserState::Equal,
            AT_TOKEN_QUESTIONMARK => ParserState::QuestionMark,
            AT_TOKEN_COMMA => ParserState::Comma,
            AT_TOKEN_SEMICOLON => ParserState::Semicolon,
            _ if self.state.is_basic_family() => {
                if is_number(byte) || is_quote(byte) {
                    ParserState::BasicParam
                } else {
                    ParserState::BasicEnd
                }
            }
            _ if self.cursor - self.cmd_start == AT_PREFIX.len() && is_basic_command_char(byte) => {
                ParserState::Basic
            }
            _ if self.current_kind(registry) == Some(CommandType::Parameter) => ParserState::Comma,
            _ if self.cursor + 1 == self.line.len() => ParserState::Last,
            _ => ParserState::CmdName,
        }
    }

    /// Run `action` for the byte under the cursor and return the next cursor position.
    fn apply(
        &mut self,
        action: ParseAction,
        registry: &mut CommandRegistry,
        device: DeviceRef,
    ) -> AtResult<usize> {
        let cur = self.cursor;
        match action {
            ParseAction::Reject => Err(AtError::Parse(format!(
                "unexpected {:?} after {:?} at byte {}",
                self.state, self.last_state, cur
            ))),
            ParseAction::Accept => Ok(cur + 1),
            ParseAction::Uppercase => {
                self.line[cur].make_ascii_uppercase();
                Ok(cur + 1)
            }
            ParseAction::MarkTest => {
                let command = self
                    .current
                    .ok_or_else(|| AtError::Parse("test suffix without a command".into()))?;
                registry.get_mut(command)?.kind = CommandType::Test;
                Ok(cur + 1)
            }
            ParseAction::MarkRead => {
                self.resolve(registry, device, cur)?;
                self.set_kind(registry, CommandType::Read)?;
                Ok(cur + 1)
            }
            ParseAction::OpenParameters => {
                self.resolve(registry, device, cur)?;
                self.set_kind(registry, CommandType::Parameter)?;
                Ok(cur + 1)
            }
            ParseAction::CaptureParameter => self.capture_parameter(registry),
            ParseAction::SplitCommand => self.split_command(registry, device),
            ParseAction::ResolveLast => {
                if self.current.is_none() {
                    self.line[cur].make_ascii_uppercase();
                    self.resolve(registry, device, cur + 1)?;
                    self.set_kind(registry, CommandType::Action)?;
                }
                Ok(cur + 1)
            }
            ParseAction::ResolveBasic => self.resolve_basic(registry, device),
            ParseAction::CaptureBasicParameter => self.capture_basic_parameter(registry),
            ParseAction::EndBasic => {
                let start = cur
                    .checked_sub(AT_PREFIX.len())
                    .ok_or_else(|| AtError::Parse("basic command too short".into()))?;
                self.restart_at(start);
                self.state = ParserState::Last;
                Ok(start)
            }
        }
    }

    /// Bind the name `line[cmd_start..end]` unless a command is already resolved.
    fn resolve(
        &mut self,
        registry: &mut CommandRegistry,
        device: DeviceRef,
        end: usize,
    ) -> AtResult<()> {
        if self.current.is_none() {
            let command = registry.bind(&self.line[self.cmd_start..end], device)?;
            self.current = Some(command);
        }
        Ok(())
    }

    fn set_kind(&self, registry: &mut CommandRegistry, kind: CommandType) -> AtResult<()> {
        if let Some(command) = self.current {
            registry.get_mut(command)?.kind = kind;
        }
        Ok(())
    }

    fn push_parameter(&self, registry: &mut CommandRegistry, param: &[u8]) -> AtResult<()> {
        let command = self
            .current
            .ok_or_else(|| AtError::Parse("parameter without a command".into()))?;
        registry
            .get_mut(command)?
            .params
            .push(String::from_utf8_lossy(param).into_owned())
            .map_err(|e| AtError::Parse(e.to_string()))
    }

    /// Write `AT` at `start` so the next sub-command starts there.
    fn restart_at(&mut self, start: usize) {
        self.line[start..start + AT_PREFIX.len()].copy_from_slice(AT_PREFIX.as_bytes());
        self.cmd_start = start;
    }

    fn split_command(&mut self, registry: &mut CommandRegistry, device: DeviceRef) -> AtResult<usize> {
        let cur = self.cursor;
        if self.current.is_none() {
            self.resolve(registry, device, cur)?;
            self.set_kind(registry, CommandType::Action)?;
        }

        // A trailing separator ends the line.
        if cur + 1 >= self.line.len() {
            return Ok(self.line.len());
        }

        let start = cur
            .checked_sub(1)
            .ok_or_else(|| AtError::Parse("separator at start of line".into()))?;
        self.restart_at(start);
        Ok(start)
    }

    fn capture_parameter(&mut self, registry: &mut CommandRegistry) -> AtResult<usize> {
        let command = self
            .current
            .ok_or_else(|| AtError::Parse("parameter without a command".into()))?;

        let mut cur = self.cursor;
        if !registry.get(command)?.params.is_empty() {
            // Skip the comma separating this parameter from the previous one.
            cur += 1;
        }

        let mut param = Vec::new();
        let mut quoted = false;
        while cur < self.line.len() {
            let byte = self.line[cur];
            if !quoted && (byte == AT_TOKEN_COMMA || byte == AT_TOKEN_SEMICOLON) {
                break;
            }
            if is_quote(byte) {
                quoted = !quoted;
            } else if quoted || is_parameter_char(byte) {
                param.push(byte);
            } else {
                return Err(AtError::Parse(format!(
                    "invalid parameter character {:?}",
                    byte as char
                )));
            }
            cur += 1;
        }

        self.push_parameter(registry, &param)?;
        Ok(cur)
    }

    fn resolve_basic(&mut self, registry: &mut CommandRegistry, device: DeviceRef) -> AtResult<usize> {
        let mut end = self.cursor;
        while end < self.line.len() && !is_separator(self.line[end]) && !is_quote(self.line[end]) {
            self.line[end].make_ascii_uppercase();
            end += 1;
        }

        // Longest prefix registered for this device wins.
        while end - self.cmd_start >= MIN_BASIC_CANDIDATE_LENGTH {
            let candidate = &self.line[self.cmd_start..end];
            if registry.resolves_on(candidate, device) {
                let command = registry.bind(candidate, device)?;
                self.current = Some(command);
                self.set_kind(registry, CommandType::Action)?;
                return Ok(end);
            }
            end -= 1;
        }

        Err(AtError::NotFound(
            String::from_utf8_lossy(&self.line[self.cmd_start..]).into_owned(),
        ))
    }

    fn capture_basic_parameter(&mut self, registry: &mut CommandRegistry) -> AtResult<usize> {
        let mut cur = self.cursor;
        let mut next = None;
        let mut param = Vec::new();
        let mut quoted = false;

        while cur < self.line.len() {
            let byte = self.line[cur];
            if is_quote(byte) {
                quoted = !quoted;
            } else if quoted || is_number(byte) {
                param.push(byte);
            } else if byte == AT_TOKEN_EQUAL {
                // S-register assignment: the value follows as a second parameter.
                next = Some(cur + 1);
                break;
            } else {
                break;
            }
            cur += 1;
        }

        self.set_kind(registry, CommandType::Parameter)?;
        self.push_parameter(registry, &param)?;
        Ok(next.unwrap_or(cur))
    }
}
