//! Command types, character classes and command-name rules.
//!
//! The parser recognises two command syntaxes:
//! - Extended commands: `AT+NAME`, `AT+NAME=...`, `AT+NAME?`, `AT+NAME=?`
//! - Basic commands: `ATE0`, `AT&K3`, `AT\Q1`

use std::fmt;

use crate::constants::{AT_PREFIX, AT_TOKEN_COMMA, AT_TOKEN_EQUAL, AT_TOKEN_QUESTIONMARK, AT_TOKEN_QUOTE, AT_TOKEN_SEMICOLON};
use crate::error::{ProtocolError, ProtocolResult};

/// How a command was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandType {
    /// Bare command: `AT+NAME`, `ATI`.
    #[default]
    Action,
    /// Write command with parameters: `AT+NAME=1,2`, `ATE0`.
    Parameter,
    /// Read command: `AT+NAME?`.
    Read,
    /// Test command: `AT+NAME=?`.
    Test,
}

impl CommandType {
    /// Get the type name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Action => "action",
            CommandType::Parameter => "parameter",
            CommandType::Read => "read",
            CommandType::Test => "test",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[0-9]`
pub fn is_number(b: u8) -> bool {
    b.is_ascii_digit()
}

/// `"`
pub fn is_quote(b: u8) -> bool {
    b == AT_TOKEN_QUOTE
}

/// Characters allowed in an unquoted extended-command parameter.
///
/// Decimal digits, `+`/`-`, `*`/`#`, the hexadecimal digits `A`-`F` and the
/// trailing hexadecimal marker `h`/`H`.
pub fn is_parameter_char(b: u8) -> bool {
    b.is_ascii_digit()
        || matches!(b, b'*' | b'#' | b'+' | b'-' | b'h' | b'H')
        || (b'A'..=b'F').contains(&b)
}

/// Characters that start a basic command when they directly follow `AT`.
pub fn is_basic_command_char(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'&' || b == b'\\'
}

/// Tokens that end a command-name run.
pub fn is_separator(b: u8) -> bool {
    matches!(
        b,
        AT_TOKEN_EQUAL | AT_TOKEN_QUESTIONMARK | AT_TOKEN_COMMA | AT_TOKEN_SEMICOLON
    )
}

/// Validate a command name and return its registry key.
///
/// Names are the full command string as it appears on the wire, `AT` prefix
/// included (`"AT+CSQ"`, `"ATI"`, `"AT&K3"`). They are matched
/// case-insensitively, so the key is the uppercase form.
pub fn normalize_command_name(name: &str, max_len: usize) -> ProtocolResult<String> {
    if name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }

    if name.len() > max_len {
        return Err(ProtocolError::NameTooLong {
            max: max_len,
            actual: name.len(),
        });
    }

    let key = name.to_ascii_uppercase();

    if !key.starts_with(AT_PREFIX) {
        return Err(ProtocolError::InvalidName(format!(
            "{} does not start with {}",
            name, AT_PREFIX
        )));
    }

    if let Some(bad) = key
        .bytes()
        .find(|&b| !b.is_ascii_graphic() || is_separator(b) || is_quote(b))
    {
        return Err(ProtocolError::InvalidName(format!(
            "{} contains {:?}",
            name, bad as char
        )));
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_chars() {
        for b in b"0123456789+-*#ABCDEFhH".iter() {
            assert!(is_parameter_char(*b), "{} should be a parameter char", *b as char);
        }
        for b in b"abcGxyz \"=;".iter() {
            assert!(!is_parameter_char(*b), "{} should not be a parameter char", *b as char);
        }
    }

    #[test]
    fn test_basic_command_chars() {
        assert!(is_basic_command_char(b'E'));
        assert!(is_basic_command_char(b'q'));
        assert!(is_basic_command_char(b'&'));
        assert!(is_basic_command_char(b'\\'));
        assert!(!is_basic_command_char(b'+'));
        assert!(!is_basic_command_char(b'0'));
    }

    #[test]
    fn test_normalize_uppercases() {
        assert_eq!(normalize_command_name("at+csq", 64).unwrap(), "AT+CSQ");
        assert_eq!(normalize_command_name("AT&k3", 64).unwrap(), "AT&K3");
        assert_eq!(normalize_command_name("AT", 64).unwrap(), "AT");
    }

    #[test]
    fn test_normalize_rejects() {
        assert_eq!(normalize_command_name("", 64), Err(ProtocolError::EmptyName));
        assert_eq!(
            normalize_command_name("AT+ABCDEFGH", 8),
            Err(ProtocolError::NameTooLong { max: 8, actual: 11 })
        );
        assert!(matches!(
            normalize_command_name("+CSQ", 64),
            Err(ProtocolError::InvalidName(_))
        ));
        assert!(matches!(
            normalize_command_name("AT+CSQ=", 64),
            Err(ProtocolError::InvalidName(_))
        ));
        assert!(matches!(
            normalize_command_name("AT CSQ", 64),
            Err(ProtocolError::InvalidName(_))
        ));
    }

    #[test]
    fn test_command_type_display() {
        assert_eq!(CommandType::Test.to_string(), "test");
        assert_eq!(CommandType::default(), CommandType::Action);
    }
}
