//! Protocol constants: token bytes, default bounds and fixed wire forms.

// ============================================================================
// Tokens
// ============================================================================

/// Carriage return, the line terminator.
pub const AT_TOKEN_CR: u8 = 0x0D;

/// Starts the parameter list of an extended command.
pub const AT_TOKEN_EQUAL: u8 = b'=';

/// Marks a read (`?`) or, after `=`, a test (`=?`) command.
pub const AT_TOKEN_QUESTIONMARK: u8 = b'?';

/// Separates parameters.
pub const AT_TOKEN_COMMA: u8 = b',';

/// Separates sub-commands on one line.
pub const AT_TOKEN_SEMICOLON: u8 = b';';

/// Delimits a quoted parameter region.
pub const AT_TOKEN_QUOTE: u8 = b'"';

/// Every command line and every registered command name starts with this prefix.
pub const AT_PREFIX: &str = "AT";

// ============================================================================
// Default bounds
// ============================================================================

/// Maximum buffered line length (`AT` prefix included, CR excluded).
pub const MAX_LINE_LENGTH: usize = 512;

/// Maximum length of a registered command name.
pub const MAX_COMMAND_NAME_LENGTH: usize = 64;

/// Maximum length of a single captured parameter.
pub const MAX_PARAMETER_LENGTH: usize = 128;

/// Maximum length of a response text.
pub const MAX_RESPONSE_LENGTH: usize = 512;

/// Shortest basic-command candidate tried by the longest-prefix lookup: `AT` plus one symbol.
pub const MIN_BASIC_CANDIDATE_LENGTH: usize = 3;

// ============================================================================
// Wire forms
// ============================================================================

/// Line break framing every response.
pub const CRLF: &[u8] = b"\r\n";

/// Default successful final response.
pub const OK_RESPONSE: &[u8] = b"\r\nOK\r\n";

/// Default failed final response.
pub const ERROR_RESPONSE: &[u8] = b"\r\nERROR\r\n";
