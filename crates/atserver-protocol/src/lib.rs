//! AT Command Wire Protocol
//!
//! This crate provides the stateless building blocks of the AT command server:
//! framing of the incoming byte stream into command lines, the character classes
//! used by the command parser, and the exact byte layout of every response the
//! server writes back to a device.
//!
//! # Protocol Overview
//!
//! The AT protocol is a line-based text interface:
//!
//! - **Command lines** (host → server): `AT` (any case) followed by zero or more
//!   `;`-separated sub-commands, terminated by `\r` (carriage return)
//! - **Final responses** (server → host): `\r\nOK\r\n`, `\r\nERROR\r\n`, or a custom text
//! - **Informational responses** (server → host): `\r\n<text>\r\n` for the first line
//!   of a cycle, `<text>\r\n` for the following intermediate lines
//!
//! # Command Syntax
//!
//! - **Extended**: `+NAME`, `+NAME=p1,p2`, `+NAME?`, `+NAME=?`
//! - **Basic**: one symbol from `[A-Za-z&\]` optionally followed by a number (`ATE0`, `AT&K3`)
//!
//! # Example
//!
//! ```rust
//! use atserver_protocol::{FrameEvent, LineFramer};
//!
//! let mut framer = LineFramer::new();
//! let events = framer.push(b"at+csq?\r");
//! assert_eq!(events, vec![FrameEvent::Line(b"at+csq?".to_vec())]);
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use responses::*;
