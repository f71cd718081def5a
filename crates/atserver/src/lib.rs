//! AT Command Server
//!
//! Serves the AT command protocol over any number of byte-stream devices.
//! Incoming bytes are framed into `AT...<CR>` lines, each line is resolved into
//! one or more registered commands, and each command's handler answers with
//! intermediate, final and unsolicited responses that the server sequences
//! back onto the device.
//!
//! # Architecture
//!
//! - [`CommandRegistry`]: registered commands, keyed by uppercase name
//! - [`CommandParser`]: per-device table-driven parser, one sub-command per step
//! - [`DeviceSession`]: per-device framer, parser, response state and unsolicited queue
//! - [`DispatchQueue`]: resolved commands waiting for their handler
//! - [`AtServer`]: owns all of the above and exposes the handle-based API
//!
//! Everything runs on one thread. The parser only binds commands; their
//! handlers run later from [`AtServer::run_pending`], and a command cannot be
//! bound again until its handler sends the final response.
//!
//! # Example
//!
//! ```rust
//! use atserver::{AtServer, ClientId, FinalResult, Invocation, LoopbackDevice};
//!
//! let mut server = AtServer::default();
//! let csq = server.create_command(ClientId(1), "AT+CSQ").unwrap();
//! server
//!     .add_command_handler(csq, |server: &mut AtServer, inv: Invocation| {
//!         server.send_intermediate_response(inv.command, "+CSQ: 15,99").unwrap();
//!         server.send_final_response(inv.command, FinalResult::Ok, None).unwrap();
//!     })
//!     .unwrap();
//!
//! let (device, handle) = LoopbackDevice::new();
//! let dev = server.open(ClientId(1), Box::new(device)).unwrap();
//!
//! handle.feed(b"AT+CSQ?\r");
//! server.on_readable(dev).unwrap();
//! server.run_pending();
//!
//! assert_eq!(handle.take_output_string(), "\r\n+CSQ: 15,99\r\n\r\nOK\r\n");
//! ```

mod config;
mod dispatch;
mod error;
pub mod loopback;
pub mod metrics;
mod parser;
mod pool;
mod registry;
mod response;
mod server;
mod session;
mod slots;
mod types;

pub use config::ServerConfig;
pub use dispatch::{CommandHandler, DispatchQueue, Invocation, PendingDispatch};
pub use error::{AtError, AtResult};
pub use loopback::{LoopbackDevice, LoopbackHandle};
pub use parser::{transition, CommandParser, ParseAction, ParseOutcome, ParserState};
pub use pool::{ParameterList, ResponseQueue};
pub use registry::{CommandRegistry, RegisteredCommand};
pub use server::AtServer;
pub use session::{DeviceIo, DeviceSession};
pub use slots::{SlotKey, SlotTable};
pub use types::{AvailableDevice, ClientId, CommandRef, DeviceRef};

pub use atserver_protocol::{CommandType, FinalResult};
