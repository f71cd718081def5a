//! Demonstration command set.
//!
//! A handful of modem-style commands, enough to exercise every path of the
//! server from a terminal:
//!
//! | Command | Behaviour |
//! |---|---|
//! | `AT` | `OK` |
//! | `ATI` | identification line, `OK` |
//! | `AT+CGMI` | manufacturer line, `OK` |
//! | `AT+CSQ` | `+CSQ: 15,99` on read/action, ranges on test, `ERROR` with parameters |
//! | `ATE<n>` | echo setting, `0` or `1` |
//! | `AT&K<n>`, `AT&K3` | flow control; `AT&K3` is its own command |
//! | `AT+ECHO=<p>,...` | repeats its parameters |
//! | `AT+UNSOL=<text>` | broadcasts `text` as an unsolicited response |

use std::cell::RefCell;
use std::rc::Rc;

use atserver::{AtResult, AtServer, AvailableDevice, ClientId, CommandRef, CommandType, FinalResult, Invocation};
use tracing::{debug, warn};

/// Identification text returned by `ATI`.
pub const IDENTIFICATION: &str = concat!("atserver ", env!("CARGO_PKG_VERSION"));

/// Manufacturer text returned by `AT+CGMI`.
pub const MANUFACTURER: &str = "ATSERVER";

/// Settings the demo commands read and change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSettings {
    /// `ATE` value.
    pub echo: bool,
    /// `AT&K` value.
    pub flow_control: u8,
}

impl Default for DemoSettings {
    fn default() -> Self {
        DemoSettings {
            echo: true,
            flow_control: 3,
        }
    }
}

/// Shared view of the demo settings.
pub type SharedSettings = Rc<RefCell<DemoSettings>>;

fn answer(server: &mut AtServer, command: CommandRef, result: FinalResult) {
    if let Err(e) = server.send_final_response(command, result, None) {
        warn!("Failed to answer command: {}", e);
    }
}

fn reply(server: &mut AtServer, command: CommandRef, text: &str) {
    if let Err(e) = server.send_intermediate_response(command, text) {
        warn!("Failed to send response: {}", e);
    }
}

fn add<H>(server: &mut AtServer, owner: ClientId, name: &str, handler: H) -> AtResult<CommandRef>
where
    H: FnMut(&mut AtServer, Invocation) + 'static,
{
    let command = server.create_command(owner, name)?;
    server.add_command_handler(command, handler)?;
    debug!("Registered demo command {}", name);
    Ok(command)
}

/// Register the demo commands under `owner`.
pub fn register_demo_commands(server: &mut AtServer, owner: ClientId) -> AtResult<SharedSettings> {
    let settings: SharedSettings = Rc::new(RefCell::new(DemoSettings::default()));

    add(server, owner, "AT", |server, inv| {
        answer(server, inv.command, FinalResult::Ok)
    })?;

    add(server, owner, "ATI", |server, inv| {
        reply(server, inv.command, IDENTIFICATION);
        answer(server, inv.command, FinalResult::Ok);
    })?;

    add(server, owner, "AT+CGMI", |server, inv| {
        if inv.kind == CommandType::Test {
            answer(server, inv.command, FinalResult::Ok);
            return;
        }
        reply(server, inv.command, MANUFACTURER);
        answer(server, inv.command, FinalResult::Ok);
    })?;

    add(server, owner, "AT+CSQ", |server, inv| match inv.kind {
        CommandType::Read | CommandType::Action => {
            reply(server, inv.command, "+CSQ: 15,99");
            answer(server, inv.command, FinalResult::Ok);
        }
        CommandType::Test => {
            reply(server, inv.command, "+CSQ: (0-31,99),(0-7,99)");
            answer(server, inv.command, FinalResult::Ok);
        }
        CommandType::Parameter => answer(server, inv.command, FinalResult::Error),
    })?;

    let echo = settings.clone();
    add(server, owner, "ATE", move |server, inv| {
        let value = match inv.parameters.first().map(String::as_str) {
            None | Some("") | Some("0") => Some(false),
            Some("1") => Some(true),
            Some(_) => None,
        };
        match value {
            Some(value) => {
                echo.borrow_mut().echo = value;
                answer(server, inv.command, FinalResult::Ok);
            }
            None => answer(server, inv.command, FinalResult::Error),
        }
    })?;

    let flow = settings.clone();
    add(server, owner, "AT&K", move |server, inv| {
        let value = match inv.parameters.first().map(String::as_str) {
            None | Some("") => Some(0),
            Some(text) => text.parse::<u8>().ok().filter(|v| *v <= 4),
        };
        match value {
            Some(value) => {
                flow.borrow_mut().flow_control = value;
                answer(server, inv.command, FinalResult::Ok);
            }
            None => answer(server, inv.command, FinalResult::Error),
        }
    })?;

    let flow = settings.clone();
    add(server, owner, "AT&K3", move |server, inv| {
        flow.borrow_mut().flow_control = 3;
        answer(server, inv.command, FinalResult::Ok);
    })?;

    add(server, owner, "AT+ECHO", |server, inv| match inv.kind {
        CommandType::Parameter => {
            let text = format!("+ECHO: {}", inv.parameters.join(","));
            reply(server, inv.command, &text);
            answer(server, inv.command, FinalResult::Ok);
        }
        CommandType::Test => {
            reply(server, inv.command, "+ECHO: (text)");
            answer(server, inv.command, FinalResult::Ok);
        }
        _ => answer(server, inv.command, FinalResult::Error),
    })?;

    add(server, owner, "AT+UNSOL", |server, inv| {
        let Some(text) = inv.parameters.first().filter(|t| !t.is_empty()).cloned() else {
            answer(server, inv.command, FinalResult::Error);
            return;
        };
        // Queued on this device until the OK below has gone out.
        if let Err(e) = server.send_unsolicited_response(&text, AvailableDevice::AllDevices) {
            warn!("Broadcast incomplete: {}", e);
        }
        answer(server, inv.command, FinalResult::Ok);
    })?;

    Ok(settings)
}
