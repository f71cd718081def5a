//! Deferred handler invocation.
//!
//! The parser never calls a handler. It binds the command and pushes it on the
//! [`DispatchQueue`]; [`AtServer::run_pending`] later pops each entry and runs
//! the command's handler with full access to the server.

use std::collections::VecDeque;
use std::fmt;

use atserver_protocol::{CommandType, FinalResult};
use tracing::{debug, trace, warn};

use crate::metrics::metric_defs;
use crate::server::AtServer;
use crate::types::{CommandRef, DeviceRef};

/// What a handler is told about the command it runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The command being run.
    pub command: CommandRef,
    /// The device the command line came from.
    pub device: DeviceRef,
    /// How the command was invoked.
    pub kind: CommandType,
    /// Captured parameters, in order.
    pub parameters: Vec<String>,
}

impl Invocation {
    /// Number of captured parameters.
    pub fn param_count(&self) -> usize {
        self.parameters.len()
    }
}

/// Callback run for each dispatched command.
///
/// The handler must eventually call [`AtServer::send_final_response`] for the
/// invocation, either before returning or later from the event loop. Until it
/// does, the command stays bound and the device accepts no new line.
pub trait CommandHandler {
    fn handle(&mut self, server: &mut AtServer, invocation: Invocation);
}

impl<F> CommandHandler for F
where
    F: FnMut(&mut AtServer, Invocation),
{
    fn handle(&mut self, server: &mut AtServer, invocation: Invocation) {
        self(server, invocation)
    }
}

/// Handler attachment of one command.
#[derive(Default)]
pub(crate) enum HandlerSlot {
    #[default]
    Empty,
    Installed(Box<dyn CommandHandler>),
    /// The handler is lent out to a running dispatch.
    Running,
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerSlot::Empty => f.write_str("Empty"),
            HandlerSlot::Installed(_) => f.write_str("Installed"),
            HandlerSlot::Running => f.write_str("Running"),
        }
    }
}

impl HandlerSlot {
    pub(crate) fn is_attached(&self) -> bool {
        !matches!(self, HandlerSlot::Empty)
    }

    /// Lend the handler out for one run.
    pub(crate) fn take_for_run(&mut self) -> Option<Box<dyn CommandHandler>> {
        match std::mem::replace(self, HandlerSlot::Running) {
            HandlerSlot::Installed(handler) => Some(handler),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Give a lent handler back. If it was removed or replaced meanwhile it is dropped.
    pub(crate) fn restore(&mut self, handler: Box<dyn CommandHandler>) {
        if matches!(self, HandlerSlot::Running) {
            *self = HandlerSlot::Installed(handler);
        }
    }
}

/// One bound invocation waiting for its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDispatch {
    pub command: CommandRef,
    /// Device the command was bound to.
    pub device: DeviceRef,
    /// Invocation number at bind time.
    pub invocation: u64,
}

/// FIFO of bound commands waiting for their handler.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    entries: VecDeque<PendingDispatch>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PendingDispatch) {
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<PendingDispatch> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AtServer {
    /// Whether commands are waiting for their handler.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run the handler of every queued command, including commands queued by
    /// the handlers themselves. Returns the number of handlers invoked.
    ///
    /// Calls made from inside a handler return 0 immediately.
    pub fn run_pending(&mut self) -> usize {
        if self.dispatching {
            return 0;
        }
        self.dispatching = true;

        let mut ran = 0;
        while let Some(entry) = self.pending.pop() {
            if self.dispatch_one(entry) {
                ran += 1;
            }
        }

        self.dispatching = false;
        ran
    }

    fn dispatch_one(&mut self, pending: PendingDispatch) -> bool {
        let command = pending.command;
        let (invocation, handler, name) = match self.registry.get_mut(command) {
            Ok(entry) => {
                // The binding this entry was queued for must still be the live one.
                let live = entry.processing
                    && entry.device == Some(pending.device)
                    && entry.invocation == pending.invocation;
                if !live {
                    debug!("Skipping stale dispatch of {}", entry.name);
                    return false;
                }
                let invocation = Invocation {
                    command,
                    device: pending.device,
                    kind: entry.kind,
                    parameters: entry.params.as_slice().to_vec(),
                };
                (invocation, entry.handler.take_for_run(), entry.name.clone())
            }
            Err(_) => {
                debug!("Skipping dispatch of deleted command {}", command);
                return false;
            }
        };

        let Some(mut handler) = handler else {
            warn!("{} has no handler, answering ERROR", name);
            if let Err(e) = self.send_final_response(command, FinalResult::Error, None) {
                warn!("Failed to answer {}: {}", name, e);
            }
            return false;
        };

        trace!(
            "Dispatching {} ({}, {} params) for {}",
            name,
            invocation.kind,
            invocation.param_count(),
            invocation.device
        );
        metrics::counter!(metric_defs::COMMANDS_DISPATCHED.name).increment(1);

        handler.handle(self, invocation);

        if let Ok(entry) = self.registry.get_mut(command) {
            entry.handler.restore(handler);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotTable;

    fn noop() -> Box<dyn CommandHandler> {
        Box::new(|_: &mut AtServer, _: Invocation| {})
    }

    #[test]
    fn test_slot_lend_and_restore() {
        let mut slot = HandlerSlot::Installed(noop());
        let handler = slot.take_for_run().unwrap();
        assert!(matches!(slot, HandlerSlot::Running));
        assert!(slot.is_attached());
        slot.restore(handler);
        assert!(matches!(slot, HandlerSlot::Installed(_)));
    }

    #[test]
    fn test_slot_removed_while_running() {
        let mut slot = HandlerSlot::Installed(noop());
        let handler = slot.take_for_run().unwrap();
        slot = HandlerSlot::Empty;
        slot.restore(handler);
        assert!(matches!(slot, HandlerSlot::Empty));
    }

    #[test]
    fn test_empty_slot_lends_nothing() {
        let mut slot = HandlerSlot::Empty;
        assert!(slot.take_for_run().is_none());
        assert!(matches!(slot, HandlerSlot::Empty));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut keys = SlotTable::new();
        let a = CommandRef(keys.insert(()));
        let b = CommandRef(keys.insert(()));
        let device = DeviceRef(keys.insert(()));
        let entry = |command| PendingDispatch {
            command,
            device,
            invocation: 1,
        };

        let mut queue = DispatchQueue::new();
        queue.push(entry(a));
        queue.push(entry(b));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|e| e.command), Some(a));
        assert_eq!(queue.pop().map(|e| e.command), Some(b));
        assert!(queue.is_empty());
    }
}
