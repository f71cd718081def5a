//! TCP front end.
//!
//! Every accepted connection becomes one device session. Socket I/O runs in
//! per-connection tasks; the [`AtServer`] itself lives on the task that calls
//! [`TcpAtServer::run_until`] and is only touched from there.
//!
//! ```text
//! reader task ──bytes──► inbox ──LoopEvent::Readable──► event loop ──► AtServer
//! writer task ◄──────────────── outbox ◄──────────────── TcpDevice::write
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atserver::{AtServer, AvailableDevice, ClientId, DeviceIo, DeviceRef};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::RunnerResult;

/// Owner of the commands registered before the loop starts.
pub const SERVER_CLIENT: ClientId = ClientId(0);

const READ_BUFFER_SIZE: usize = 1024;

/// Connections accepted since start.
pub const CONNECTIONS_ACCEPTED: &str = "atserver.runner.connections_accepted";

// ============================================================================
// Types
// ============================================================================

/// Notifications from connection tasks to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEvent {
    /// New bytes are waiting in the connection's inbox.
    Readable(u64),
    /// The peer closed the connection or reading failed.
    Disconnected(u64),
}

/// Device backed by one TCP connection.
///
/// Reads drain the inbox filled by the reader task; writes are handed to the
/// writer task. The reader leaves the socket alone while monitoring is off.
pub struct TcpDevice {
    connection: u64,
    inbox: Arc<Mutex<VecDeque<u8>>>,
    outbox: Option<mpsc::UnboundedSender<Vec<u8>>>,
    monitored: watch::Sender<bool>,
    events: mpsc::UnboundedSender<LoopEvent>,
    reader: JoinHandle<()>,
}

impl TcpDevice {
    fn spawn(stream: TcpStream, connection: u64, events: mpsc::UnboundedSender<LoopEvent>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let (monitored, monitored_rx) = watch::channel(true);

        let reader = tokio::spawn(read_connection(
            read_half,
            connection,
            inbox.clone(),
            monitored_rx,
            events.clone(),
        ));
        tokio::spawn(write_connection(write_half, connection, outbox_rx));

        TcpDevice {
            connection,
            inbox,
            outbox: Some(outbox),
            monitored,
            events,
            reader,
        }
    }
}

impl DeviceIo for TcpDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.lock();
        let n = buf.len().min(inbox.len());
        for (slot, byte) in buf.iter_mut().zip(inbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let outbox = self
            .outbox
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device closed"))?;
        outbox
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection writer gone"))
    }

    fn add_monitoring(&mut self) -> io::Result<()> {
        self.monitored.send_replace(true);
        // Bytes read before the pause produced no event the server acted on.
        if !self.inbox.lock().is_empty() {
            self.events
                .send(LoopEvent::Readable(self.connection))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event loop gone"))?;
        }
        Ok(())
    }

    fn remove_monitoring(&mut self) -> io::Result<()> {
        self.monitored.send_replace(false);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader.abort();
        // Dropping the sender lets the writer flush and shut the socket down.
        self.outbox.take();
        Ok(())
    }
}

impl Drop for TcpDevice {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_connection(
    mut reader: OwnedReadHalf,
    connection: u64,
    inbox: Arc<Mutex<VecDeque<u8>>>,
    mut monitored: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        // Unread input stays in the socket while the session is suspended.
        if monitored.wait_for(|on| *on).await.is_err() {
            return;
        }
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                inbox.lock().extend(&buf[..n]);
                if events.send(LoopEvent::Readable(connection)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Read error on connection {}: {}", connection, e);
                break;
            }
        }
    }
    let _ = events.send(LoopEvent::Disconnected(connection));
}

async fn write_connection(
    mut writer: OwnedWriteHalf,
    connection: u64,
    mut outbox: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(data) = outbox.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            warn!("Write error on connection {}: {}", connection, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[derive(Debug)]
struct Connection {
    device: DeviceRef,
    peer: SocketAddr,
}

/// Event loop state: the server and the live connections.
struct EventLoop {
    server: AtServer,
    connections: HashMap<u64, Connection>,
    next_connection: u64,
    banner: String,
    ticks: u64,
}

impl EventLoop {
    fn client(connection: u64) -> ClientId {
        ClientId(connection)
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr, events: &mpsc::UnboundedSender<LoopEvent>) {
        let connection = self.next_connection;
        self.next_connection += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", peer, e);
        }

        let device = TcpDevice::spawn(stream, connection, events.clone());
        let device = match self.server.open(Self::client(connection), Box::new(device)) {
            Ok(device) => device,
            Err(e) => {
                // Dropping the device stops both connection tasks.
                warn!("Refusing connection from {}: {}", peer, e);
                return;
            }
        };

        metrics::counter!(CONNECTIONS_ACCEPTED).increment(1);
        info!("Connection {} from {} on {}", connection, peer, device);
        self.connections.insert(connection, Connection { device, peer });

        if !self.banner.is_empty() {
            if let Err(e) = self
                .server
                .send_unsolicited_response(&self.banner, AvailableDevice::Specific(device))
            {
                warn!("Banner not sent to {}: {}", peer, e);
            }
        }
    }

    fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Readable(connection) => {
                let Some(conn) = self.connections.get(&connection) else {
                    return;
                };
                if let Err(e) = self.server.on_readable(conn.device) {
                    error!("Connection {}: {}", connection, e);
                }
                self.server.run_pending();
            }
            LoopEvent::Disconnected(connection) => self.disconnect(connection),
        }
    }

    fn disconnect(&mut self, connection: u64) {
        let Some(conn) = self.connections.remove(&connection) else {
            return;
        };
        info!("Connection {} from {} closed", connection, conn.peer);
        if let Err(e) = self.server.close_client(Self::client(connection)) {
            warn!("Teardown of connection {} incomplete: {}", connection, e);
        }
    }

    fn tick(&mut self) {
        self.ticks += 1;
        let text = format!("+TICK: {}", self.ticks);
        if let Err(e) = self
            .server
            .send_unsolicited_response(&text, AvailableDevice::AllDevices)
        {
            debug!("Tick not delivered everywhere: {}", e);
        }
    }

    fn shutdown(&mut self) {
        let connections: Vec<u64> = self.connections.keys().copied().collect();
        for connection in connections {
            self.disconnect(connection);
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ============================================================================
// Server
// ============================================================================

/// AT command server listening on a TCP socket.
pub struct TcpAtServer {
    listener: TcpListener,
    server: AtServer,
    config: RunnerConfig,
}

impl TcpAtServer {
    /// Bind the listener and build the server from `config`.
    pub async fn bind(config: RunnerConfig) -> RunnerResult<Self> {
        let server = AtServer::new(config.server.clone())?;
        let listener = TcpListener::bind(&config.listen).await?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(TcpAtServer {
            listener,
            server,
            config,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The server, for registering commands before the loop starts.
    pub fn server_mut(&mut self) -> &mut AtServer {
        &mut self.server
    }

    /// Serve connections until `shutdown` completes, then close every session.
    pub async fn run_until<F>(self, shutdown: F) -> RunnerResult<()>
    where
        F: Future<Output = ()>,
    {
        let TcpAtServer {
            listener,
            server,
            config,
        } = self;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut ticker = config
            .unsolicited_interval_secs
            .filter(|secs| *secs > 0)
            .map(|secs| {
                let period = Duration::from_secs(secs);
                tokio::time::interval_at(tokio::time::Instant::now() + period, period)
            });

        let mut event_loop = EventLoop {
            server,
            connections: HashMap::new(),
            next_connection: SERVER_CLIENT.0 + 1,
            banner: config.banner,
            ticks: 0,
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => event_loop.accept(stream, peer, &events_tx),
                    Err(e) => warn!("Accept failed: {}", e),
                },
                Some(event) = events_rx.recv() => event_loop.handle(event),
                _ = next_tick(&mut ticker) => event_loop.tick(),
            }
        }

        event_loop.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_device_reads_inbox() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let (events, _events_rx) = mpsc::unbounded_channel();
        let mut device = TcpDevice::spawn(stream, 1, events);
        device.inbox.lock().extend(b"ATI\r");

        let mut buf = [0u8; 3];
        assert_eq!(device.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"ATI");
        assert_eq!(device.read(&mut buf).unwrap(), 1);
        assert_eq!(device.read(&mut buf).unwrap(), 0);

        device.close().unwrap();
        assert!(device.write(b"x").is_err());
        drop(client);
    }

    #[tokio::test]
    async fn test_tcp_device_pauses_reading_while_unmonitored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let (events, mut events_rx) = mpsc::unbounded_channel();
        let mut device = TcpDevice::spawn(stream, 7, events);
        // The reader task has not been polled yet on this single-threaded runtime.
        device.remove_monitoring().unwrap();

        client.write_all(b"AT\r").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(device.inbox.lock().is_empty());
        assert!(events_rx.try_recv().is_err());

        device.add_monitoring().unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(LoopEvent::Readable(7)));
        assert_eq!(device.inbox.lock().len(), 3);

        // Resuming with input already buffered reports it at once.
        device.remove_monitoring().unwrap();
        device.add_monitoring().unwrap();
        assert_eq!(events_rx.try_recv().ok(), Some(LoopEvent::Readable(7)));

        device.close().unwrap();
    }
}
