// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Async TCP connection layer with automatic reconnection.
//!
//! Provides a connection handle that manages the tether link to the vehicle
//! with automatic reconnection, address hot-reload, an outbound line queue
//! and graceful shutdown.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Default vehicle address.
pub const DEFAULT_VEHICLE_ADDRESS: &str = "192.168.1.177:5000";

/// Longest line accepted from the vehicle. Longer input is discarded up to
/// the next newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Vehicle address in "host:port" format.
    pub address: String,
    /// Delay before reconnecting after disconnect.
    pub reconnect_delay: Duration,
    /// Channel buffer size for received lines.
    pub buffer_size: usize,
    /// Outbound queue depth; frames beyond it are dropped.
    pub outbound_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_VEHICLE_ADDRESS.to_string(),
            reconnect_delay: Duration::from_secs(2),
            buffer_size: 1024,
            outbound_size: 32,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to connect.
    Connecting,
    /// Successfully connected.
    Connected,
    /// Disconnected (will attempt reconnect).
    Disconnected,
    /// Connection error occurred.
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Events emitted by the connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// Data received (one line, without the terminator).
    DataReceived(Vec<u8>),
}

/// Handle to a managed TCP connection.
///
/// The connection runs in a background task and automatically reconnects
/// on disconnect. Use `recv()` to receive events, `send_line()` to queue
/// outbound frames and `set_address()` to change the vehicle address at
/// runtime.
pub struct Connection {
    event_rx: mpsc::Receiver<ConnectionEvent>,
    outbound_tx: mpsc::Sender<String>,
    address_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawn a new connection task with the given configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_size.max(1));
        let (address_tx, address_rx) = watch::channel(config.address.clone());
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        let reconnect_delay = config.reconnect_delay;

        tokio::spawn(async move {
            connection_loop(event_tx, outbound_rx, address_rx, task_cancel, reconnect_delay).await;
        });

        Self {
            event_rx,
            outbound_tx,
            address_tx,
            cancel_token,
        }
    }

    /// Receive the next event from the connection.
    ///
    /// Returns `None` if the connection has been shut down.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Queue a line for the vehicle without waiting.
    ///
    /// Returns `false` if the queue is full or the connection is gone; the
    /// line is dropped in that case.
    pub fn send_line(&self, line: String) -> bool {
        match self.outbound_tx.try_send(line) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Change the vehicle address.
    ///
    /// The connection will disconnect and reconnect to the new address.
    pub fn set_address(&self, address: String) {
        let _ = self.address_tx.send(address);
    }

    /// Get the current vehicle address.
    #[must_use]
    pub fn current_address(&self) -> String {
        self.address_tx.borrow().clone()
    }

    /// Shut down the connection.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn connection_loop(
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut outbound_rx: mpsc::Receiver<String>,
    mut address_rx: watch::Receiver<String>,
    cancel_token: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        if cancel_token.is_cancelled() {
            info!("Connection cancelled");
            return;
        }

        let current_address = address_rx.borrow_and_update().clone();

        if event_tx
            .send(ConnectionEvent::StateChanged(ConnectionState::Connecting))
            .await
            .is_err()
        {
            return; // Receiver dropped
        }

        info!("Connecting to vehicle at {}...", current_address);

        match connect_and_process(
            &current_address,
            &event_tx,
            &mut outbound_rx,
            &mut address_rx,
            &cancel_token,
        )
        .await
        {
            Ok(reason) => match reason {
                ReconnectReason::AddressChanged => {
                    info!("Vehicle address changed, reconnecting immediately...");
                    continue;
                }
                ReconnectReason::ConnectionClosed => {
                    info!("Vehicle closed the connection");
                    let _ = event_tx
                        .send(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
                        .await;
                }
                ReconnectReason::Cancelled => {
                    info!("Connection cancelled");
                    return;
                }
            },
            Err(e) => {
                error!("Connection error: {}", e);
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Error(
                        e.to_string(),
                    )))
                    .await;
            }
        }

        warn!("Reconnecting in {} ms...", reconnect_delay.as_millis());

        // Frames queued while the link was down are stale; drain them
        while outbound_rx.try_recv().is_ok() {}

        tokio::select! {
            () = sleep(reconnect_delay) => {}
            () = cancel_token.cancelled() => {
                info!("Connection cancelled during reconnect delay");
                return;
            }
            changed = address_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                info!("Vehicle address changed during reconnect delay");
            }
        }
    }
}

enum ReconnectReason {
    AddressChanged,
    ConnectionClosed,
    Cancelled,
}

async fn connect_and_process(
    address: &str,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    outbound_rx: &mut mpsc::Receiver<String>,
    address_rx: &mut watch::Receiver<String>,
    cancel_token: &CancellationToken,
) -> Result<ReconnectReason, Box<dyn std::error::Error + Send + Sync>> {
    let stream = tokio::select! {
        result = TcpStream::connect(address) => result?,
        () = cancel_token.cancelled() => return Ok(ReconnectReason::Cancelled),
    };
    stream.set_nodelay(true)?;
    info!("Connected to {}", address);

    if event_tx
        .send(ConnectionEvent::StateChanged(ConnectionState::Connected))
        .await
        .is_err()
    {
        return Ok(ReconnectReason::Cancelled);
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = LineReader::new(read_half);

    loop {
        tokio::select! {
            line_result = lines.next_line() => {
                match line_result {
                    Ok(Some(line)) => {
                        if event_tx
                            .send(ConnectionEvent::DataReceived(line))
                            .await
                            .is_err()
                        {
                            return Ok(ReconnectReason::Cancelled);
                        }
                    }
                    Ok(None) => {
                        return Ok(ReconnectReason::ConnectionClosed);
                    }
                    Err(e) => {
                        return Err(Box::new(e));
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(mut line) = outbound else {
                    return Ok(ReconnectReason::Cancelled);
                };
                line.push('\n');
                write_half.write_all(line.as_bytes()).await?;
            }

            _ = address_rx.changed() => {
                let new_address = address_rx.borrow_and_update().clone();
                if new_address != address {
                    info!("Vehicle address changed from {} to {}", address, new_address);
                    return Ok(ReconnectReason::AddressChanged);
                }
            }

            () = cancel_token.cancelled() => {
                return Ok(ReconnectReason::Cancelled);
            }
        }
    }
}

/// Splits the inbound byte stream into lines without judging their content.
///
/// Bytes are handed on as-is so the protocol parser decides what is
/// malformed. Partial input stays buffered across calls, which makes
/// [`next_line`](Self::next_line) safe to use in `select!`.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(256),
            discarding: false,
        }
    }

    /// Next line without its `\n` or `\r\n` terminator, `None` at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            let remaining = (MAX_LINE_LEN + 1).saturating_sub(self.buf.len()) as u64;
            let read = (&mut self.reader)
                .take(remaining)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            if self.buf.last() == Some(&b'\n') {
                let mut line = std::mem::take(&mut self.buf);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                return Ok(Some(line));
            }

            if self.buf.len() > MAX_LINE_LEN {
                if !self.discarding {
                    warn!("Discarding vehicle line longer than {} bytes", MAX_LINE_LEN);
                }
                self.discarding = true;
                self.buf.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_data(connection: &mut Connection) -> String {
        loop {
            match timeout(WAIT, connection.recv()).await.unwrap().unwrap() {
                ConnectionEvent::DataReceived(data) => return String::from_utf8(data).unwrap(),
                ConnectionEvent::StateChanged(_) => {}
            }
        }
    }

    async fn wait_for_state(connection: &mut Connection, wanted: &ConnectionState) {
        loop {
            if let ConnectionEvent::StateChanged(state) =
                timeout(WAIT, connection.recv()).await.unwrap().unwrap()
            {
                if &state == wanted {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_receives_lines_and_sends_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut connection = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_millis(50),
            ..Default::default()
        });

        let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let (read_half, mut write_half) = socket.into_split();
        write_half.write_all(b"TEL,1,2,3,4,5\nACK,7\n").await.unwrap();

        wait_for_state(&mut connection, &ConnectionState::Connected).await;
        assert_eq!(next_data(&mut connection).await, "TEL,1,2,3,4,5");
        assert_eq!(next_data(&mut connection).await, "ACK,7");

        assert!(connection.send_line("CTL,0,000,50;50".to_string()));
        let mut vehicle_lines = BufReader::new(read_half).lines();
        let received = timeout(WAIT, vehicle_lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received, "CTL,0,000,50;50");

        connection.shutdown();
    }

    async fn next_bytes(connection: &mut Connection) -> Vec<u8> {
        loop {
            match timeout(WAIT, connection.recv()).await.unwrap().unwrap() {
                ConnectionEvent::DataReceived(data) => return data,
                ConnectionEvent::StateChanged(ConnectionState::Error(e)) => {
                    panic!("link dropped: {e}")
                }
                ConnectionEvent::StateChanged(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_corrupt_line_does_not_drop_link() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut connection = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_millis(50),
            ..Default::default()
        });

        let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        socket.write_all(b"TEL,1,2,3,4,\xff\nACK,1\r\n").await.unwrap();

        assert_eq!(next_bytes(&mut connection).await, b"TEL,1,2,3,4,\xff".to_vec());
        assert_eq!(next_bytes(&mut connection).await, b"ACK,1".to_vec());

        connection.shutdown();
    }

    #[tokio::test]
    async fn test_line_reader_skips_overlong_lines() {
        let mut input = vec![b'x'; MAX_LINE_LEN * 3];
        input.extend_from_slice(b"\nACK,2\nTEL,partial");
        let mut lines = LineReader::new(input.as_slice());

        assert_eq!(lines.next_line().await.unwrap(), Some(b"ACK,2".to_vec()));
        // Unterminated tail at end of stream is not a line
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_reader_keeps_line_at_limit() {
        let mut input = vec![b'7'; MAX_LINE_LEN];
        input.push(b'\n');
        let mut lines = LineReader::new(input.as_slice());

        assert_eq!(lines.next_line().await.unwrap().map(|l| l.len()), Some(MAX_LINE_LEN));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut connection = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_millis(50),
            ..Default::default()
        });

        let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        wait_for_state(&mut connection, &ConnectionState::Connected).await;
        drop(socket);
        wait_for_state(&mut connection, &ConnectionState::Disconnected).await;

        let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        socket.write_all(b"ACK,1\n").await.unwrap();
        assert_eq!(next_data(&mut connection).await, "ACK,1");
    }
}
