//! # Connection Registry Module
//!
//! Owns the TCP links to scanner stations and forwards what they send to subscribers.
//!
//! At most one link is active at a time. Connecting to a station tears down the active link
//! first, so the previous connection is always `disconnected` before the new one reaches
//! `connected`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   bytes   ┌──────────────┐  ConnectionEvent  ┌─────────────┐
//! │ Scanner     │──────────▶│ reader task  │──────────────────▶│ subscribers │
//! │ station     │           │ FrameDecoder │   (unbounded mpsc) └─────────────┘
//! │             │◀──────────│ write half   │◀── send(id, payload)
//! └─────────────┘  command  └──────────────┘
//! ```
//!
//! Records of past connections stay in the registry with their final status so operators
//! can see why a link went away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::decoder::{normalize_command, FrameDecoder};
use super::types::{Connection, ConnectionEvent, ConnectionStatus, ScanFrame};
use crate::error_handling::types::ConnectionError;

const READ_BUFFER_SIZE: usize = 16 * 1024;
const PREVIEW_LEN: usize = 64;

type SharedConnections = Arc<Mutex<HashMap<Uuid, Connection>>>;
type Subscribers = Arc<Mutex<Vec<UnboundedSender<ConnectionEvent>>>>;

/// The link that is currently allowed to send.
struct ActiveLink {
    id: Uuid,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Drop for ActiveLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Registry of scanner connections enforcing a single active link.
///
/// # Fields Overview
///
/// - `connections`: status records of every connection opened so far
/// - `active`: write half and reader task of the active link, if any
/// - `subscribers`: receivers of decoded events
/// - `connect_timeout`: upper bound on a single connect attempt
pub struct ConnectionRegistry {
    connections: SharedConnections,
    active: Option<ActiveLink>,
    subscribers: Subscribers,
    connect_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            active: None,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            connect_timeout,
        }
    }

    /// Registers a new subscriber. Events for one connection arrive in socket read order.
    pub fn subscribe(&self) -> UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Opens a link to `host:port`, releasing the active link first.
    ///
    /// # Errors
    ///
    /// * `ConnectionError::Refused` if the socket cannot be opened
    /// * `ConnectionError::Timeout` if the attempt outlives the configured timeout
    ///
    /// The failed connection keeps an `error` record. No retry is attempted.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<Uuid, ConnectionError> {
        self.release_active();

        let id = Uuid::new_v4();
        let addr = format!("{}:{}", host, port);
        lock(&self.connections).insert(id, Connection::new(id, host, port));
        debug!("[{}] connecting to {}", id, addr);

        let stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    set_status(&self.connections, id, ConnectionStatus::Error);
                    return Err(ConnectionError::Refused { addr, source });
                }
                Err(_) => {
                    set_status(&self.connections, id, ConnectionStatus::Error);
                    return Err(ConnectionError::Timeout {
                        addr,
                        after: self.connect_timeout,
                    });
                }
            };

        let (read_half, writer) = stream.into_split();
        update(&self.connections, id, |conn| {
            conn.status = ConnectionStatus::Connected;
            conn.last_connected = Some(Utc::now());
        });

        let reader = tokio::spawn(pump_frames(
            id,
            read_half,
            Arc::clone(&self.connections),
            Arc::clone(&self.subscribers),
        ));
        self.active = Some(ActiveLink { id, writer, reader });
        info!("[{}] connected to {}", id, addr);
        Ok(id)
    }

    /// Writes an operator command to the active link, terminated with CRLF.
    pub async fn send(&mut self, id: Uuid, payload: &str) -> Result<(), ConnectionError> {
        if self.status(id) != Some(ConnectionStatus::Connected) {
            return Err(ConnectionError::NotConnected(id));
        }
        let link = match self.active.as_mut() {
            Some(link) if link.id == id => link,
            _ => return Err(ConnectionError::NotConnected(id)),
        };

        let line = normalize_command(payload);
        trace!("[{}] sending {:?}", id, line);
        if let Err(e) = link.writer.write_all(line.as_bytes()).await {
            warn!("[{}] write failed: {}", id, e);
            set_status(&self.connections, id, ConnectionStatus::Error);
            return Err(ConnectionError::Write(e));
        }
        Ok(())
    }

    /// Releases the link `id` if it is the active one.
    ///
    /// Returns whether a socket was released. Never waits on the remote end.
    pub fn disconnect(&mut self, id: Uuid) -> bool {
        match &self.active {
            Some(link) if link.id == id => {
                self.release_active();
                true
            }
            _ => false,
        }
    }

    fn release_active(&mut self) {
        if let Some(link) = self.active.take() {
            let id = link.id;
            drop(link);
            update(&self.connections, id, |conn| {
                if conn.status != ConnectionStatus::Error {
                    conn.status = ConnectionStatus::Disconnected;
                }
            });
            info!("[{}] link released", id);
        }
    }

    pub fn connection(&self, id: Uuid) -> Option<Connection> {
        lock(&self.connections).get(&id).cloned()
    }

    /// Snapshot of every known connection record.
    pub fn connections(&self) -> Vec<Connection> {
        let mut all: Vec<Connection> = lock(&self.connections).values().cloned().collect();
        all.sort_by_key(|conn| conn.last_connected);
        all
    }

    /// Id of the active link, as long as it is still connected.
    pub fn active_id(&self) -> Option<Uuid> {
        let id = self.active.as_ref()?.id;
        (self.status(id) == Some(ConnectionStatus::Connected)).then_some(id)
    }

    fn status(&self, id: Uuid) -> Option<ConnectionStatus> {
        lock(&self.connections).get(&id).map(|conn| conn.status)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn update(connections: &SharedConnections, id: Uuid, f: impl FnOnce(&mut Connection)) {
    if let Some(conn) = lock(connections).get_mut(&id) {
        f(conn);
    }
}

fn set_status(connections: &SharedConnections, id: Uuid, status: ConnectionStatus) {
    update(connections, id, |conn| conn.status = status);
}

fn publish(subscribers: &Subscribers, event: ConnectionEvent) {
    lock(subscribers).retain(|tx| tx.send(event.clone()).is_ok());
}

/// Reads one connection until it closes, decoding frames and publishing them in order.
///
/// End of stream, an in-band disconnect sentinel and read errors all end with a single
/// `ConnectionEvent::Disconnected`.
pub(crate) async fn pump_frames<R>(
    connection_id: Uuid,
    mut reader: R,
    connections: SharedConnections,
    subscribers: Subscribers,
) where
    R: AsyncRead + Unpin,
{
    trace!("[{}] reader task started", connection_id);
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let final_status = 'read: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                trace!("[{}] EOF from scanner", connection_id);
                break ConnectionStatus::Disconnected;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("[{}] read failed: {}", connection_id, e);
                break ConnectionStatus::Error;
            }
        };

        let preview = &buf[..n.min(PREVIEW_LEN)];
        trace!(
            "[{}] read {} bytes: {}{}",
            connection_id,
            n,
            String::from_utf8_lossy(preview),
            if n > PREVIEW_LEN { " ..." } else { "" }
        );

        for frame in decoder.push(&buf[..n]) {
            match frame {
                ScanFrame::Scan(scan) => {
                    update(&connections, connection_id, |conn| conn.message_count += 1);
                    publish(
                        &subscribers,
                        ConnectionEvent::Scan {
                            connection_id,
                            scan,
                            received_at: Utc::now(),
                        },
                    );
                }
                ScanFrame::Disconnected => break 'read ConnectionStatus::Disconnected,
            }
        }
    };

    set_status(&connections, connection_id, final_status);
    publish(&subscribers, ConnectionEvent::Disconnected { connection_id });
    info!("[{}] scanner connection closed", connection_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    const SCAN: &[u8] = b"{\"codes\":[{\"content\":\"A1\"}]}\r\n";

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_secs(2))
    }

    fn content(event: &ConnectionEvent) -> String {
        match event {
            ConnectionEvent::Scan { scan, .. } => scan.codes[0].content.clone(),
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_forwards_scans_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (listener, port) = listener().await;
        let mut registry = registry();
        let mut events = registry.subscribe();

        let id = registry.connect("127.0.0.1", port).await.unwrap();
        let (mut station, _) = listener.accept().await.unwrap();
        assert_eq!(
            registry.connection(id).unwrap().status,
            ConnectionStatus::Connected
        );
        assert_eq!(registry.active_id(), Some(id));

        station
            .write_all(b"{\"codes\":[{\"content\":\"1\"}]}\r\n{\"codes\":[{\"con")
            .await
            .unwrap();
        station
            .write_all(b"tent\":\"2\"}]}\r\n{\"codes\":[{\"content\":\"3\"}]}\r\n")
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let event = events.recv().await.unwrap();
            assert_eq!(event.connection_id(), id);
            seen.push(content(&event));
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
        assert_eq!(registry.connection(id).unwrap().message_count, 3);
    }

    #[tokio::test]
    async fn connecting_again_releases_previous_link_first() {
        let (listener_a, port_a) = listener().await;
        let (listener_b, port_b) = listener().await;
        let mut registry = registry();

        let a = registry.connect("127.0.0.1", port_a).await.unwrap();
        let (mut station_a, _) = listener_a.accept().await.unwrap();

        let b = registry.connect("127.0.0.1", port_b).await.unwrap();
        let _station_b = listener_b.accept().await.unwrap();

        assert_eq!(
            registry.connection(a).unwrap().status,
            ConnectionStatus::Disconnected
        );
        assert_eq!(
            registry.connection(b).unwrap().status,
            ConnectionStatus::Connected
        );
        assert_eq!(registry.active_id(), Some(b));
        assert!(matches!(
            registry.send(a, "ping").await,
            Err(ConnectionError::NotConnected(_))
        ));

        // the released socket is closed on the station side
        let mut buf = [0u8; 8];
        assert_eq!(station_a.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn send_appends_crlf() {
        let (listener, port) = listener().await;
        let mut registry = registry();
        let id = registry.connect("127.0.0.1", port).await.unwrap();
        let (mut station, _) = listener.accept().await.unwrap();

        registry.send(id, "||>trigger on\n").await.unwrap();
        let mut buf = [0u8; 32];
        let n = station.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"||>trigger on\r\n");
    }

    #[tokio::test]
    async fn send_to_unknown_connection_fails() {
        let mut registry = registry();
        let err = registry.send(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected(_)));
    }

    #[tokio::test]
    async fn refused_connect_leaves_error_record() {
        let (listener, port) = listener().await;
        drop(listener);
        let mut registry = registry();

        let err = registry.connect("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Refused { .. }));
        let records = registry.connections();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ConnectionStatus::Error);
        assert!(registry.active_id().is_none());
    }

    #[tokio::test]
    async fn remote_close_emits_disconnected_event() {
        let (listener, port) = listener().await;
        let mut registry = registry();
        let mut events = registry.subscribe();
        let id = registry.connect("127.0.0.1", port).await.unwrap();
        let (mut station, _) = listener.accept().await.unwrap();

        station.write_all(SCAN).await.unwrap();
        drop(station);

        assert_eq!(content(&events.recv().await.unwrap()), "A1");
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Disconnected { connection_id: id }
        );
        assert_eq!(
            registry.connection(id).unwrap().status,
            ConnectionStatus::Disconnected
        );
        assert!(registry.active_id().is_none());
    }

    #[tokio::test]
    async fn explicit_disconnect_is_best_effort() {
        let (listener, port) = listener().await;
        let mut registry = registry();
        let id = registry.connect("127.0.0.1", port).await.unwrap();
        let _station = listener.accept().await.unwrap();

        assert!(registry.disconnect(id));
        assert!(!registry.disconnect(id));
        assert_eq!(
            registry.connection(id).unwrap().status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn pump_decodes_fragmented_mock_stream() {
        let id = Uuid::new_v4();
        let connections: SharedConnections = Arc::new(Mutex::new(HashMap::new()));
        lock(&connections).insert(id, Connection::new(id, "mock", 23));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&subscribers).push(tx);

        let mock = Builder::new()
            .read(b"{\"codes\":[{\"content\":\"A")
            .read(b"1\"}]}\r\nnot json\r\n{\"image\":{\"name\":\"cam\",\"trigger\":{\"index\":7}}}")
            .read(b"\r\n")
            .build();
        pump_frames(id, mock, Arc::clone(&connections), subscribers).await;

        assert_eq!(content(&rx.recv().await.unwrap()), "A1");
        match rx.recv().await.unwrap() {
            ConnectionEvent::Scan { scan, .. } => {
                assert!(scan.codes.is_empty());
                assert_eq!(scan.image.unwrap().index, 7);
            }
            other => panic!("expected image trigger, got {:?}", other),
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            ConnectionEvent::Disconnected { connection_id: id }
        );
        let record = lock(&connections).get(&id).cloned().unwrap();
        assert_eq!(record.message_count, 2);
        assert_eq!(record.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn pump_marks_read_error() {
        let id = Uuid::new_v4();
        let connections: SharedConnections = Arc::new(Mutex::new(HashMap::new()));
        lock(&connections).insert(id, Connection::new(id, "mock", 23));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&subscribers).push(tx);

        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        pump_frames(id, mock, Arc::clone(&connections), subscribers).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ConnectionEvent::Disconnected { connection_id: id }
        );
        assert_eq!(
            lock(&connections).get(&id).unwrap().status,
            ConnectionStatus::Error
        );
    }
}
