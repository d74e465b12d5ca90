//! Native WebSocket transport on a background thread.

use super::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, Transport, TransportError, TransportEvent};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::{Message, connect};
use url::Url;

/// Commands sent to the socket thread.
enum Command {
    Send(String),
    Close(u16),
}

/// WebSocket transport for native platforms.
///
/// Each [`open`](Transport::open) spawns a thread owning the socket; the
/// thread exits when the socket closes or the transport drops its channels.
pub struct NativeTransport {
    cmd_tx: Option<Sender<Command>>,
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeTransport {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }
}

impl Default for NativeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for NativeTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<Command>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, &cmd_rx, &event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        match self.cmd_tx {
            Some(ref tx) => tx
                .send(Command::Send(text.to_string()))
                .map_err(|e| TransportError::Send(e.to_string())),
            None => Err(TransportError::NotConnected),
        }
    }

    fn close(&mut self, code: u16) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Close(code));
        }
        self.event_rx = None;
        self._thread = None;
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let mut finished = false;
        if let Some(ref rx) = self.event_rx {
            loop {
                match rx.try_recv() {
                    Ok(event) => {
                        if matches!(event, TransportEvent::Closed { .. } | TransportEvent::Error(_)) {
                            finished = true;
                        }
                        events.push(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                }
            }
        }
        // The thread is gone; allow a fresh open.
        if finished {
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
        }
        events
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.close(super::CLOSE_NORMAL);
    }
}

fn run_socket(url: &str, cmd_rx: &Receiver<Command>, event_tx: &Sender<TransportEvent>) {
    log::info!("Socket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("Socket connection failed: {}", e);
            let _ = event_tx.send(TransportEvent::Error(format!("Connection failed: {}", e)));
            return;
        }
    };
    log::info!("Socket connected, status: {}", response.status());
    let _ = event_tx.send(TransportEvent::Opened);

    // Short read timeout keeps the command channel responsive.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    let close_code = loop {
        match cmd_rx.try_recv() {
            Ok(Command::Send(text)) => {
                log::debug!("Socket sending {} bytes", text.len());
                if let Err(e) = socket.send(Message::Text(text)) {
                    log::error!("Socket send error: {}", e);
                    break CLOSE_ABNORMAL;
                }
            }
            Ok(Command::Close(code)) => {
                log::info!("Socket close requested (code {})", code);
                let _ = socket.close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into(),
                }));
                let _ = socket.flush();
                return;
            }
            Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                let _ = event_tx.send(TransportEvent::Message(text));
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(frame)) => {
                log::info!("Socket received close frame");
                break frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Socket read error: {}", e);
                break CLOSE_ABNORMAL;
            }
        }
    };

    log::info!("Socket thread exiting (code {})", close_code);
    let _ = event_tx.send(TransportEvent::Closed { code: close_code });
}
