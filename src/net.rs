//! The acceptor: accepts TCP connections, frames the byte stream into lines
//! and shuttles complete messages to and from the shared state.

use crate::client::MessageQueueItem;
use crate::message::{Message, MESSAGE_LENGTH};
use crate::state::State;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::process;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// The longest line content kept, terminator excluded.  Bytes past the limit
/// are dropped up to the next terminator.
const MAX_LINE_LENGTH: usize = MESSAGE_LENGTH - 2;

/// Accumulates received bytes and splits them into lines.
///
/// Messages end with `\r\n`; a lone `\n` is accepted too.  A partial line
/// stays in the buffer until the rest of it arrives.
pub(crate) struct LineBuffer {
    buf: BytesMut,
    line_len: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            line_len: 0,
            discarding: false,
        }
    }

    /// Appends received bytes to the buffer.
    ///
    /// A line that exceeds `MAX_LINE_LENGTH` is terminated at the limit and
    /// the rest of its bytes are dropped.
    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.discarding {
                if b == b'\n' {
                    self.discarding = false;
                }
            } else if b == b'\n' {
                self.buf.put_u8(b);
                self.line_len = 0;
            } else if self.line_len < MAX_LINE_LENGTH {
                self.buf.put_u8(b);
                self.line_len += 1;
            } else {
                self.buf.put_u8(b'\n');
                self.line_len = 0;
                self.discarding = true;
            }
        }
    }

    /// Removes and returns the next complete line, without its terminator.
    ///
    /// Returns `None` when no complete line is buffered.  Invalid UTF-8 is
    /// replaced rather than refused.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Listens on the given address, accepts and handles incoming connections.
///
/// Exits the process when the address cannot be bound.
pub async fn listen(addr: SocketAddr, shared: State) {
    let listener = TcpListener::bind(addr).await.unwrap_or_else(|err| {
        log::error!("Failed to bind to {}: {}", addr, err);
        process::exit(1);
    });
    log::info!("Listening on {} for connections...", addr);

    loop {
        match listener.accept().await {
            Ok((conn, peer_addr)) => {
                tokio::spawn(handle(conn, peer_addr, shared.clone()));
            }
            Err(err) => log::debug!("Failed to accept connection: {}", err),
        }
    }
}

/// Handles one IRC connection.
async fn handle(conn: TcpStream, peer_addr: SocketAddr, shared: State) {
    let (mut reader, writer) = conn.into_split();
    let (msg_queue, outgoing_msgs) = mpsc::unbounded_channel();
    let id = shared.peer_joined(peer_addr.ip().to_string(), msg_queue).await;

    tokio::spawn(write_outgoing(writer, outgoing_msgs));

    let mut lines = LineBuffer::new();
    let mut read_buf = [0u8; MESSAGE_LENGTH];
    let err = loop {
        let n = match reader.read(&mut read_buf).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(err) => break Some(err),
        };
        lines.extend(&read_buf[..n]);
        while let Some(line) = lines.next_line() {
            if let Some(msg) = Message::parse(&line) {
                if !shared.handle_message(id, msg).await {
                    // The state already removed the client; what remains of
                    // its input is discarded.
                    return;
                }
            }
        }
    };
    shared.peer_quit(id, err).await;
}

/// Forwards messages from the client's queue to its socket.
///
/// The task ends when the queue closes, i.e. when the client is removed from
/// the state, after its pending replies were written out.
async fn write_outgoing(mut writer: OwnedWriteHalf,
                        mut outgoing_msgs: mpsc::UnboundedReceiver<MessageQueueItem>)
{
    while let Some(msg) = outgoing_msgs.recv().await {
        let bytes: &[u8] = msg.as_ref();
        if writer.write_all(bytes).await.is_err() {
            break;
        }
    }
}
