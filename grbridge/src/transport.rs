use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{header, Client, Method};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use grbcore::{error::HostError, handle::ConnectionHandle};

use crate::registry::Registry;

const UPLOAD_PACK_REQUEST: &str = "application/x-git-upload-pack-request";
const RECEIVE_PACK_REQUEST: &str = "application/x-git-receive-pack-request";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown connection handle `{0}`")]
    UnknownConnection(ConnectionHandle),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<TransportError> for HostError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::UnknownConnection(handle) => HostError::UnknownConnection(handle.0),
            TransportError::Request(e) => HostError::Transport(e.to_string()),
        }
    }
}

enum ConnectionState {
    /// Body still being written; nothing on the wire yet.
    Unsent { body: Vec<u8> },
    /// Request sent, response streaming in.  `leftover` holds bytes
    /// received but not yet handed out by a bounded read.
    Streaming {
        stream: BoxStream<'static, reqwest::Result<Bytes>>,
        leftover: Bytes,
    },
    /// No more bytes will ever arrive.
    Drained,
}

struct Connection {
    url: String,
    method: Method,
    content_type: Option<&'static str>,
    state: ConnectionState,
}

/// Outbound network connections driven by the engine through the
/// boundary.
///
/// The engine issues at most one outstanding read per connection,
/// matching its single-threaded execution model; reads observe the
/// response bytes in arrival order and terminate with a zero-length
/// result once the stream is exhausted.
pub struct Transport {
    client: Client,
    connections: Registry<Arc<Mutex<Connection>>>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            connections: Registry::new(),
        }
    }

    /// Registers a connection for `url`.  POST requests get the git
    /// content type matching the service named in the URL; the actual
    /// exchange starts on the first read.
    pub fn open(&self, url: &str, is_post: bool) -> ConnectionHandle {
        let (method, content_type) = if is_post {
            let content_type = if url.contains("git-upload-pack") {
                UPLOAD_PACK_REQUEST
            } else {
                RECEIVE_PACK_REQUEST
            };
            (Method::POST, Some(content_type))
        } else {
            (Method::GET, None)
        };
        let scheme = if url.starts_with("https") {
            "encrypted"
        } else {
            "plain"
        };
        let handle = ConnectionHandle(self.connections.allocate(Arc::new(Mutex::new(
            Connection {
                url: url.to_string(),
                method,
                content_type,
                state: ConnectionState::Unsent { body: Vec::new() },
            },
        ))));
        debug!("connection {handle} opened to <{url}> ({scheme})");
        handle
    }

    fn connection(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Arc<Mutex<Connection>>, TransportError> {
        self.connections
            .with(handle.0, |conn| Arc::clone(conn))
            .ok_or(TransportError::UnknownConnection(handle))
    }

    /// Appends bytes to the outbound request body.  Only an unknown
    /// handle fails; a write after the body was finalized is dropped.
    pub async fn write(&self, handle: ConnectionHandle, data: &[u8]) -> Result<(), TransportError> {
        let conn = self.connection(handle)?;
        let mut conn = conn.lock().await;
        match &mut conn.state {
            ConnectionState::Unsent { body } => body.extend_from_slice(data),
            _ => warn!(
                "dropping {} byte write on connection {handle}: body already finalized",
                data.len(),
            ),
        }
        Ok(())
    }

    /// Returns up to `max_len` response bytes, suspending until data
    /// is available, or a zero-length result at end of stream.  The
    /// first read finalizes the outbound body and sends the request.
    pub async fn read(
        &self,
        handle: ConnectionHandle,
        max_len: usize,
    ) -> Result<Bytes, TransportError> {
        let conn = self.connection(handle)?;
        let mut conn = conn.lock().await;

        let body = match &mut conn.state {
            ConnectionState::Unsent { body } => Some(std::mem::take(body)),
            _ => None,
        };
        if let Some(body) = body {
            debug!(
                "sending {} <{}> with a {} byte body",
                conn.method,
                conn.url,
                body.len(),
            );
            let mut request = self.client.request(conn.method.clone(), &conn.url);
            if let Some(content_type) = conn.content_type {
                request = request.header(header::CONTENT_TYPE, content_type);
            }
            match request.body(body).send().await {
                Ok(response) => {
                    conn.state = ConnectionState::Streaming {
                        stream: response.bytes_stream().boxed(),
                        leftover: Bytes::new(),
                    };
                }
                Err(e) => {
                    conn.state = ConnectionState::Drained;
                    return Err(e.into());
                }
            }
        }

        loop {
            match &mut conn.state {
                ConnectionState::Streaming { stream, leftover } => {
                    if !leftover.is_empty() {
                        let take = leftover.len().min(max_len);
                        return Ok(leftover.split_to(take));
                    }
                    match stream.next().await {
                        Some(Ok(chunk)) => *leftover = chunk,
                        Some(Err(e)) => {
                            conn.state = ConnectionState::Drained;
                            return Err(e.into());
                        }
                        None => {
                            conn.state = ConnectionState::Drained;
                            return Ok(Bytes::new());
                        }
                    }
                }
                _ => return Ok(Bytes::new()),
            }
        }
    }

    /// Discards the connection, aborting any in-flight exchange.
    /// Abort failures have nowhere to go and are not surfaced; closing
    /// an already closed handle is a no-op.
    pub fn close(&self, handle: ConnectionHandle) {
        if self.connections.release(handle.0).is_some() {
            debug!("connection {handle} closed");
        }
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
