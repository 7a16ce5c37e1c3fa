//! TCP link to a hosted authority.
//!
//! Frames are a big-endian `u32` length followed by a bincode-encoded
//! [`Envelope`]. The client side is [`TcpRemote`]; the server side is
//! [`serve`], which hosts one [`LocalAuthority`] per connection and keeps
//! lobby and stats in a [`PlayerRegistry`] shared by all of them.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::core::{Coord, FireOutcome};
use crate::remote::local::{AuthorityConfig, LocalAuthority, PlayerRegistry};
use crate::remote::wire::{Envelope, Request, Response, PROTOCOL_VERSION};
use crate::remote::{
    BoardLayout, Description, LobbyPlayer, PlayerStats, RemoteError, RemoteGameService,
    SessionToken, StartRequest, StatusReport,
};

/// Default timeout for a single frame read or write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum frame size (1 MB); every legitimate frame is far smaller.
const MAX_FRAME_SIZE: u32 = 1_000_000;

fn io_error(e: std::io::Error) -> RemoteError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            RemoteError::Transport("connection closed by peer".to_string())
        }
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            RemoteError::Transport("connection reset by peer".to_string())
        }
        _ => RemoteError::Transport(format!("io error: {}", e)),
    }
}

/// Length-prefixed bincode frames over a TCP stream.
pub struct FramedStream {
    stream: TcpStream,
    timeout_duration: Duration,
    max_frame_size: u32,
}

impl FramedStream {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeout(stream, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(stream: TcpStream, timeout_duration: Duration) -> Self {
        Self {
            stream,
            timeout_duration,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub async fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<(), RemoteError> {
        let data = bincode::serialize(value)
            .map_err(|e| RemoteError::Transport(format!("serialization error: {}", e)))?;
        if data.len() as u64 > self.max_frame_size as u64 {
            return Err(RemoteError::Transport(format!(
                "frame too large: {} bytes (max: {})",
                data.len(),
                self.max_frame_size
            )));
        }
        let write_op = async {
            self.stream
                .write_all(&(data.len() as u32).to_be_bytes())
                .await
                .map_err(io_error)?;
            self.stream.write_all(&data).await.map_err(io_error)?;
            self.stream.flush().await.map_err(io_error)
        };
        timeout(self.timeout_duration, write_op)
            .await
            .map_err(|_| {
                RemoteError::Transport(format!("send timeout after {:?}", self.timeout_duration))
            })?
    }

    /// Read one frame. `Ok(None)` means the peer closed the connection
    /// cleanly between frames.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, RemoteError> {
        let max = self.max_frame_size;
        let read_op = async {
            let mut len_buf = [0u8; 4];
            match self.stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(io_error(e)),
            }
            let len = u32::from_be_bytes(len_buf);
            if len == 0 || len > max {
                return Err(RemoteError::Transport(format!("invalid frame length: {}", len)));
            }
            let mut buf = vec![0u8; len as usize];
            self.stream.read_exact(&mut buf).await.map_err(io_error)?;
            bincode::deserialize(&buf)
                .map(Some)
                .map_err(|e| RemoteError::Transport(format!("deserialization error: {}", e)))
        };
        timeout(self.timeout_duration, read_op)
            .await
            .map_err(|_| {
                RemoteError::Transport(format!("receive timeout after {:?}", self.timeout_duration))
            })?
    }
}

struct Link {
    framed: FramedStream,
    /// A call was dropped after sending its request; its reply is still queued.
    stale_reply: bool,
}

/// [`RemoteGameService`] that forwards each call over TCP.
pub struct TcpRemote {
    link: Mutex<Link>,
}

impl TcpRemote {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, RemoteError> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout<A: ToSocketAddrs>(
        addr: A,
        timeout_duration: Duration,
    ) -> Result<Self, RemoteError> {
        let stream = timeout(timeout_duration, TcpStream::connect(addr))
            .await
            .map_err(|_| RemoteError::Transport("connect timeout".to_string()))?
            .map_err(io_error)?;
        Ok(Self::from_stream(FramedStream::with_timeout(stream, timeout_duration)))
    }

    pub fn from_stream(framed: FramedStream) -> Self {
        Self {
            link: Mutex::new(Link {
                framed,
                stale_reply: false,
            }),
        }
    }

    async fn call(&self, request: Request) -> Result<Response, RemoteError> {
        let mut link = self.link.lock().await;
        if link.stale_reply {
            log::debug!("[TcpRemote] discarding reply to an abandoned call");
            link.framed.read_frame::<Envelope<Response>>().await?;
            link.stale_reply = false;
        }
        link.framed.write_frame(&Envelope::new(request)).await?;
        // cleared only once the reply has been read in full
        link.stale_reply = true;
        let reply: Envelope<Response> = link
            .framed
            .read_frame()
            .await?
            .ok_or_else(|| RemoteError::Transport("connection closed by peer".to_string()))?;
        link.stale_reply = false;
        if reply.version != PROTOCOL_VERSION {
            return Err(RemoteError::Transport(format!(
                "protocol version mismatch: expected {}, got {}",
                PROTOCOL_VERSION, reply.version
            )));
        }
        match reply.body {
            Response::Failure(e) => Err(e),
            other => Ok(other),
        }
    }
}

fn unexpected(response: Response) -> RemoteError {
    RemoteError::Transport(format!("unexpected response: {:?}", response))
}

#[async_trait::async_trait]
impl RemoteGameService for TcpRemote {
    async fn start_match(&self, request: StartRequest) -> Result<SessionToken, RemoteError> {
        match self.call(Request::Start(request)).await? {
            Response::Started(token) => Ok(token),
            other => Err(unexpected(other)),
        }
    }

    async fn status(&self) -> Result<StatusReport, RemoteError> {
        match self.call(Request::Status).await? {
            Response::Status(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    async fn board(&self) -> Result<BoardLayout, RemoteError> {
        match self.call(Request::Board).await? {
            Response::Board(layout) => Ok(layout),
            other => Err(unexpected(other)),
        }
    }

    async fn fire(&self, coord: Coord) -> Result<FireOutcome, RemoteError> {
        match self.call(Request::Fire(coord)).await? {
            Response::Fired(outcome) => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    async fn abandon(&self) -> Result<(), RemoteError> {
        match self.call(Request::Abandon).await? {
            Response::Abandoned => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn description(&self) -> Result<Description, RemoteError> {
        match self.call(Request::Description).await? {
            Response::Description(d) => Ok(d),
            other => Err(unexpected(other)),
        }
    }

    async fn lobby(&self) -> Result<Vec<LobbyPlayer>, RemoteError> {
        match self.call(Request::Lobby).await? {
            Response::Lobby(players) => Ok(players),
            other => Err(unexpected(other)),
        }
    }

    async fn stats(&self, nick: Option<String>) -> Result<Vec<PlayerStats>, RemoteError> {
        match self.call(Request::Stats(nick)).await? {
            Response::Stats(table) => Ok(table),
            other => Err(unexpected(other)),
        }
    }
}

/// Run one request against `service` and wrap the result for the wire.
pub async fn dispatch(service: &dyn RemoteGameService, request: Request) -> Response {
    let result = match request {
        Request::Start(req) => service.start_match(req).await.map(Response::Started),
        Request::Status => service.status().await.map(Response::Status),
        Request::Board => service.board().await.map(Response::Board),
        Request::Fire(c) => service.fire(c).await.map(Response::Fired),
        Request::Abandon => service.abandon().await.map(|()| Response::Abandoned),
        Request::Description => service.description().await.map(Response::Description),
        Request::Lobby => service.lobby().await.map(Response::Lobby),
        Request::Stats(nick) => service.stats(nick).await.map(Response::Stats),
    };
    result.unwrap_or_else(Response::Failure)
}

/// Answer requests on one connection until the peer disconnects.
pub async fn serve_connection(
    stream: TcpStream,
    service: &dyn RemoteGameService,
) -> Result<(), RemoteError> {
    // Clients poll on their own cadence; idle gaps are normal.
    let mut framed = FramedStream::with_timeout(stream, Duration::from_secs(3600));
    while let Some(envelope) = framed.read_frame::<Envelope<Request>>().await? {
        let reply = if envelope.version != PROTOCOL_VERSION {
            Response::Failure(RemoteError::BadRequest(format!(
                "protocol version mismatch: expected {}, got {}",
                PROTOCOL_VERSION, envelope.version
            )))
        } else {
            dispatch(service, envelope.body).await
        };
        framed.write_frame(&Envelope::new(reply)).await?;
    }
    Ok(())
}

/// Accept connections forever, hosting a fresh bot authority for each.
///
/// Matches are per connection; finished games and waiting players are
/// visible to every connection. `seed` makes the first connection's bot
/// reproducible; later connections derive their seeds from it.
pub async fn serve(listener: TcpListener, seed: Option<u64>) -> anyhow::Result<()> {
    let registry = Arc::new(PlayerRegistry::new());
    let mut next_seed = seed;
    loop {
        let (stream, addr) = listener.accept().await?;
        log::info!("[serve] connection from {}", addr);
        let service: Arc<dyn RemoteGameService> = Arc::new(LocalAuthority::with_registry(
            next_seed,
            AuthorityConfig::default(),
            registry.clone(),
        ));
        next_seed = next_seed.map(|s| s.wrapping_add(1));
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, service.as_ref()).await {
                log::warn!("[serve] connection {} closed with error: {}", addr, e);
            } else {
                log::info!("[serve] connection {} closed", addr);
            }
        });
    }
}
