//! Per-pair persistent TLS connections. Only the lower-id server in a pair
//! dials; the higher-id server accepts — halving the number of handshakes
//! and avoiding both sides racing to connect (§4.E, "have each connect to
//! half and use bidirectional connections").

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::{client, server, TlsAcceptor, TlsConnector};

use duskmesh_core::{MetadataHeader, ServerId};
use duskmesh_crypto::{ExpandedVerificationKey, SigningKeypair};

use crate::error::NetworkError;
use crate::framing::{read_framed, read_framed_dynamic, write_framed};

/// Whether `my_id` is responsible for dialing `peer_id` (true) or
/// listening for it (false).
pub fn should_dial(my_id: ServerId, peer_id: ServerId) -> bool {
    my_id < peer_id
}

/// Either side of an established mutual-TLS stream, unified so the
/// connection table doesn't need to care which role it played.
pub enum PeerStream {
    Client(client::TlsStream<TcpStream>),
    Server(server::TlsStream<TcpStream>),
}

impl AsyncRead for PeerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PeerStream::Client(s) => Pin::new(s).poll_read(cx, buf),
            PeerStream::Server(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            PeerStream::Client(s) => Pin::new(s).poll_write(cx, buf),
            PeerStream::Server(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PeerStream::Client(s) => Pin::new(s).poll_flush(cx),
            PeerStream::Server(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PeerStream::Client(s) => Pin::new(s).poll_shutdown(cx),
            PeerStream::Server(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Dial `addr` and complete a mutual-TLS handshake, presenting this node's
/// own identity and expecting `expected_peer` back from the server.
pub async fn dial(
    addr: SocketAddr,
    client_cfg: Arc<rustls::ClientConfig>,
    expected_peer: ServerName<'static>,
) -> Result<PeerStream, NetworkError> {
    let tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true).ok();
    let connector = TlsConnector::from(client_cfg);
    let tls = connector
        .connect(expected_peer, tcp)
        .await
        .map_err(|e| NetworkError::Tls(e.to_string()))?;
    Ok(PeerStream::Client(tls))
}

/// Accept one inbound connection on `listener` and complete the
/// mutual-TLS handshake, requiring the peer's client certificate.
pub async fn accept(
    listener: &TcpListener,
    server_cfg: Arc<rustls::ServerConfig>,
) -> Result<(PeerStream, SocketAddr), NetworkError> {
    let (tcp, addr) = listener.accept().await?;
    tcp.set_nodelay(true).ok();
    let acceptor = TlsAcceptor::from(server_cfg);
    let tls = acceptor
        .accept(tcp)
        .await
        .map_err(|e| NetworkError::Tls(e.to_string()))?;
    Ok((PeerStream::Server(tls), addr))
}

/// The live set of established per-peer streams, keyed by server id.
/// Outgoing and incoming streams are tracked separately since this is a
/// full bidirectional mesh: both sides of a pair send and receive
/// independently over streams established in (possibly) opposite roles.
pub struct ConnectionManager {
    outgoing: Mutex<HashMap<ServerId, PeerStream>>,
    incoming: Mutex<HashMap<ServerId, PeerStream>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            outgoing: Mutex::new(HashMap::new()),
            incoming: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert_outgoing(&self, id: ServerId, stream: PeerStream) {
        self.outgoing.lock().await.insert(id, stream);
    }

    pub async fn insert_incoming(&self, id: ServerId, stream: PeerStream) {
        self.incoming.lock().await.insert(id, stream);
    }

    pub async fn is_connected(&self, id: ServerId) -> bool {
        self.outgoing.lock().await.contains_key(&id) || self.incoming.lock().await.contains_key(&id)
    }

    pub async fn send_to(
        &self,
        id: ServerId,
        header: &MetadataHeader,
        payload: &[u8],
        signing_key: &SigningKeypair,
    ) -> Result<(), NetworkError> {
        let mut guard = self.outgoing.lock().await;
        let stream = guard.get_mut(&id).ok_or(NetworkError::NotConnected(id))?;
        write_framed(stream, header, payload, signing_key).await
    }

    pub async fn read_from(
        &self,
        id: ServerId,
        payload_len: usize,
        verifying_key: &ExpandedVerificationKey,
    ) -> Result<(MetadataHeader, Vec<u8>), NetworkError> {
        let mut guard = self.incoming.lock().await;
        let stream = guard.get_mut(&id).ok_or(NetworkError::NotConnected(id))?;
        read_framed(stream, payload_len, verifying_key).await
    }

    /// Variant of [`Self::read_from`] for frames whose payload length isn't
    /// known ahead of time (path-establishment layers; see
    /// [`read_framed_dynamic`]).
    pub async fn read_from_dynamic(
        &self,
        id: ServerId,
        message_size: usize,
        verifying_key: &ExpandedVerificationKey,
    ) -> Result<(MetadataHeader, Vec<u8>), NetworkError> {
        let mut guard = self.incoming.lock().await;
        let stream = guard.get_mut(&id).ok_or(NetworkError::NotConnected(id))?;
        read_framed_dynamic(stream, message_size, verifying_key).await
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
