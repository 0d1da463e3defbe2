use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};

use super::Endpoint;
use super::probe::SocketProbe;
use crate::error::ServiceError;

/// An open HTTP/1.1 connection to the service host.
///
/// The connection driver runs on its own task and is aborted when the handle
/// is closed or dropped, which closes the socket.
pub struct ConnectionHandle {
    id: u64,
    sender: http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    /// Only present in the managed runtime
    probe: Option<SocketProbe>,
}

impl ConnectionHandle {
    /// Opens a TCP connection, performs the TLS handshake when configured and
    /// starts the HTTP/1.1 connection driver.
    #[instrument(skip(endpoint), fields(host = %endpoint.authority))]
    pub(crate) async fn open(endpoint: &Endpoint, id: u64) -> Result<Self, ServiceError> {
        let connect = TcpStream::connect((endpoint.hostname.as_str(), endpoint.port));
        let tcp = match timeout(endpoint.timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ServiceError::network_connection(
                    &endpoint.authority,
                    e.to_string(),
                ));
            }
            Err(_) => return Err(ServiceError::network_timeout(&endpoint.authority)),
        };
        tcp.set_nodelay(true)?;
        let probe = attach_probe(&tcp, endpoint.managed_runtime);

        let handle = match &endpoint.tls {
            Some(config) => {
                let server_name = ServerName::try_from(endpoint.hostname.clone())
                    .map_err(|e| ServiceError::tls_error(format!("{}: {e}", endpoint.hostname)))?;
                let connector = TlsConnector::from(Arc::clone(config));
                let stream = match timeout(endpoint.timeout, connector.connect(server_name, tcp)).await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => return Err(ServiceError::tls_error(e.to_string())),
                    Err(_) => return Err(ServiceError::network_timeout(&endpoint.authority)),
                };
                Self::handshake(stream, probe, id).await?
            }
            None => Self::handshake(tcp, probe, id).await?,
        };

        debug!("Opened connection {id} to {}", endpoint.authority);
        Ok(handle)
    }

    async fn handshake<T>(io: T, probe: Option<SocketProbe>, id: u64) -> Result<Self, ServiceError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(io)).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Connection {id} ended with error: {e}");
            }
        });

        Ok(ConnectionHandle {
            id,
            sender,
            driver,
            probe,
        })
    }

    /// Sequence number of this connection within its manager
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the connection driver has shut down
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Waits until the connection can take a request, then sends it and
    /// returns once the response head has arrived.
    pub(crate) async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, hyper::Error> {
        self.sender.ready().await?;
        self.sender.send_request(request).await
    }

    /// True when no live socket remains or the peer has half-closed it.
    /// `Err` when the connection carries no probe.
    pub(crate) fn peer_closed(&self) -> io::Result<bool> {
        if self.sender.is_closed() {
            return Ok(true);
        }
        match &self.probe {
            Some(probe) => probe.peer_closed(),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "connection has no socket probe",
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    #[cfg(test)]
    pub(crate) fn set_probe(&mut self, probe: Option<SocketProbe>) {
        self.probe = probe;
    }

    pub fn close(self) {
        debug!("Closing connection {}", self.id);
    }
}

/// Duplicates the socket for stale checks. Outside the managed runtime no
/// check ever runs, so no descriptor is spent on it.
fn attach_probe(tcp: &TcpStream, managed_runtime: bool) -> Option<SocketProbe> {
    if !managed_runtime {
        return None;
    }
    match SocketProbe::for_stream(tcp) {
        Ok(probe) => Some(probe),
        Err(e) => {
            debug!("Socket probe unavailable, stale checks disabled for this connection: {e}");
            None
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.sender.is_closed())
            .field("probe", &self.probe.is_some())
            .finish()
    }
}
