//! Low-level socket state inspection
//!
//! A frozen process can miss the peer closing an idle keep-alive connection.
//! The probe keeps its own duplicate of the socket descriptor so the TCP state
//! stays readable for as long as the [`super::ConnectionHandle`] lives, even
//! after the HTTP driver has dropped its end.

use std::io;
use tokio::net::TcpStream;

#[cfg(target_os = "linux")]
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

pub(crate) struct SocketProbe {
    #[cfg(target_os = "linux")]
    fd: OwnedFd,
}

impl SocketProbe {
    #[cfg(target_os = "linux")]
    pub(crate) fn for_stream(stream: &TcpStream) -> io::Result<Self> {
        Ok(SocketProbe {
            fd: stream.as_fd().try_clone_to_owned()?,
        })
    }

    /// Wraps an arbitrary descriptor, used to exercise the error path
    #[cfg(all(test, target_os = "linux"))]
    pub(crate) fn from_fd(fd: OwnedFd) -> Self {
        SocketProbe { fd }
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn for_stream(_stream: &TcpStream) -> io::Result<Self> {
        Ok(SocketProbe {})
    }

    /// Returns true when the peer has sent FIN and the socket sits in `CLOSE_WAIT`.
    #[cfg(target_os = "linux")]
    pub(crate) fn peer_closed(&self) -> io::Result<bool> {
        // tcpi_state is the first byte of struct tcp_info on every kernel version
        let mut info = [0u8; 104];
        let mut len = info.len() as libc::socklen_t;

        // SAFETY: `fd` is an open descriptor owned by this probe, and `info`/`len`
        // describe a writable buffer of `len` bytes.
        let rc = unsafe {
            libc::getsockopt(
                self.fd.as_raw_fd(),
                libc::IPPROTO_TCP,
                libc::TCP_INFO,
                info.as_mut_ptr().cast(),
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "getsockopt(TCP_INFO) returned no data",
            ));
        }

        Ok(info[0] == crate::constants::transport::TCP_CLOSE_WAIT)
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn peer_closed(&self) -> io::Result<bool> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "TCP state inspection is only available on Linux",
        ))
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_socket_is_not_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let probe = SocketProbe::for_stream(&client).unwrap();
        assert!(!probe.peer_closed().unwrap());
    }

    #[tokio::test]
    async fn test_peer_close_is_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let probe = SocketProbe::for_stream(&client).unwrap();
        drop(server);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(probe.peer_closed().unwrap());
    }

    #[test]
    fn test_non_socket_descriptor_is_an_error() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let probe = SocketProbe::from_fd(OwnedFd::from(file));
        assert!(probe.peer_closed().is_err());
    }

    #[tokio::test]
    async fn test_probe_outlives_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let probe = SocketProbe::for_stream(&client).unwrap();
        drop(server);
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        drop(client);

        assert!(probe.peer_closed().unwrap());
    }
}
