//! Local channel the engine connects back to.
//!
//! The client binds a fresh address before spawning the engine and passes it
//! on the command line (`--c <address>`). Unix uses a domain socket in the
//! temp directory; Windows uses a named pipe.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

const ADDRESS_PREFIX: &str = "fcs-";

/// Collision-resistant local address, unique per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress(String);

impl ChannelAddress {
    /// A new address that no other session uses.
    #[must_use]
    pub fn generate() -> Self {
        let token = uuid::Uuid::new_v4().simple().to_string();
        Self::for_token(&token)
    }

    #[cfg(unix)]
    fn for_token(token: &str) -> Self {
        let path = std::env::temp_dir().join(format!("{ADDRESS_PREFIX}{token}.sock"));
        Self(path.to_string_lossy().into_owned())
    }

    #[cfg(windows)]
    fn for_token(token: &str) -> Self {
        Self(format!(r"\\.\pipe\{ADDRESS_PREFIX}{token}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Both halves of an accepted engine connection.
pub struct ChannelStream {
    pub(crate) reader: ChannelReader,
    pub(crate) writer: ChannelWriter,
}

impl ChannelStream {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Bound, not yet connected, end of a channel.
///
/// On Unix the socket file is removed when the listener is dropped.
pub struct ChannelListener {
    address: ChannelAddress,
    #[cfg(unix)]
    listener: tokio::net::UnixListener,
    #[cfg(windows)]
    server: tokio::net::windows::named_pipe::NamedPipeServer,
}

impl ChannelListener {
    #[cfg(unix)]
    pub fn bind(address: &ChannelAddress) -> io::Result<Self> {
        let listener = tokio::net::UnixListener::bind(address.as_str())?;
        Ok(Self {
            address: address.clone(),
            listener,
        })
    }

    #[cfg(windows)]
    pub fn bind(address: &ChannelAddress) -> io::Result<Self> {
        let server = tokio::net::windows::named_pipe::ServerOptions::new()
            .first_pipe_instance(true)
            .create(address.as_str())?;
        Ok(Self {
            address: address.clone(),
            server,
        })
    }

    #[must_use]
    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    /// Wait for the engine to connect. Only one connection is ever accepted.
    #[cfg(unix)]
    pub async fn accept(&self) -> io::Result<ChannelStream> {
        let (stream, _) = self.listener.accept().await?;
        let (reader, writer) = stream.into_split();
        Ok(ChannelStream::new(reader, writer))
    }

    #[cfg(windows)]
    pub async fn accept(self) -> io::Result<ChannelStream> {
        self.server.connect().await?;
        let (reader, writer) = tokio::io::split(self.server);
        Ok(ChannelStream::new(reader, writer))
    }
}

#[cfg(unix)]
impl Drop for ChannelListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(self.address.as_str())
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::debug!(address = %self.address, "failed to remove channel socket: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_addresses_are_unique() {
        let a = ChannelAddress::generate();
        let b = ChannelAddress::generate();
        assert_ne!(a, b);
        assert!(a.as_str().contains(ADDRESS_PREFIX));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn accepts_one_connection_and_cleans_up() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let address = ChannelAddress::generate();
        let listener = ChannelListener::bind(&address).unwrap();
        assert!(std::path::Path::new(address.as_str()).exists());

        let client_address = address.clone();
        let client = tokio::spawn(async move {
            let mut stream = tokio::net::UnixStream::connect(client_address.as_str())
                .await
                .unwrap();
            stream.write_all(b"ping").await.unwrap();
        });

        let mut stream = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        stream.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.await.unwrap();

        drop(listener);
        assert!(!std::path::Path::new(address.as_str()).exists());
    }
}
