use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const SPLICE_BUFFER_SIZE: usize = 16 * 1024;

/// Which side ended a spliced session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedBy {
    Client,
    Backend,
}

/// Byte counts for one spliced session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
    pub closed_by: ClosedBy,
}

/// Forward bytes both ways until either direction ends.
///
/// The two directions run concurrently. When one finishes, by EOF or by
/// error, the other is abandoned and both sockets are closed on return.
pub async fn splice(client: TcpStream, backend: TcpStream) -> SpliceStats {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut backend_read, mut backend_write) = backend.into_split();

    let mut client_to_backend = 0u64;
    let mut backend_to_client = 0u64;

    let closed_by = {
        let upstream = pump(&mut client_read, &mut backend_write, &mut client_to_backend);
        let downstream = pump(&mut backend_read, &mut client_write, &mut backend_to_client);

        tokio::select! {
            result = upstream => {
                if let Err(e) = result {
                    debug!("Client to backend stream ended with error: {}", e);
                }
                ClosedBy::Client
            }
            result = downstream => {
                if let Err(e) = result {
                    debug!("Backend to client stream ended with error: {}", e);
                }
                ClosedBy::Backend
            }
        }
    };

    SpliceStats {
        client_to_backend,
        backend_to_client,
        closed_by,
    }
}

/// Copy until EOF, then pass the EOF on as a write shutdown
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; SPLICE_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buffer[..n]).await?;
        *total += n as u64;
    }
}
