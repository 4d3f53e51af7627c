//! Message framing shared by listeners and clients.

use crate::error::TcpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single length-prefixed message (256 MiB).
pub const MAX_MESSAGE_LEN: usize = 256 * 1024 * 1024;

/// Wire framing of a stream. Fixed for the lifetime of a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// 4-byte big-endian length followed by the body.
    #[default]
    LengthPrefixed,
    /// Bytes up to and including `\n`.
    LineDelimited,
}

/// Reads one message. Returns `Ok(None)` when the peer closes the stream
/// cleanly between messages.
pub async fn read_message<R>(reader: &mut R, framing: Framing) -> Result<Option<Vec<u8>>, TcpError>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::LengthPrefixed => {
            let mut header = [0u8; 4];
            match reader.read_exact(&mut header).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_be_bytes(header) as usize;
            if len > MAX_MESSAGE_LEN {
                return Err(TcpError::MessageTooLong(len));
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await?;
            Ok(Some(body))
        }
        Framing::LineDelimited => {
            let mut line = Vec::new();
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            Ok(Some(line))
        }
    }
}

/// Writes one message. In line mode a trailing `\n` is added unless the
/// body already ends with one.
pub async fn write_message<W>(writer: &mut W, body: &[u8], framing: Framing) -> Result<(), TcpError>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::LengthPrefixed => {
            let len = u32::try_from(body.len()).map_err(|_| TcpError::MessageTooLong(body.len()))?;
            writer.write_all(&len.to_be_bytes()).await?;
            writer.write_all(body).await?;
        }
        Framing::LineDelimited => {
            writer.write_all(body).await?;
            if body.last() != Some(&b'\n') {
                writer.write_all(b"\n").await?;
            }
        }
    }
    writer.flush().await?;
    Ok(())
}
