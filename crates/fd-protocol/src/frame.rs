//! Length-prefixed framing.
//!
//! Every framed message is a 4-byte little-endian unsigned length `L`
//! followed by exactly `L` bytes of opaque payload.  `L` must not exceed
//! [`MAX_MESSAGE_SIZE`]; the limit is enforced on both ends, and always
//! before the body buffer is allocated.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a framed payload, in bytes.
///
/// A peer declaring more than this is treated as broken (or hostile) and
/// the connection is torn down without allocating the body.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Errors from encoding or decoding a framed message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared (or supplied) payload length exceeds [`MAX_MESSAGE_SIZE`].
    #[error("frame payload of {0} bytes exceeds the {MAX_MESSAGE_SIZE}-byte limit")]
    PayloadTooLarge(usize),
    /// The stream closed before a full header or body was read.
    #[error("stream ended mid-frame")]
    UnexpectedEnd,
    #[error("frame I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the 4-byte header for a payload of `len` bytes.
pub fn frame_header(len: usize) -> Result<[u8; 4], FrameError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(FrameError::PayloadTooLarge(len));
    }
    Ok((len as u32).to_le_bytes())
}

/// Parse a header and validate the declared length.
pub fn decode_frame_len(header: [u8; 4]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FrameError::PayloadTooLarge(len));
    }
    Ok(len)
}

/// Encode `payload` as header ‖ payload in a single buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header = frame_header(payload.len())?;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read one framed payload from `reader`.
///
/// Short reads are retried until the header and body are complete.  EOF
/// mid-frame maps to [`FrameError::UnexpectedEnd`]; a clean EOF before
/// any header byte maps the same way, so callers distinguish "peer went
/// away" uniformly.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    fill(reader, &mut header).await?;
    let len = decode_frame_len(header)?;
    let mut body = vec![0u8; len];
    fill(reader, &mut body).await?;
    Ok(body)
}

/// Write one framed payload to `writer` and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let header = frame_header(payload.len())?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::UnexpectedEnd),
        Err(e) => Err(FrameError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_payload() {
        let payload = b"{\"method\":\"download.add\"}".to_vec();
        let encoded = encode_frame(&payload).expect("within limit");
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = read_frame(&mut cursor).await.expect("decodes");
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn round_trip_empty_payload() {
        let encoded = encode_frame(&[]).expect("empty is legal");
        assert_eq!(encoded, vec![0, 0, 0, 0]);
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = read_frame(&mut cursor).await.expect("decodes");
        assert!(decoded.is_empty());
    }

    #[test]
    fn header_is_little_endian() {
        let header = frame_header(0x0102_0304).expect("within limit");
        assert_eq!(header, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn oversize_payload_is_rejected_on_encode() {
        assert!(matches!(
            frame_header(MAX_MESSAGE_SIZE + 1),
            Err(FrameError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn oversize_declaration_is_rejected_before_body_read() {
        // Header declares far more than the limit; no body follows.  The
        // decoder must fail on the header alone.
        let mut bytes = (u32::MAX).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"ignored");
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(FrameError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_unexpected_end() {
        let mut cursor = std::io::Cursor::new(vec![0x05, 0x00]);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(FrameError::UnexpectedEnd)
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_unexpected_end() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(FrameError::UnexpectedEnd)
        ));
    }

    #[tokio::test]
    async fn max_size_payload_round_trips() {
        let payload = vec![0xAB; MAX_MESSAGE_SIZE];
        let encoded = encode_frame(&payload).expect("at the limit is legal");
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = read_frame(&mut cursor).await.expect("decodes");
        assert_eq!(decoded.len(), MAX_MESSAGE_SIZE);
    }
}
