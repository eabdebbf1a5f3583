use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

/// ATT header bytes subtracted from the MTU for each write
pub const ATT_OVERHEAD: usize = 3;

/// Default MTU used by the mower link
pub const DEFAULT_MTU: usize = 20;

/// Link to the mower, as seen by the session
///
/// Implementations own connection establishment, pairing and the radio
/// primitives. The session only relies on ordered delivery of chunks within
/// one write and one notification.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the underlying link
    async fn connect(&self) -> Result<()>;

    /// Start notifications; every inbound chunk is pushed into the returned channel
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>>;

    /// Write one chunk of at most `mtu() - 3` bytes
    async fn write_chunk(&self, chunk: &[u8]) -> Result<()>;

    /// Stop notifications
    async fn stop_notifications(&self) -> Result<()>;

    /// Drop the link
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up
    async fn is_connected(&self) -> bool;

    /// Negotiated MTU
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }
}

/// Largest chunk that fits one write for the given MTU
#[must_use]
pub const fn chunk_size(mtu: usize) -> usize {
    if mtu > ATT_OVERHEAD {
        mtu - ATT_OVERHEAD
    } else {
        1
    }
}

/// Write a complete frame as a sequence of MTU-sized chunks
///
/// # Errors
///
/// Propagates the first failed chunk write.
pub async fn write_frame<T: Transport + ?Sized>(transport: &T, frame: &[u8]) -> Result<()> {
    let size = chunk_size(transport.mtu());
    debug!("Writing {} bytes in chunks of {size}: {:02x?}", frame.len(), frame);

    for chunk in frame.chunks(size) {
        transport.write_chunk(chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(20), 17);
        assert_eq!(chunk_size(23), 20);
        assert_eq!(chunk_size(3), 1);
        assert_eq!(chunk_size(0), 1);
    }

    #[tokio::test]
    async fn test_write_frame_chunks() {
        let transport = MockTransport::new(20);
        let frame: Vec<u8> = (0..40).collect();

        write_frame(&transport, &frame).await.unwrap();

        let writes = transport.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].len(), 17);
        assert_eq!(writes[1].len(), 17);
        assert_eq!(writes[2].len(), 6);
        assert_eq!(writes.concat(), frame);
    }
}
