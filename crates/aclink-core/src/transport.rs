//! Transport trait for unit communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the air
//! conditioner's indoor unit. The production implementation is a serial
//! port (`aclink-transport`); tests use `MockTransport` from the
//! `aclink-test-harness` crate.
//!
//! The protocol engine (`aclink-s21`) operates on a `Transport` rather
//! than directly on a serial port, enabling both real hardware control
//! and deterministic unit testing.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Asynchronous byte-level transport to the unit.
///
/// The contract is deliberately thin: FIFO byte delivery with a
/// read timeout, nothing more. Framing, checksums, and ACK handling are
/// the protocol engine's business.
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes to the unit.
    ///
    /// Implementations should not return until all bytes have been
    /// handed to the underlying link (serial TX buffer flushed).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the unit into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`] if nothing is
    /// received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, subsequent `send()` and `receive()` calls should
    /// return [`Error::NotConnected`].
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Read exactly one byte, waiting up to `timeout`.
    ///
    /// Provided helper for the engine's byte-at-a-time frame scanning
    /// and ACK waits. A zero-length read means the stream ended (the
    /// port vanished) and is reported as a communication error rather
    /// than spinning.
    async fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let mut buf = [0u8; 1];
        let n = self.receive(&mut buf, timeout).await?;
        if n > 0 {
            Ok(buf[0])
        } else {
            Err(Error::Communication("transport end of stream".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Minimal in-memory transport for exercising the provided helper.
    struct QueueTransport {
        bytes: VecDeque<u8>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for QueueTransport {
        async fn send(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            match self.bytes.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                None => Err(Error::Timeout),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[tokio::test]
    async fn read_byte_returns_queued_bytes_in_order() {
        let mut t = QueueTransport {
            bytes: VecDeque::from(vec![0x02, 0x47]),
            connected: true,
        };
        assert_eq!(t.read_byte(Duration::from_millis(10)).await.unwrap(), 0x02);
        assert_eq!(t.read_byte(Duration::from_millis(10)).await.unwrap(), 0x47);
    }

    #[tokio::test]
    async fn read_byte_times_out_when_empty() {
        let mut t = QueueTransport {
            bytes: VecDeque::new(),
            connected: true,
        };
        let err = t.read_byte(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
