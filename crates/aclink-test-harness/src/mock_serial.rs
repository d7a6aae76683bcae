//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test frame encoding, version
//! negotiation, and response parsing without real hardware.
//!
//! # Example
//!
//! ```
//! use aclink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Pre-load: when the engine sends this request, return this response.
//! mock.expect(&[0x02, b'F', b'8', 0x7E, 0x03],
//!             &[0x06, 0x02, b'G', b'8', b'0', b'2', b'0', b'0', 0x41, 0x03]);
//! ```
//!
//! The S21 engine confirms every received frame with a bare ACK byte.
//! The mock swallows those ACK sends by default (they are logged but not
//! matched against expectations), so tests only script the meaningful
//! exchanges. Call [`strict_acks`](MockTransport::strict_acks) to make
//! ACK sends consume expectations like any other data.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use aclink_core::error::{Error, Result};
use aclink_core::transport::Transport;

/// Bare acknowledgement byte of the S21 wire protocol.
const ACK: u8 = 0x06;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    /// Empty means "stay silent": subsequent reads time out.
    response: Vec<u8>,
}

/// A mock [`Transport`] for testing the protocol engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation. The
/// corresponding response bytes are then served, byte-cursor style, by
/// subsequent `receive()` calls.
///
/// If no expectation matches or the queue is exhausted, an error is
/// returned from `send()`.
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// The response data pending for `receive()` calls.
    pending_response: Option<Vec<u8>>,
    /// Cursor into the pending response.
    response_cursor: usize,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes sent through this transport (ACKs included).
    sent_log: Vec<Vec<u8>>,
    /// When `false` (default), a bare-ACK send is logged but not matched.
    strict_acks: bool,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            connected: true,
            sent_log: Vec::new(),
            strict_acks: false,
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, subsequent
    /// `receive()` calls will serve `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expectation whose response is silence: the request is
    /// matched and consumed, but every following `receive()` times out.
    ///
    /// Use this to script timeout/retry paths: one `expect_silence`
    /// per engine attempt.
    pub fn expect_silence(&mut self, request: &[u8]) {
        self.expect(request, &[]);
    }

    /// Make bare-ACK sends consume expectations like any other data.
    pub fn strict_acks(&mut self) {
        self.strict_acks = true;
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Total number of bytes sent, ACK confirmations included.
    pub fn bytes_sent(&self) -> usize {
        self.sent_log.iter().map(Vec::len).sum()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state. When `false`, `send()` and `receive()`
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data.to_vec());

        // The engine's receipt confirmation: swallow unless strict.
        if !self.strict_acks && data == [ACK] {
            return Ok(());
        }

        match self.expectations.pop_front() {
            Some(expectation) => {
                if data != expectation.request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected send data: expected {:02X?}, got {:02X?}",
                        expectation.request, data
                    )));
                }
                self.pending_response = Some(expectation.response);
                self.response_cursor = 0;
                Ok(())
            }
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if let Some(ref response) = self.pending_response {
            let remaining = &response[self.response_cursor..];
            if remaining.is_empty() {
                self.pending_response = None;
                self.response_cursor = 0;
                return Err(Error::Timeout);
            }
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.response_cursor += n;
            if self.response_cursor >= response.len() {
                // All response bytes consumed; clear for next exchange.
                self.pending_response = None;
                self.response_cursor = 0;
            }
            Ok(n)
        } else {
            Err(Error::Timeout)
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_send_receive() {
        let mut mock = MockTransport::new();
        let request = &[0x02, b'F', b'1', 0x77, 0x03];
        let response = &[0x06, 0x02, b'G', b'1', b'1', b'3', b'H', b'A', 0x65, 0x03];

        mock.expect(request, response);
        mock.send(request).await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(n, response.len());
        assert_eq!(&buf[..n], response);
    }

    #[tokio::test]
    async fn tracks_sent_data() {
        let mut mock = MockTransport::new();
        let req1 = &[0x01, 0x02];
        let req2 = &[0x03, 0x04];

        mock.expect(req1, &[0xFF]);
        mock.expect(req2, &[0xFE]);

        mock.send(req1).await.unwrap();
        mock.send(req2).await.unwrap();

        assert_eq!(mock.sent_data().len(), 2);
        assert_eq!(mock.sent_data()[0], req1);
        assert_eq!(mock.sent_data()[1], req2);
        assert_eq!(mock.bytes_sent(), 4);
    }

    #[tokio::test]
    async fn ack_sends_are_swallowed_by_default() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xFF]);

        // An ACK before the expected frame must not consume the expectation.
        mock.send(&[ACK]).await.unwrap();
        mock.send(&[0x01]).await.unwrap();

        // But it is still visible in the log.
        assert_eq!(mock.sent_data()[0], vec![ACK]);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn strict_acks_match_expectations() {
        let mut mock = MockTransport::new();
        mock.strict_acks();
        mock.expect(&[ACK], &[]);

        mock.send(&[ACK]).await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xFF]);

        let result = mock.send(&[0x99]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn receive_without_send_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn silence_expectation_times_out() {
        let mut mock = MockTransport::new();
        mock.expect_silence(&[0x01]);

        mock.send(&[0x01]).await.unwrap();

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn partial_receive() {
        let mut mock = MockTransport::new();
        let request = &[0x01];
        let response = &[0xAA, 0xBB, 0xCC, 0xDD];
        mock.expect(request, response);

        mock.send(request).await.unwrap();

        // Read with a buffer smaller than the response.
        let mut buf = [0u8; 2];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);

        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }
}
