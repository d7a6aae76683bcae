//! aclink-test-harness: mock transports for testing aclink backends.
//!
//! Provides [`MockTransport`], an in-memory [`Transport`](aclink_core::Transport)
//! with scripted request/response expectations.

pub mod mock_serial;

pub use mock_serial::MockTransport;
