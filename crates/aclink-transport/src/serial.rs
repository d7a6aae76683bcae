//! Serial port transport for unit communication.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for USB virtual COM ports and level-shifted
//! on-board UART connections to the indoor unit's service connector.
//!
//! The S21 service port is slow and old-fashioned: 2400 baud, 8 data
//! bits, even parity, 2 stop bits. [`SerialTransport::open_s21`] opens
//! a port with exactly those settings.
//!
//! # Example
//!
//! ```no_run
//! use aclink_transport::SerialTransport;
//! use aclink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> aclink_core::Result<()> {
//! let mut transport = SerialTransport::open_s21("/dev/ttyUSB0").await?;
//!
//! // Basic status query frame
//! transport.send(&[0x02, b'F', b'1', 0x77, 0x03]).await?;
//!
//! // Wait up to 300 ms for the ACK byte
//! let mut buf = [0u8; 1];
//! let n = transport.receive(&mut buf, Duration::from_millis(300)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use aclink_core::error::{Error, Result};
use aclink_core::transport::Transport;

/// Serial port configuration.
///
/// Defaults are the S21 service-port settings:
/// - 2400 baud
/// - 8 data bits
/// - Even parity
/// - 2 stop bits
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Number of data bits per character.
    pub data_bits: DataBits,
    /// Number of stop bits per character.
    pub stop_bits: StopBits,
    /// Parity checking mode.
    pub parity: Parity,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 2400,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Serial port transport for unit communication.
///
/// Implements the [`Transport`] trait for USB virtual COM ports and
/// direct UART connections.
pub struct SerialTransport {
    /// The underlying serial port stream.
    port: Option<SerialStream>,
    /// Port name for logging/debugging.
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port with the S21 service-port settings
    /// (2400 baud, 8 data bits, even parity, 2 stop bits).
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use aclink_transport::SerialTransport;
    /// # async fn example() -> aclink_core::Result<()> {
    /// let transport = SerialTransport::open_s21("/dev/ttyUSB0").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open_s21(port: &str) -> Result<Self> {
        Self::open_with_config(port, SerialConfig::default()).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            "Opening serial port"
        );

        let serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Communication(format!("failed to open serial port {port}: {e}"))
            })?;

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            if e.kind() == std::io::ErrorKind::BrokenPipe
                || e.kind() == std::io::ErrorKind::NotConnected
            {
                Error::NotConnected
            } else {
                Error::Io(e)
            }
        })?;

        // Flush so the half-duplex peer sees the full frame promptly.
        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        let result = tokio::time::timeout(timeout, port.read(buf)).await;

        match result {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                if e.kind() == std::io::ErrorKind::BrokenPipe
                    || e.kind() == std::io::ErrorKind::NotConnected
                {
                    Err(Error::NotConnected)
                } else {
                    Err(Error::Io(e))
                }
            }
            Err(_) => {
                tracing::trace!(
                    port = %self.port_name,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for data"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            // The port is dropped here, which closes it.
            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}
