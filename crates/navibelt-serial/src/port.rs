//! Byte-stream ports carrying serial records
//!
//! `OpenPort` hands the transport an async byte stream. `SerialPortOpener`
//! opens an OS serial device and bridges its blocking reads and writes onto
//! an in-memory duplex stream; tests plug any other `AsyncRead + AsyncWrite`
//! in its place.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use navibelt_core::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::SerialTransportConfig;
use crate::error::SerialTransportError;

const BRIDGE_BUFFER: usize = 4096;

/// Opens the byte stream of one belt
#[async_trait]
pub trait OpenPort: Send + Sync {
    type Port: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Port name used in logs and errors
    fn target(&self) -> String;

    async fn open_port(&self) -> Result<Self::Port, TransportError>;
}

// ----------------------------------------------------------------------------
// OS Serial Port
// ----------------------------------------------------------------------------

/// Opens a serial device such as `/dev/ttyACM0` or `COM3`
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(path: impl Into<String>, config: &SerialTransportConfig) -> Self {
        Self {
            path: path.into(),
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_blocking(&self) -> Result<Box<dyn serialport::SerialPort>, SerialTransportError> {
        serialport::new(self.path.as_str(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| SerialTransportError::OpenFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl OpenPort for SerialPortOpener {
    type Port = DuplexStream;

    fn target(&self) -> String {
        self.path.clone()
    }

    async fn open_port(&self) -> Result<DuplexStream, TransportError> {
        let opener = self.clone();
        let port = tokio::task::spawn_blocking(move || opener.open_blocking())
            .await
            .map_err(|e| TransportError::OpenFailed {
                target: self.path.clone(),
                reason: e.to_string(),
            })??;
        let reader = port.try_clone().map_err(SerialTransportError::from)?;

        let (host, bridge) = tokio::io::duplex(BRIDGE_BUFFER);
        let (bridge_rx, bridge_tx) = tokio::io::split(bridge);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = Handle::current();

        std::thread::spawn({
            let stop = stop.clone();
            let handle = handle.clone();
            move || pump_from_port(reader, bridge_tx, handle, stop)
        });
        std::thread::spawn(move || pump_to_port(port, bridge_rx, handle, stop));

        debug!("Opened serial port {} at {} baud", self.path, self.baud_rate);
        Ok(host)
    }
}

/// Copy bytes received on the device into the bridge
fn pump_from_port(
    mut port: Box<dyn serialport::SerialPort>,
    mut bridge: WriteHalf<DuplexStream>,
    handle: Handle,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 256];
    while !stop.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if handle.block_on(bridge.write_all(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                break;
            }
        }
    }
    stop.store(true, Ordering::Release);
    // Ends the host's stream
    let _ = handle.block_on(bridge.shutdown());
    debug!("Serial reader stopped");
}

/// Copy bytes written by the host onto the device
fn pump_to_port(
    mut port: Box<dyn serialport::SerialPort>,
    mut bridge: ReadHalf<DuplexStream>,
    handle: Handle,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 256];
    loop {
        let n = match handle.block_on(bridge.read(&mut buf)) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if let Err(e) = port.write_all(&buf[..n]).and_then(|_| port.flush()) {
            warn!("Serial write failed: {}", e);
            break;
        }
    }
    stop.store(true, Ordering::Release);
    debug!("Serial writer stopped");
}
