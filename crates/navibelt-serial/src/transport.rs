//! Serial link to a belt
//!
//! Outbound packets are written as `[handle][length][payload]` records. A
//! reader task decodes the byte stream into frames; a record left incomplete
//! for longer than the packet timeout is dropped and reported as malformed.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures::stream::StreamExt;
use navibelt_core::protocol::{encode_packet, DecodedUnit, FrameDecoder};
use navibelt_core::{
    BeltConnector, BeltTransport, InboundItem, InboundStream, OutboundPacket, Request, TransportError, TransportType,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::SerialTransportConfig;
use crate::port::{OpenPort, SerialPortOpener};

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Connector for a belt behind a byte-stream port
pub struct SerialConnector<P: OpenPort> {
    opener: P,
    config: SerialTransportConfig,
}

impl SerialConnector<SerialPortOpener> {
    /// Connector for an OS serial device
    pub fn for_device(path: impl Into<String>, config: SerialTransportConfig) -> Self {
        let opener = SerialPortOpener::new(path, &config);
        Self { opener, config }
    }
}

impl<P: OpenPort> SerialConnector<P> {
    pub fn new(opener: P, config: SerialTransportConfig) -> Self {
        Self { opener, config }
    }

    pub fn config(&self) -> &SerialTransportConfig {
        &self.config
    }
}

#[async_trait]
impl<P: OpenPort> BeltConnector for SerialConnector<P> {
    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    fn target(&self) -> String {
        self.opener.target()
    }

    async fn open(&self) -> Result<Arc<dyn BeltTransport>, TransportError> {
        let port = self.opener.open_port().await?;
        let (mut reader, mut writer) = tokio::io::split(port);

        if self.config.wake_up {
            let record = encode_packet(&Request::QueryMode.encode())?;
            writer.write_all(&record).await?;
            writer.flush().await?;
        }
        if !self.config.initial_flush.is_zero() {
            let discarded = flush_input(&mut reader, &self.config).await?;
            debug!("Discarded {} byte(s) of stale input", discarded);
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, inbound_tx, self.config.clone()));
        info!("Serial link to {} open", self.opener.target());

        Ok(Arc::new(SerialLink {
            writer: Mutex::new(Some(writer)),
            inbound: StdMutex::new(Some(inbound_rx)),
            reader_task: StdMutex::new(Some(reader_task)),
        }))
    }
}

/// Discard input received during the initial flush window
async fn flush_input<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &SerialTransportConfig,
) -> Result<usize, TransportError> {
    let deadline = Instant::now() + config.initial_flush;
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut discarded = 0;
    loop {
        match timeout_at(deadline, reader.read(&mut buf)).await {
            Err(_) | Ok(Ok(0)) => return Ok(discarded),
            Ok(Ok(n)) => discarded += n,
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

/// Decode records until the port ends, fails or the link is dropped
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    inbound: mpsc::UnboundedSender<InboundItem>,
    config: SerialTransportConfig,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut partial_since: Option<Instant> = None;

    loop {
        let read = match partial_since {
            Some(started) => match timeout_at(started + config.packet_timeout, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    partial_since = None;
                    if let Some(malformed) = decoder.reset_partial() {
                        warn!("Packet timeout, dropped [{}]", hex::encode(&malformed.bytes));
                        if inbound.send(InboundItem::Malformed(malformed)).is_err() {
                            break;
                        }
                    }
                    continue;
                }
            },
            None => reader.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => {
                debug!("Serial port closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                let _ = inbound.send(InboundItem::Failed(TransportError::Io(e)));
                break;
            }
        };
        trace!("serial <- [{}]", hex::encode(&buf[..n]));

        let units = decoder.push(&buf[..n]);
        let completed = !units.is_empty();
        for unit in units {
            let item = match unit {
                DecodedUnit::Frame(frame) => InboundItem::Frame(frame),
                DecodedUnit::Malformed(malformed) => {
                    warn!("Discarded [{}]: {}", hex::encode(&malformed.bytes), malformed.reason);
                    InboundItem::Malformed(malformed)
                }
            };
            if inbound.send(item).is_err() {
                return;
            }
        }

        // The packet timer runs from the first byte of the pending record
        partial_since = match (decoder.has_partial(), partial_since) {
            (false, _) => None,
            (true, Some(started)) if !completed => Some(started),
            (true, _) => Some(Instant::now()),
        };
    }
}

// ----------------------------------------------------------------------------
// Serial Link
// ----------------------------------------------------------------------------

/// An open serial link
///
/// The inbound stream ends when the port reaches end of file or the link
/// is closed.
pub struct SerialLink<P> {
    writer: Mutex<Option<WriteHalf<P>>>,
    inbound: StdMutex<Option<mpsc::UnboundedReceiver<InboundItem>>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
}

impl<P> SerialLink<P> {
    fn stop_reader(&self) {
        if let Some(task) = self.reader_task.lock().ok().and_then(|mut task| task.take()) {
            task.abort();
        }
    }
}

#[async_trait]
impl<P> BeltTransport for SerialLink<P>
where
    P: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        let record = encode_packet(&packet)?;
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::Closed)?;
        trace!("serial -> [{}] ({})", hex::encode(&record), packet);
        writer.write_all(&record).await?;
        writer.flush().await?;
        Ok(())
    }

    fn take_inbound(&self) -> Option<InboundStream> {
        let rx = self.inbound.lock().ok()?.take()?;
        Some(
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed(),
        )
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        self.stop_reader();
        debug!("Closing serial link");
        if let Err(e) = writer.shutdown().await {
            debug!("Serial shutdown failed: {}", e);
        }
        Ok(())
    }
}

impl<P> Drop for SerialLink<P> {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
