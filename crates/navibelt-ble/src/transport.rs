//! Link operations on a connected belt

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use btleplug::api::{Characteristic as GattCharacteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use navibelt_core::{
    BeltTransport, Characteristic, InboundItem, InboundStream, OutboundPacket, RawFrame, TransportError, TransportType,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;

// ----------------------------------------------------------------------------
// BLE Link
// ----------------------------------------------------------------------------

/// An open connection to one belt
///
/// Notifications and read values arrive on the inbound stream in the order
/// the peripheral delivered them. The stream ends once the link is closed.
pub struct BleLink {
    peripheral: Peripheral,
    characteristics: HashMap<Characteristic, GattCharacteristic>,
    config: BleTransportConfig,
    inbound_tx: RwLock<Option<mpsc::UnboundedSender<InboundItem>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundItem>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BleLink {
    pub(crate) fn new(
        peripheral: Peripheral,
        characteristics: HashMap<Characteristic, GattCharacteristic>,
        config: BleTransportConfig,
        inbound_tx: mpsc::UnboundedSender<InboundItem>,
        inbound_rx: mpsc::UnboundedReceiver<InboundItem>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            peripheral,
            characteristics,
            config,
            inbound_tx: RwLock::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            tasks: Mutex::new(tasks),
        }
    }

    fn gatt(&self, characteristic: Characteristic) -> Result<&GattCharacteristic, BleTransportError> {
        self.characteristics
            .get(&characteristic)
            .ok_or(BleTransportError::CharacteristicNotFound(characteristic))
    }

    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    fn write_type(&self) -> WriteType {
        if self.config.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }

    async fn perform(&self, packet: &OutboundPacket) -> Result<(), BleTransportError> {
        match packet {
            OutboundPacket::Write {
                characteristic,
                payload,
            } => {
                let gatt = self.gatt(*characteristic)?;
                trace!("{} -> [{}]", characteristic, hex::encode(payload));
                self.peripheral
                    .write(gatt, payload, self.write_type())
                    .await
                    .map_err(|e| BleTransportError::WriteFailed {
                        characteristic: *characteristic,
                        reason: e.to_string(),
                    })
            }
            OutboundPacket::Read { characteristic } => {
                let gatt = self.gatt(*characteristic)?;
                let value = self
                    .peripheral
                    .read(gatt)
                    .await
                    .map_err(|e| BleTransportError::ReadFailed {
                        characteristic: *characteristic,
                        reason: e.to_string(),
                    })?;
                trace!("{} <- [{}] (read)", characteristic, hex::encode(&value));
                // Read values take the same path as notifications
                let inbound = self.inbound_tx.read().await;
                let tx = inbound.as_ref().ok_or(BleTransportError::Closed)?;
                tx.send(InboundItem::Frame(RawFrame::new(*characteristic, value)))
                    .map_err(|_| BleTransportError::Closed)
            }
            OutboundPacket::SetNotifications {
                characteristic,
                enabled,
            } => {
                let gatt = self.gatt(*characteristic)?;
                let result = if *enabled {
                    self.peripheral.subscribe(gatt).await
                } else {
                    self.peripheral.unsubscribe(gatt).await
                };
                result.map_err(|e| BleTransportError::SubscriptionFailed {
                    characteristic: *characteristic,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl BeltTransport for BleLink {
    fn transport_type(&self) -> TransportType {
        TransportType::Ble
    }

    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        packet.check()?;
        if self.inbound_tx.read().await.is_none() {
            return Err(TransportError::Closed);
        }
        self.perform(&packet).await.map_err(Into::into)
    }

    fn take_inbound(&self) -> Option<InboundStream> {
        let rx = self.inbound_rx.lock().ok()?.take()?;
        Some(
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed(),
        )
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(_sender) = self.inbound_tx.write().await.take() else {
            return Ok(());
        };
        self.abort_tasks();
        debug!("Closing BLE link to {}", self.peripheral.address());
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: format!("disconnect failed: {}", e),
            })
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
