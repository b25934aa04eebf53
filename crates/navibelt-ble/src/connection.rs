//! Opening a link to a discovered belt

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use navibelt_core::{BeltConnector, BeltTransport, InboundItem, RawFrame, TransportError, TransportType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::protocol::characteristic_for;
use crate::transport::BleLink;

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Connector for one belt peripheral
#[derive(Clone)]
pub struct BleConnector {
    adapter: Adapter,
    peripheral: Peripheral,
    config: BleTransportConfig,
}

impl BleConnector {
    pub fn new(adapter: Adapter, peripheral: Peripheral, config: BleTransportConfig) -> Self {
        Self {
            adapter,
            peripheral,
            config,
        }
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    async fn connect(&self) -> Result<BleLink, BleTransportError> {
        let target = self.target();
        match timeout(self.config.connection_timeout, self.peripheral.connect()).await {
            Ok(Ok(())) => info!("Connected to belt {}", target),
            Ok(Err(e)) => {
                return Err(BleTransportError::ConnectionFailed {
                    target,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BleTransportError::ConnectionTimeout {
                    target,
                    timeout_ms: self.config.connection_timeout.as_millis() as u64,
                })
            }
        }

        if let Err(e) = self.peripheral.discover_services().await {
            self.disconnect_quietly().await;
            return Err(BleTransportError::ServiceDiscoveryFailed(e.to_string()));
        }

        let characteristics: HashMap<_, _> = self
            .peripheral
            .characteristics()
            .into_iter()
            .filter_map(|c| characteristic_for(c.uuid).map(|known| (known, c)))
            .collect();
        debug!("Belt {} exposes {} protocol characteristics", target, characteristics.len());

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let tasks = match self.spawn_pumps(&inbound_tx).await {
            Ok(tasks) => tasks,
            Err(e) => {
                self.disconnect_quietly().await;
                return Err(e);
            }
        };

        Ok(BleLink::new(
            self.peripheral.clone(),
            characteristics,
            self.config.clone(),
            inbound_tx,
            inbound_rx,
            tasks,
        ))
    }

    /// Forward notifications and watch for the peripheral disconnecting
    async fn spawn_pumps(
        &self,
        inbound_tx: &mpsc::UnboundedSender<InboundItem>,
    ) -> Result<Vec<JoinHandle<()>>, BleTransportError> {
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::NotificationStreamFailed(e.to_string()))?;
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        let tx = inbound_tx.clone();
        let notification_pump = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let Some(characteristic) = characteristic_for(notification.uuid) else {
                    debug!("Ignoring notification from {}", notification.uuid);
                    continue;
                };
                trace!("{} <- [{}]", characteristic, hex::encode(&notification.value));
                if tx
                    .send(InboundItem::Frame(RawFrame::new(characteristic, notification.value)))
                    .is_err()
                {
                    break;
                }
            }
            debug!("Notification stream ended");
        });

        let tx = inbound_tx.clone();
        let id = self.peripheral.id();
        let disconnect_watch = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == id {
                        warn!("Belt disconnected");
                        let _ = tx.send(InboundItem::Failed(TransportError::Closed));
                        break;
                    }
                }
            }
        });

        Ok(vec![notification_pump, disconnect_watch])
    }

    async fn disconnect_quietly(&self) {
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("Failed to disconnect from {}: {}", self.target(), e);
        }
    }
}

#[async_trait]
impl BeltConnector for BleConnector {
    fn transport_type(&self) -> TransportType {
        TransportType::Ble
    }

    fn target(&self) -> String {
        self.peripheral.address().to_string()
    }

    async fn open(&self) -> Result<Arc<dyn BeltTransport>, TransportError> {
        let link = self.connect().await?;
        Ok(Arc::new(link))
    }
}
