//! Scanning for belts

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{debug, info};

use crate::config::BleTransportConfig;
use crate::connection::BleConnector;
use crate::error::BleTransportError;
use crate::protocol::{is_belt_advertisement, BELT_SERVICE_UUIDS};

// ----------------------------------------------------------------------------
// Belt Scanner
// ----------------------------------------------------------------------------

/// Finds advertising belts on the first BLE adapter
pub struct BeltScanner {
    adapter: Adapter,
    config: BleTransportConfig,
}

impl BeltScanner {
    /// Initialize the first available adapter
    pub async fn new(config: BleTransportConfig) -> Result<Self, BleTransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleTransportError::ScanFailed(format!("Failed to create BLE manager: {}", e)))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BleTransportError::ScanFailed(format!("Failed to get BLE adapters: {}", e)))?
            .into_iter()
            .next()
            .ok_or(BleTransportError::AdapterNotAvailable)?;
        info!("BLE adapter initialized");
        Ok(Self { adapter, config })
    }

    pub fn with_adapter(adapter: Adapter, config: BleTransportConfig) -> Self {
        Self { adapter, config }
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan for the configured time and return a connector per belt found
    pub async fn scan(&self) -> Result<Vec<BleConnector>, BleTransportError> {
        self.scan_for(self.config.scan_timeout).await
    }

    pub async fn scan_for(&self, duration: Duration) -> Result<Vec<BleConnector>, BleTransportError> {
        let filter = ScanFilter {
            services: BELT_SERVICE_UUIDS.to_vec(),
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| BleTransportError::ScanFailed(format!("Failed to start BLE scan: {}", e)))?;
        debug!("Scanning for belts during {}ms", duration.as_millis());
        tokio::time::sleep(duration).await;
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop BLE scan: {}", e);
        }

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| BleTransportError::ScanFailed(format!("Failed to list peripherals: {}", e)))?;

        let mut belts = Vec::new();
        for peripheral in peripherals {
            if self.is_belt(&peripheral).await {
                belts.push(BleConnector::new(
                    self.adapter.clone(),
                    peripheral,
                    self.config.clone(),
                ));
            }
        }
        info!("Found {} belt(s)", belts.len());
        Ok(belts)
    }

    /// Scan and return the first belt found
    pub async fn find_first(&self) -> Result<Option<BleConnector>, BleTransportError> {
        Ok(self.scan().await?.into_iter().next())
    }

    async fn is_belt(&self, peripheral: &Peripheral) -> bool {
        match peripheral.properties().await {
            Ok(Some(properties)) => {
                let found = is_belt_advertisement(
                    &properties.services,
                    properties.local_name.as_deref(),
                    self.config.name_prefix.as_deref(),
                );
                if found {
                    debug!(
                        "Discovered belt {} ({})",
                        peripheral.address(),
                        properties.local_name.as_deref().unwrap_or("unnamed")
                    );
                }
                found
            }
            Ok(None) => false,
            Err(e) => {
                debug!("No properties for {}: {}", peripheral.address(), e);
                false
            }
        }
    }
}
