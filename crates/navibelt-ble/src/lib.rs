//! Bluetooth Low Energy transport for the navigation belt
//!
//! Implements the `BeltConnector` and `BeltTransport` traits from
//! `navibelt-core` on top of `btleplug`:
//!
//! - [`config`] - transport configuration
//! - [`error`] - error types specific to the BLE transport
//! - [`protocol`] - service UUIDs and characteristic lookup
//! - [`discovery`] - scanning for advertising belts
//! - [`connection`] - opening a link to a belt
//! - [`transport`] - link operations on a connected belt
//!
//! ## Usage
//!
//! ```rust,no_run
//! use navibelt_ble::{BeltScanner, BleTransportConfig};
//! use navibelt_runtime::{BeltConfig, BeltController};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = BeltScanner::new(BleTransportConfig::default()).await?;
//! if let Some(belt) = scanner.find_first().await? {
//!     let controller = BeltController::new(BeltConfig::default())?;
//!     controller.connect(Arc::new(belt)).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::BleTransportConfig;
pub use connection::BleConnector;
pub use discovery::BeltScanner;
pub use error::BleTransportError;
pub use protocol::{BELT_SERVICE_UUID, BELT_SERVICE_UUIDS, LEGACY_BELT_SERVICE_UUID};
pub use transport::BleLink;
