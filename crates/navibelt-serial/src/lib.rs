//! USB-serial transport for the navigation belt
//!
//! Implements `BeltConnector` and `BeltTransport` from `navibelt-core` over
//! any tokio byte stream using the serial record framing. The belt's USB
//! interface is reached through [`SerialPortOpener`]; tests and bridges can
//! implement [`OpenPort`] for their own streams.
//!
//! ```rust,no_run
//! use navibelt_runtime::{BeltConfig, BeltController};
//! use navibelt_serial::{SerialConnector, SerialTransportConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let belt = SerialConnector::for_device("/dev/ttyACM0", SerialTransportConfig::default());
//! let controller = BeltController::new(BeltConfig::default())?;
//! controller.connect(Arc::new(belt)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod port;
pub mod transport;

pub use config::{SerialTransportConfig, DEFAULT_BAUD_RATE};
pub use error::SerialTransportError;
pub use port::{OpenPort, SerialPortOpener};
pub use transport::{SerialConnector, SerialLink};
