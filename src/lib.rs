//! # blehrm
//!
//! Unified streaming for Bluetooth Low Energy heart-rate monitors.
//!
//! Vendor firmwares encode heart-rate and accessory data (interbeat
//! intervals, accelerometer, raw ECG) in different binary layouts over the
//! same or similar GATT characteristics. `blehrm` normalizes those streams
//! into one typed sample schema so applications never carry vendor-specific
//! logic: a [`registry::Registry`] matches a discovered device to its family
//! by name, and the resulting [`reader::SensorReader`] decodes every
//! notification into [`types::IbiSample`] / [`types::AccSample`] /
//! [`types::EcgSample`] values delivered to callbacks in arrival order.
//!
//! ## Supported families
//!
//! | Family | Match | ibi | acc | ecg | Notes |
//! |---|---|---|---|---|---|
//! | `GarminHrmPro` | `"HRM-Pro"` | ✓ | ✗ | ✗ | standard HRM characteristic |
//! | `PolarH10` | `"Polar H10"` | ✓ | ✓ | ✓ | ACC/ECG via the Polar PMD protocol |
//! | `MockSensor` | `"Mock"` | ✓ | ✓ | ✗ | simulated, seedable, no hardware needed |
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use blehrm::prelude::*;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::with_defaults();
//!
//!     let devices = blehrm::ble::scan(Duration::from_secs(10)).await?;
//!     let descriptors: Vec<_> = devices.iter().map(|d| d.descriptor.clone()).collect();
//!     let matched = registry.match_all(&descriptors);
//!     println!("{}", registry.format_device_table(&matched));
//!
//!     let device = devices.first().expect("no device in range");
//!     let mut reader = registry.create_reader(&device.descriptor, Box::new(device.transport()))?;
//!     reader.connect().await?;
//!     reader
//!         .start_ibi_stream(|s| println!("{} ms", s.interbeat_interval_ms))
//!         .await?;
//!
//!     let mut notifications = reader.notification_stream().await?;
//!     while let Some((uuid, data)) = notifications.next().await {
//!         reader.handle_notification(uuid, &data)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Without hardware, build a reader over [`mock::MockTransport`] and feed it
//! payloads from a seeded [`mock::MockGenerator`] — the `--mock` mode of the
//! bundled CLI does exactly that.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`registry`] | Family table: name matching, capabilities, reader factory |
//! | [`reader`] | The uniform reader contract and the transport boundary |
//! | [`decode`] | Pure byte-to-sample decoders, one strategy per family |
//! | [`types`] | Sample, descriptor, and capability value types |
//! | [`protocol`] | GATT UUIDs and wire-format constants |
//! | [`ble`] | btleplug-backed scanning and transport |
//! | [`mock`] | Seeded signal generator and in-memory transport |
//! | [`error`] | Typed error taxonomy |

pub mod ble;
pub mod decode;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod reader;
pub mod registry;
pub mod types;

pub use error::{Error, Result};

/// Convenience re-exports for downstream crates.
///
/// Covers the surface needed to scan, match, connect, and stream:
///
/// ```no_run
/// use blehrm::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let registry = Registry::with_defaults();
/// let device = DeviceDescriptor::new("MockSensor-1", "mock:01");
/// let (transport, _handle) = MockTransport::new();
/// let mut reader = registry.create_reader(&device, Box::new(transport))?;
/// reader.connect().await?;
/// reader
///     .start_ibi_stream(|s| println!("{} ms", s.interbeat_interval_ms))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // ── Registry & reader ────────────────────────────────────────────────────
    pub use crate::reader::{ReaderState, SensorReader, Transport};
    pub use crate::registry::Registry;

    // ── Value types ──────────────────────────────────────────────────────────
    pub use crate::types::{
        AccSample, CapabilitySet, DeviceDescriptor, DeviceInfo, EcgSample, IbiSample, StreamKind,
    };

    // ── Transports ───────────────────────────────────────────────────────────
    pub use crate::ble::{BleTransport, DiscoveredDevice};
    pub use crate::mock::{MockGenerator, MockTransport};

    // ── Errors ───────────────────────────────────────────────────────────────
    pub use crate::error::{Error, Result};
}
