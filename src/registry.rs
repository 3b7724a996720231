//! The capability registry: a static, append-only table mapping device
//! families to name predicates, declared capabilities, and decoder factories.
//!
//! Registration happens explicitly during process initialization (see
//! [`Registry::with_defaults`]) in a deterministic order; resolution walks
//! the table in that order and the **first matching predicate wins**. Two
//! families may both match a name — that ambiguity is tolerated by design
//! and always resolved by registration order, which keeps resolution a
//! single O(families) pass. The table is immutable once built and may be
//! consulted concurrently without synchronization.

use std::sync::Arc;

use log::debug;

use crate::decode::{GarminHrmPro, MockSensor, PolarH10, SensorDecoder};
use crate::error::{Error, Result};
use crate::reader::{SensorReader, Transport};
use crate::types::{CapabilitySet, DeviceDescriptor};

/// One registered device family. Created once at process start, immutable
/// afterward, never removed.
pub struct FamilyRegistration {
    /// Stable identifier (e.g. `"PolarH10"`).
    pub id: &'static str,
    /// Predicate over the advertised device name.
    matches: fn(&str) -> bool,
    /// Declared capabilities — `true` iff the family ships a real decoder
    /// for that stream. Declared, not introspected.
    pub capabilities: CapabilitySet,
    factory: fn() -> Arc<dyn SensorDecoder>,
}

/// Registry of supported device families.
pub struct Registry {
    families: Vec<FamilyRegistration>,
}

impl Registry {
    /// An empty registry. Most callers want [`Registry::with_defaults`].
    pub fn new() -> Self {
        Self {
            families: Vec::new(),
        }
    }

    /// The built-in families, registered in a fixed order:
    /// `GarminHrmPro`, `PolarH10`, `MockSensor`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "GarminHrmPro",
            GarminHrmPro::is_supported,
            CapabilitySet::IBI_ONLY,
            || Arc::new(GarminHrmPro),
        );
        registry.register(
            "PolarH10",
            PolarH10::is_supported,
            CapabilitySet {
                ibi: true,
                acc: true,
                ecg: true,
            },
            || Arc::new(PolarH10),
        );
        registry.register(
            "MockSensor",
            MockSensor::is_supported,
            CapabilitySet {
                ibi: true,
                acc: true,
                ecg: false,
            },
            || Arc::new(MockSensor),
        );
        registry
    }

    /// Append a family. Order of `register` calls is the resolution order.
    pub fn register(
        &mut self,
        id: &'static str,
        matches: fn(&str) -> bool,
        capabilities: CapabilitySet,
        factory: fn() -> Arc<dyn SensorDecoder>,
    ) {
        debug!("registering family {id} ({capabilities})");
        self.families.push(FamilyRegistration {
            id,
            matches,
            capabilities,
            factory,
        });
    }

    /// Identifiers of all registered families, in registration order.
    pub fn family_ids(&self) -> Vec<&'static str> {
        self.families.iter().map(|f| f.id).collect()
    }

    /// Resolve a device to the first registered family whose predicate
    /// matches its advertised name. Purely a function of `device.name` and
    /// the table; an empty name never matches.
    pub fn match_device(&self, device: &DeviceDescriptor) -> Option<&'static str> {
        if device.name.is_empty() {
            return None;
        }
        self.families
            .iter()
            .find(|f| (f.matches)(&device.name))
            .map(|f| f.id)
    }

    /// Resolve many devices, keeping only the supported ones, in input order.
    pub fn match_all<'a>(
        &self,
        devices: &'a [DeviceDescriptor],
    ) -> Vec<(&'a DeviceDescriptor, &'static str)> {
        devices
            .iter()
            .filter_map(|d| self.match_device(d).map(|id| (d, id)))
            .collect()
    }

    /// Declared capabilities of a family, or [`Error::UnknownFamily`] if no
    /// such family was ever registered.
    pub fn capabilities_of(&self, family_id: &str) -> Result<CapabilitySet> {
        self.families
            .iter()
            .find(|f| f.id == family_id)
            .map(|f| f.capabilities)
            .ok_or_else(|| Error::UnknownFamily {
                family_id: family_id.to_owned(),
            })
    }

    /// Resolve `device` and construct a [`SensorReader`] binding the matched
    /// family's decoder to `transport`. Fails with
    /// [`Error::DeviceNotSupported`] when no predicate matches; the failure
    /// is fatal to this call only.
    pub fn create_reader(
        &self,
        device: &DeviceDescriptor,
        transport: Box<dyn Transport>,
    ) -> Result<SensorReader> {
        let family = self
            .families
            .iter()
            .find(|f| !device.name.is_empty() && (f.matches)(&device.name))
            .ok_or_else(|| Error::DeviceNotSupported {
                device_name: device.name.clone(),
            })?;
        debug!("{device}: matched family {}", family.id);
        Ok(SensorReader::new(
            device.clone(),
            (family.factory)(),
            family.capabilities,
            transport,
        ))
    }

    /// Render discovered-and-supported devices as an aligned console table
    /// with columns Name, Address, Family, Services.
    pub fn format_device_table(&self, matches: &[(&DeviceDescriptor, &'static str)]) -> String {
        if matches.is_empty() {
            return "No supported devices found.".to_owned();
        }

        let header = ["Name", "Address", "Family", "Services"];
        let rows: Vec<[String; 4]> = matches
            .iter()
            .map(|(device, family_id)| {
                let services = self
                    .capabilities_of(family_id)
                    .map(|c| c.service_names().join(", "))
                    .unwrap_or_default();
                [
                    device.name.clone(),
                    device.address.clone(),
                    (*family_id).to_owned(),
                    services,
                ]
            })
            .collect();

        let widths: Vec<usize> = (0..4)
            .map(|col| {
                rows.iter()
                    .map(|r| r[col].len())
                    .chain([header[col].len()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        for (col, name) in header.iter().enumerate() {
            out.push_str(&format!("{name:<width$}  ", width = widths[col]));
        }
        out.push('\n');
        for (col, &width) in widths.iter().enumerate() {
            out.push_str(&"-".repeat(width));
            if col < 3 {
                out.push_str("  ");
            }
        }
        for row in &rows {
            out.push('\n');
            for (col, cell) in row.iter().enumerate() {
                out.push_str(&format!("{cell:<width$}  ", width = widths[col]));
            }
        }
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn device(name: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(name, "00:11:22:33:44:55")
    }

    fn family_a() -> Arc<dyn SensorDecoder> {
        Arc::new(GarminHrmPro)
    }

    fn matches_hrm(name: &str) -> bool {
        name.contains("HRM")
    }

    fn matches_mock(name: &str) -> bool {
        name.contains("Mock")
    }

    fn matches_anything(_name: &str) -> bool {
        true
    }

    #[test]
    fn two_families_match_all_preserves_input_order() {
        let mut registry = Registry::new();
        registry.register("FamilyA", matches_hrm, CapabilitySet::IBI_ONLY, family_a);
        registry.register("FamilyB", matches_mock, CapabilitySet::IBI_ONLY, family_a);

        let devices = vec![device("Garmin HRM-Pro"), device("MockSensor-1")];
        let matched = registry.match_all(&devices);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0], (&devices[0], "FamilyA"));
        assert_eq!(matched[1], (&devices[1], "FamilyB"));
    }

    #[test]
    fn unsupported_devices_are_filtered_out() {
        let registry = Registry::with_defaults();
        let devices = vec![device("Totally Unknown"), device("Polar H10 B12345")];
        let matched = registry.match_all(&devices);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].1, "PolarH10");
    }

    #[test]
    fn first_registered_predicate_wins_on_ambiguity() {
        let mut registry = Registry::new();
        registry.register("First", matches_hrm, CapabilitySet::IBI_ONLY, family_a);
        registry.register("Second", matches_hrm, CapabilitySet::IBI_ONLY, family_a);
        assert_eq!(registry.match_device(&device("HRM thing")), Some("First"));
    }

    #[test]
    fn empty_name_never_matches() {
        let mut registry = Registry::new();
        registry.register("Any", matches_anything, CapabilitySet::IBI_ONLY, family_a);
        assert_eq!(registry.match_device(&device("")), None);
    }

    #[test]
    fn capabilities_reflect_registration_declaration() {
        let registry = Registry::with_defaults();

        let garmin = registry.capabilities_of("GarminHrmPro").unwrap();
        assert!(garmin.ibi && !garmin.acc && !garmin.ecg);

        let polar = registry.capabilities_of("PolarH10").unwrap();
        assert!(polar.ibi && polar.acc && polar.ecg);

        let mock = registry.capabilities_of("MockSensor").unwrap();
        assert!(mock.ibi && mock.acc && !mock.ecg);
    }

    #[test]
    fn unknown_family_lookup_is_an_error() {
        let registry = Registry::with_defaults();
        let err = registry.capabilities_of("NoSuchFamily").unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownFamily { family_id } if family_id == "NoSuchFamily"
        ));
    }

    #[test]
    fn create_reader_names_the_unsupported_device() {
        let registry = Registry::with_defaults();
        let (transport, _handle) = MockTransport::new();
        let err = registry
            .create_reader(&device("Acme Toaster"), Box::new(transport))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotSupported { device_name } if device_name == "Acme Toaster"
        ));
    }

    #[test]
    fn create_reader_binds_family_and_capabilities() {
        let registry = Registry::with_defaults();
        let (transport, _handle) = MockTransport::new();
        let reader = registry
            .create_reader(&device("Polar H10 B12345"), Box::new(transport))
            .unwrap();
        assert_eq!(reader.family_id(), "PolarH10");
        assert!(reader.capabilities().ecg);
    }

    #[test]
    fn device_table_lists_services_per_family() {
        let registry = Registry::with_defaults();
        let devices = vec![device("Garmin HRM-Pro"), device("MockSensor-1")];
        let matched = registry.match_all(&devices);
        let table = registry.format_device_table(&matched);

        assert!(table.contains("Name"));
        assert!(table.contains("Garmin HRM-Pro"));
        assert!(table.contains("GarminHrmPro"));
        assert!(table.contains("ibi, acc"));

        assert_eq!(
            registry.format_device_table(&[]),
            "No supported devices found."
        );
    }
}
