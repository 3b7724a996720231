use std::fmt;

/// Identity of a discovered BLE peripheral, as reported by the transport layer.
///
/// Used only for family matching and logging; the registry never inspects
/// anything beyond `name`. Matching an empty name always fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Advertised local name (e.g. `"Garmin HRM-Pro"`, `"Polar H10 B12345"`).
    pub name: String,
    /// Platform BLE identifier.
    /// • macOS / Windows — a UUID string
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub address: String,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// One of the three sample streams a device family can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Interbeat intervals (RR intervals) in milliseconds.
    Ibi,
    /// 3-axis accelerometer samples in sensor-native units.
    Acc,
    /// Raw ECG samples in a family-specific unit.
    Ecg,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Ibi => "ibi",
            StreamKind::Acc => "acc",
            StreamKind::Ecg => "ecg",
        })
    }
}

/// Which streams a device family supports.
///
/// Declared explicitly when a family is registered — a flag is `true` iff the
/// family ships a real decoder for that stream, never derived by probing which
/// trait methods happen to be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub ibi: bool,
    pub acc: bool,
    pub ecg: bool,
}

impl CapabilitySet {
    /// The minimum any family must support.
    pub const IBI_ONLY: CapabilitySet = CapabilitySet {
        ibi: true,
        acc: false,
        ecg: false,
    };

    pub fn supports(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Ibi => self.ibi,
            StreamKind::Acc => self.acc,
            StreamKind::Ecg => self.ecg,
        }
    }

    /// Names of the supported streams, in `ibi`, `acc`, `ecg` order.
    pub fn service_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.ibi {
            names.push("ibi");
        }
        if self.acc {
            names.push("acc");
        }
        if self.ecg {
            names.push("ecg");
        }
        names
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_names().join(", "))
    }
}

/// One decoded interbeat interval.
///
/// A single Heart Rate Measurement notification may carry several RR fields,
/// so one notification can yield 0, 1, or many of these. All samples from the
/// same notification share the decode-time timestamp — an acknowledged
/// precision limitation of stamping at decode time rather than reconstructing
/// per-sample device ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IbiSample {
    /// Wall-clock capture instant, seconds since Unix epoch.
    pub timestamp: f64,
    /// Interbeat (RR) interval in milliseconds.
    pub interbeat_interval_ms: u16,
}

/// One decoded 3-axis accelerometer sample.
///
/// Values are in whatever unit the source vendor reports (mG for Polar H10,
/// unitless for the mock sinusoid); cross-vendor unit normalization is
/// explicitly out of scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccSample {
    /// Wall-clock capture instant, seconds since Unix epoch.
    pub timestamp: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One decoded raw ECG sample in a family-specific unit (µV for Polar H10).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcgSample {
    /// Wall-clock capture instant, seconds since Unix epoch.
    pub timestamp: f64,
    pub value: i32,
}

/// Human-readable device identity read from the Device Information and
/// Battery services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model_number: String,
    pub manufacturer_name: String,
    /// Battery state of charge, percent (0–100).
    pub battery_level: u8,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model No.: {}\nManufacturer: {}\nBattery: {}%",
            self.model_number, self.manufacturer_name, self.battery_level
        )
    }
}
