//! GATT UUIDs, wire-format constants, and mock-signal parameters.
//!
//! The standard characteristics come from the Bluetooth SIG assigned numbers
//! (16-bit IDs expanded into the SIG base UUID); the PMD characteristics
//! belong to Polar's vendor namespace `fb00XXXX-02e7-f387-1cad-8acd2d8df0c8`.

use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

// ── Standard SIG services & characteristics ──────────────────────────────────

/// Heart Rate service (0x180D). Advertised by every supported chest strap.
pub const HEART_RATE_SERVICE_UUID: Uuid = uuid_from_u16(0x180D);

/// Heart Rate Measurement characteristic (0x2A37).
///
/// Notification payload: a flags byte, a 1- or 2-byte heart-rate value, and
/// optionally a run of 16-bit little-endian RR intervals. See
/// [`crate::decode::decode_rr_intervals`] for the exact layout.
pub const HEART_RATE_MEASUREMENT_UUID: Uuid = uuid_from_u16(0x2A37);

/// Battery Level characteristic (0x2A19) — a single byte, percent.
pub const BATTERY_LEVEL_UUID: Uuid = uuid_from_u16(0x2A19);

/// Manufacturer Name String characteristic (0x2A29), UTF-8.
pub const MANUFACTURER_NAME_UUID: Uuid = uuid_from_u16(0x2A29);

/// Model Number String characteristic (0x2A24), UTF-8.
pub const MODEL_NBR_UUID: Uuid = uuid_from_u16(0x2A24);

// ── Heart Rate Measurement flag bits ─────────────────────────────────────────

/// Flags bit 0: heart-rate value field is 2 bytes (u16 LE) instead of 1.
pub const HRM_FLAG_HR_16BIT: u8 = 0x01;

/// Flags bit 4: one or more RR-interval fields follow the heart-rate value.
pub const HRM_FLAG_RR_PRESENT: u8 = 0x10;

// ── Polar PMD (measurement data) protocol ────────────────────────────────────

/// PMD control point. Streams are armed/stopped by writing request frames
/// here before subscribing to [`PMD_DATA_UUID`].
pub const PMD_CONTROL_UUID: Uuid = Uuid::from_u128(0xfb005c81_02e7_f387_1cad_8acd2d8df0c8);

/// PMD data characteristic. Carries *both* ACC and ECG frames; the first
/// payload byte tells them apart.
pub const PMD_DATA_UUID: Uuid = Uuid::from_u128(0xfb005c82_02e7_f387_1cad_8acd2d8df0c8);

/// PMD frame layout: `[type u8][device timestamp u64 LE][frame type u8][samples…]`.
/// Sample data starts at byte 10.
pub const PMD_HEADER_LEN: usize = 10;

/// Byte offset of the frame-type byte inside a PMD data frame.
pub const PMD_FRAME_TYPE_OFFSET: usize = 9;

/// PMD measurement type: ECG.
pub const PMD_TYPE_ECG: u8 = 0x00;

/// PMD measurement type: accelerometer.
pub const PMD_TYPE_ACC: u8 = 0x02;

/// ACC frame type carrying 16-bit samples (the only resolution requested by
/// [`PMD_ACC_START`]).
pub const PMD_ACC_FRAME_16BIT: u8 = 0x01;

/// Start-measurement request for ECG at 130 Hz / 14-bit resolution.
///
/// Layout: `[0x02 = start, 0x00 = ecg]` followed by setting TLVs
/// (`0x00` sample rate = 130 Hz u16 LE, `0x01` resolution = 14 bit u16 LE).
pub const PMD_ECG_START: [u8; 10] = [0x02, 0x00, 0x00, 0x01, 0x82, 0x00, 0x01, 0x01, 0x0e, 0x00];

/// Start-measurement request for ACC at 200 Hz / 16-bit / ±8 G.
///
/// Layout: `[0x02 = start, 0x02 = acc]` followed by setting TLVs
/// (`0x00` sample rate = 200 Hz, `0x01` resolution = 16 bit, `0x02` range = 8 G).
pub const PMD_ACC_START: [u8; 14] = [
    0x02, 0x02, 0x00, 0x01, 0xc8, 0x00, 0x01, 0x01, 0x10, 0x00, 0x02, 0x01, 0x08, 0x00,
];

/// Stop-measurement request for ECG.
pub const PMD_ECG_STOP: [u8; 2] = [0x03, 0x00];

/// Stop-measurement request for ACC.
pub const PMD_ACC_STOP: [u8; 2] = [0x03, 0x02];

// ── Mock sensor ──────────────────────────────────────────────────────────────

/// Private characteristic carrying the mock family's accelerometer payloads
/// (`3 × f32 LE`). Not a SIG assignment; only ever seen on [`crate::mock::MockTransport`].
pub const MOCK_ACC_UUID: Uuid = Uuid::from_u128(0x6d6f636b_0001_1000_8000_00805f9b34fb);

/// Bounds of the simulated interbeat interval, seconds.
pub const MOCK_IBI_MIN_SECS: f64 = 0.8;
pub const MOCK_IBI_MAX_SECS: f64 = 1.3;

/// Fixed sampling interval of the simulated accelerometer.
pub const MOCK_ACC_INTERVAL_SECS: f64 = 0.01;

/// Frequency of the sinusoid on the simulated X/Y axes, Hz.
pub const MOCK_ACC_SINE_HZ: f64 = 2.0;

/// Amplitude bound of the uniform noise on the simulated Z axis.
pub const MOCK_ACC_NOISE: f32 = 0.1;
