//! Binary decoders for heart-rate-monitor notification payloads.
//!
//! All decode functions are pure: no I/O, no allocation beyond the returned
//! collections, and total over arbitrary input — a short or malformed payload
//! yields an empty sequence, never an out-of-range fault. The capture instant
//! is passed in by the caller so decoders stay deterministic under test.
//!
//! # Family layouts
//!
//! | Family | IBI | ACC | ECG |
//! |---|---|---|---|
//! | [`GarminHrmPro`] | standard HRM (0x2A37) | — | — |
//! | [`PolarH10`] | standard HRM (0x2A37) | PMD frame, 3 × i16 LE mG | PMD frame, i24 LE µV |
//! | [`MockSensor`] | standard HRM (0x2A37) | 12-byte `3 × f32 LE` | — |

use log::{debug, warn};
use uuid::Uuid;

use crate::protocol::{
    HEART_RATE_MEASUREMENT_UUID, HRM_FLAG_HR_16BIT, HRM_FLAG_RR_PRESENT, MOCK_ACC_UUID,
    PMD_ACC_FRAME_16BIT, PMD_ACC_START, PMD_ACC_STOP, PMD_CONTROL_UUID, PMD_DATA_UUID,
    PMD_ECG_START, PMD_ECG_STOP, PMD_FRAME_TYPE_OFFSET, PMD_HEADER_LEN, PMD_TYPE_ACC,
    PMD_TYPE_ECG,
};
use crate::types::{AccSample, EcgSample, IbiSample, StreamKind};

// ── Standard Heart Rate Measurement characteristic ───────────────────────────

/// Decode the RR-interval fields of a Heart Rate Measurement notification.
///
/// Layout (Bluetooth SIG, characteristic 0x2A37):
///
/// | Bytes | Field |
/// |---|---|
/// | 0 | flags: bit 0 = 16-bit heart-rate value, bit 4 = RR intervals present |
/// | 1 (or 1–2) | heart-rate value, width per flags bit 0 |
/// | rest | consecutive u16 LE RR intervals, milliseconds |
///
/// The RR region starts at offset 2 (8-bit heart rate) or 3 (16-bit). Values
/// are read low byte first; a trailing odd byte beyond full 2-byte groups is
/// ignored. When bit 4 is clear, or the payload ends before the RR region,
/// the result is empty — not an error.
///
/// Every sample is stamped with the caller-supplied `now` (seconds since
/// epoch): a multi-RR notification legitimately produces several samples
/// sharing one capture instant.
///
/// ```
/// use blehrm::decode::decode_rr_intervals;
///
/// // flags 0b00010000 (8-bit HR, RR present), HR 72, RR 300 then 500 ms
/// let samples = decode_rr_intervals(0.0, &[0x10, 0x48, 0x2c, 0x01, 0xf4, 0x01]);
/// let ms: Vec<u16> = samples.iter().map(|s| s.interbeat_interval_ms).collect();
/// assert_eq!(ms, [300, 500]);
/// ```
pub fn decode_rr_intervals(now: f64, data: &[u8]) -> Vec<IbiSample> {
    let Some(&flags) = data.first() else {
        warn!("HRM payload is empty");
        return Vec::new();
    };

    if flags & HRM_FLAG_RR_PRESENT == 0 {
        debug!("HRM payload carries no RR intervals (flags: {flags:08b})");
        return Vec::new();
    }

    let rr_start = if flags & HRM_FLAG_HR_16BIT == 0 { 2 } else { 3 };
    if rr_start >= data.len() {
        warn!(
            "HRM payload too short for RR region: len {}, RR start {rr_start}",
            data.len()
        );
        return Vec::new();
    }

    data[rr_start..]
        .chunks_exact(2)
        .map(|c| IbiSample {
            timestamp: now,
            interbeat_interval_ms: u16::from_le_bytes([c[0], c[1]]),
        })
        .collect()
}

/// Decode a UTF-8 string characteristic (model number, manufacturer name).
pub fn decode_utf8_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .trim()
        .to_owned()
}

/// Decode a Battery Level characteristic read — a single percent byte.
pub fn decode_battery_level(data: &[u8]) -> u8 {
    data.first().copied().unwrap_or(0)
}

// ── Decoder contract ─────────────────────────────────────────────────────────

/// Per-family decoding strategy: payload layouts, characteristic routing, and
/// the control writes (if any) that arm a stream.
///
/// Families differ only here; the connection/streaming lifecycle is owned by
/// [`crate::reader::SensorReader`], which drives any `dyn SensorDecoder`.
/// Optional streams default to producing nothing — whether a family actually
/// supports one is declared as an explicit [`crate::types::CapabilitySet`]
/// at registration, never probed from which methods are overridden.
pub trait SensorDecoder: Send + Sync {
    /// Stable identifier of the family, as used by the registry.
    fn family_id(&self) -> &'static str;

    /// Map an inbound notification to the stream it belongs to.
    ///
    /// `data` is available because some vendors multiplex streams on one
    /// characteristic (Polar PMD distinguishes ACC from ECG by the first
    /// payload byte). Returning `None` drops the notification.
    fn route(&self, characteristic: Uuid, data: &[u8]) -> Option<StreamKind> {
        let _ = data;
        (characteristic == HEART_RATE_MEASUREMENT_UUID).then_some(StreamKind::Ibi)
    }

    /// The characteristic to subscribe to for a given stream, or `None` when
    /// the family does not carry that stream over the transport.
    fn characteristic(&self, kind: StreamKind) -> Option<Uuid> {
        match kind {
            StreamKind::Ibi => Some(HEART_RATE_MEASUREMENT_UUID),
            StreamKind::Acc | StreamKind::Ecg => None,
        }
    }

    /// Control write to perform before subscribing, `(characteristic, payload)`.
    fn start_command(&self, kind: StreamKind) -> Option<(Uuid, Vec<u8>)> {
        let _ = kind;
        None
    }

    /// Control write to perform when stopping a stream.
    fn stop_command(&self, kind: StreamKind) -> Option<(Uuid, Vec<u8>)> {
        let _ = kind;
        None
    }

    /// Decode an IBI notification. Required for every family.
    fn decode_ibi(&self, now: f64, data: &[u8]) -> Vec<IbiSample>;

    /// Decode an accelerometer notification. Families without the `acc`
    /// capability leave the default, which produces nothing.
    fn decode_acc(&self, now: f64, data: &[u8]) -> Vec<AccSample> {
        let _ = (now, data);
        Vec::new()
    }

    /// Decode an ECG notification. Families without the `ecg` capability
    /// leave the default, which produces nothing.
    fn decode_ecg(&self, now: f64, data: &[u8]) -> Vec<EcgSample> {
        let _ = (now, data);
        Vec::new()
    }
}

// ── Garmin HRM-Pro ───────────────────────────────────────────────────────────

/// Garmin HRM-Pro / HRM-Pro Plus chest straps. IBI only, over the standard
/// Heart Rate Measurement characteristic.
pub struct GarminHrmPro;

impl GarminHrmPro {
    pub fn is_supported(device_name: &str) -> bool {
        device_name.contains("HRM-Pro")
    }
}

impl SensorDecoder for GarminHrmPro {
    fn family_id(&self) -> &'static str {
        "GarminHrmPro"
    }

    fn decode_ibi(&self, now: f64, data: &[u8]) -> Vec<IbiSample> {
        decode_rr_intervals(now, data)
    }
}

// ── Polar H10 ────────────────────────────────────────────────────────────────

/// Polar H10 chest strap. IBI over the standard Heart Rate Measurement
/// characteristic; ACC and ECG over Polar's proprietary PMD protocol.
///
/// Both PMD streams share one data characteristic
/// ([`crate::protocol::PMD_DATA_UUID`]); frames are told apart by their first
/// byte (`0x00` ECG, `0x02` ACC). A stream is armed by writing a
/// start-measurement request to the PMD control point before subscribing.
pub struct PolarH10;

impl PolarH10 {
    pub fn is_supported(device_name: &str) -> bool {
        device_name.contains("Polar H10")
    }
}

impl SensorDecoder for PolarH10 {
    fn family_id(&self) -> &'static str {
        "PolarH10"
    }

    fn route(&self, characteristic: Uuid, data: &[u8]) -> Option<StreamKind> {
        if characteristic == HEART_RATE_MEASUREMENT_UUID {
            return Some(StreamKind::Ibi);
        }
        if characteristic != PMD_DATA_UUID {
            return None;
        }
        match data.first() {
            Some(&PMD_TYPE_ECG) => Some(StreamKind::Ecg),
            Some(&PMD_TYPE_ACC) => Some(StreamKind::Acc),
            other => {
                debug!("PMD frame with unknown measurement type {other:?}");
                None
            }
        }
    }

    fn characteristic(&self, kind: StreamKind) -> Option<Uuid> {
        match kind {
            StreamKind::Ibi => Some(HEART_RATE_MEASUREMENT_UUID),
            StreamKind::Acc | StreamKind::Ecg => Some(PMD_DATA_UUID),
        }
    }

    fn start_command(&self, kind: StreamKind) -> Option<(Uuid, Vec<u8>)> {
        match kind {
            StreamKind::Ibi => None,
            StreamKind::Acc => Some((PMD_CONTROL_UUID, PMD_ACC_START.to_vec())),
            StreamKind::Ecg => Some((PMD_CONTROL_UUID, PMD_ECG_START.to_vec())),
        }
    }

    fn stop_command(&self, kind: StreamKind) -> Option<(Uuid, Vec<u8>)> {
        match kind {
            StreamKind::Ibi => None,
            StreamKind::Acc => Some((PMD_CONTROL_UUID, PMD_ACC_STOP.to_vec())),
            StreamKind::Ecg => Some((PMD_CONTROL_UUID, PMD_ECG_STOP.to_vec())),
        }
    }

    fn decode_ibi(&self, now: f64, data: &[u8]) -> Vec<IbiSample> {
        decode_rr_intervals(now, data)
    }

    /// PMD ACC frame: 10-byte header, then `3 × i16 LE` (x, y, z) per sample,
    /// in mG. Only the 16-bit frame type requested by
    /// [`crate::protocol::PMD_ACC_START`] is decoded; a trailing partial
    /// sample is ignored.
    fn decode_acc(&self, now: f64, data: &[u8]) -> Vec<AccSample> {
        let Some(body) = pmd_frame_body(data, PMD_TYPE_ACC) else {
            return Vec::new();
        };
        if data[PMD_FRAME_TYPE_OFFSET] != PMD_ACC_FRAME_16BIT {
            warn!(
                "PMD ACC frame type 0x{:02x} is not 16-bit, skipping",
                data[PMD_FRAME_TYPE_OFFSET]
            );
            return Vec::new();
        }
        body.chunks_exact(6)
            .map(|c| AccSample {
                timestamp: now,
                x: i16::from_le_bytes([c[0], c[1]]) as f32,
                y: i16::from_le_bytes([c[2], c[3]]) as f32,
                z: i16::from_le_bytes([c[4], c[5]]) as f32,
            })
            .collect()
    }

    /// PMD ECG frame: 10-byte header, then one signed 24-bit LE µV value per
    /// sample at 130 Hz. A trailing partial sample is ignored.
    fn decode_ecg(&self, now: f64, data: &[u8]) -> Vec<EcgSample> {
        let Some(body) = pmd_frame_body(data, PMD_TYPE_ECG) else {
            return Vec::new();
        };
        body.chunks_exact(3)
            .map(|c| EcgSample {
                timestamp: now,
                value: read_i24_le(c),
            })
            .collect()
    }
}

/// Validate a PMD frame header and return the sample region, or `None` when
/// the frame is short or of the wrong measurement type.
fn pmd_frame_body(data: &[u8], expected_type: u8) -> Option<&[u8]> {
    if data.len() <= PMD_HEADER_LEN {
        warn!("PMD frame too short: {} bytes", data.len());
        return None;
    }
    if data[0] != expected_type {
        debug!(
            "PMD frame type 0x{:02x} does not match expected 0x{expected_type:02x}",
            data[0]
        );
        return None;
    }
    Some(&data[PMD_HEADER_LEN..])
}

/// Sign-extend a 3-byte little-endian value.
fn read_i24_le(c: &[u8]) -> i32 {
    let raw = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
    (raw << 8) >> 8
}

// ── Mock sensor ──────────────────────────────────────────────────────────────

/// Simulated chest strap used to validate the streaming contract without
/// hardware. IBI payloads reuse the standard HRM layout; ACC payloads are a
/// private 12-byte `3 × f32 LE` layout on [`crate::protocol::MOCK_ACC_UUID`].
///
/// The matching signal source is [`crate::mock::MockGenerator`], which
/// produces payloads with the documented statistical shape (bounded-random
/// IBI inter-arrival, sinusoid-plus-noise ACC) from a seedable RNG.
pub struct MockSensor;

impl MockSensor {
    pub fn is_supported(device_name: &str) -> bool {
        device_name.contains("Mock")
    }
}

impl SensorDecoder for MockSensor {
    fn family_id(&self) -> &'static str {
        "MockSensor"
    }

    fn route(&self, characteristic: Uuid, _data: &[u8]) -> Option<StreamKind> {
        if characteristic == HEART_RATE_MEASUREMENT_UUID {
            Some(StreamKind::Ibi)
        } else if characteristic == MOCK_ACC_UUID {
            Some(StreamKind::Acc)
        } else {
            None
        }
    }

    fn characteristic(&self, kind: StreamKind) -> Option<Uuid> {
        match kind {
            StreamKind::Ibi => Some(HEART_RATE_MEASUREMENT_UUID),
            StreamKind::Acc => Some(MOCK_ACC_UUID),
            StreamKind::Ecg => None,
        }
    }

    fn decode_ibi(&self, now: f64, data: &[u8]) -> Vec<IbiSample> {
        decode_rr_intervals(now, data)
    }

    fn decode_acc(&self, now: f64, data: &[u8]) -> Vec<AccSample> {
        if data.len() < 12 {
            warn!("mock ACC payload too short: {} bytes", data.len());
            return Vec::new();
        }
        data.chunks_exact(12)
            .map(|c| AccSample {
                timestamp: now,
                x: f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                y: f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                z: f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: f64 = 1_700_000_000.0;

    fn ibi_values(samples: &[IbiSample]) -> Vec<u16> {
        samples.iter().map(|s| s.interbeat_interval_ms).collect()
    }

    #[test]
    fn rr_intervals_8bit_hr_two_values() {
        // flags 0b00010000, HR 72, RR 300 (0x012c) then 500 (0x01f4)
        let data = [0x10, 72, 0x2c, 0x01, 0xf4, 0x01];
        let samples = decode_rr_intervals(NOW, &data);
        assert_eq!(ibi_values(&samples), [300, 500]);
        assert!(samples.iter().all(|s| s.timestamp == NOW));
    }

    #[test]
    fn rr_intervals_16bit_hr_shifts_region() {
        // flags bit 0 set: HR is u16 LE, RR region starts at offset 3
        let data = [0x11, 0x48, 0x00, 0xe8, 0x03];
        assert_eq!(ibi_values(&decode_rr_intervals(NOW, &data)), [1000]);
    }

    #[test]
    fn no_rr_flag_yields_empty_regardless_of_trailing_bytes() {
        let data = [0x00, 72, 0x2c, 0x01, 0xf4, 0x01];
        assert!(decode_rr_intervals(NOW, &data).is_empty());
    }

    #[test]
    fn short_payload_yields_empty_not_a_fault() {
        assert!(decode_rr_intervals(NOW, &[]).is_empty());
        assert!(decode_rr_intervals(NOW, &[0x10]).is_empty());
        assert!(decode_rr_intervals(NOW, &[0x10, 72]).is_empty());
        // 16-bit HR claimed, but the payload ends inside the heart-rate field
        assert!(decode_rr_intervals(NOW, &[0x11, 72]).is_empty());
    }

    #[test]
    fn trailing_odd_byte_is_ignored() {
        let data = [0x10, 72, 0x2c, 0x01, 0xff];
        assert_eq!(ibi_values(&decode_rr_intervals(NOW, &data)), [300]);
    }

    #[test]
    fn polar_acc_frame_decodes_i16_le_samples() {
        let mut frame = vec![PMD_TYPE_ACC];
        frame.extend_from_slice(&[0u8; 8]); // device timestamp, ignored
        frame.push(PMD_ACC_FRAME_16BIT);
        // two samples: (1, -2, 300) and (-100, 0, 7)
        for v in [1i16, -2, 300, -100, 0, 7] {
            frame.extend_from_slice(&v.to_le_bytes());
        }
        let samples = PolarH10.decode_acc(NOW, &frame);
        assert_eq!(samples.len(), 2);
        assert_eq!(
            (samples[0].x, samples[0].y, samples[0].z),
            (1.0, -2.0, 300.0)
        );
        assert_eq!(
            (samples[1].x, samples[1].y, samples[1].z),
            (-100.0, 0.0, 7.0)
        );
    }

    #[test]
    fn polar_ecg_frame_decodes_signed_24bit() {
        let mut frame = vec![PMD_TYPE_ECG];
        frame.extend_from_slice(&[0u8; 8]);
        frame.push(0x00);
        frame.extend_from_slice(&[0x39, 0x30, 0x00]); // 12345
        frame.extend_from_slice(&[0xff, 0xff, 0xff]); // -1
        let samples = PolarH10.decode_ecg(NOW, &frame);
        assert_eq!(
            samples.iter().map(|s| s.value).collect::<Vec<_>>(),
            [12345, -1]
        );
    }

    #[test]
    fn polar_rejects_mismatched_pmd_type_and_short_frames() {
        let mut frame = vec![PMD_TYPE_ECG];
        frame.extend_from_slice(&[0u8; 8]);
        frame.push(0x00);
        frame.extend_from_slice(&[0, 0, 0]);
        // an ECG frame handed to the ACC decoder produces nothing
        assert!(PolarH10.decode_acc(NOW, &frame).is_empty());
        // header-only and truncated frames produce nothing
        assert!(PolarH10.decode_ecg(NOW, &frame[..PMD_HEADER_LEN]).is_empty());
        assert!(PolarH10.decode_ecg(NOW, &[]).is_empty());
    }

    #[test]
    fn polar_routes_pmd_frames_by_type_byte() {
        let ecg = [PMD_TYPE_ECG, 0, 0];
        let acc = [PMD_TYPE_ACC, 0, 0];
        assert_eq!(PolarH10.route(PMD_DATA_UUID, &ecg), Some(StreamKind::Ecg));
        assert_eq!(PolarH10.route(PMD_DATA_UUID, &acc), Some(StreamKind::Acc));
        assert_eq!(PolarH10.route(PMD_DATA_UUID, &[0x42]), None);
        assert_eq!(
            PolarH10.route(HEART_RATE_MEASUREMENT_UUID, &ecg),
            Some(StreamKind::Ibi)
        );
    }

    #[test]
    fn mock_acc_payload_roundtrip() {
        let mut payload = Vec::new();
        for v in [0.5f32, -0.25, 0.125] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let samples = MockSensor.decode_acc(NOW, &payload);
        assert_eq!(samples.len(), 1);
        assert_eq!(
            (samples[0].x, samples[0].y, samples[0].z),
            (0.5, -0.25, 0.125)
        );
        assert!(MockSensor.decode_acc(NOW, &payload[..8]).is_empty());
    }

    #[test]
    fn name_predicates() {
        assert!(GarminHrmPro::is_supported("Garmin HRM-Pro"));
        assert!(!GarminHrmPro::is_supported("Polar H10 B12345"));
        assert!(PolarH10::is_supported("Polar H10 B12345"));
        assert!(MockSensor::is_supported("MockSensor-1"));
        assert!(!MockSensor::is_supported(""));
    }
}
