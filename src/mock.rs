//! Hardware-free simulation: a seeded signal generator and an in-memory
//! transport.
//!
//! [`MockGenerator`] produces raw notification payloads with the documented
//! statistical shape — interbeat intervals uniform in 0.8–1.3 s encoded as
//! standard Heart Rate Measurement payloads, and a 2 Hz sinusoid on X/Y plus
//! bounded noise on Z at a 10 ms sampling interval. Seeding the RNG makes the
//! whole payload sequence reproducible, which is what lets the streaming
//! contract be validated end-to-end without a chest strap.
//!
//! [`MockTransport`] is the matching [`Transport`]: notifications are pushed
//! through a [`MockHandle`], device-info reads return canned values, and
//! every transport operation is recorded for inspection by tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::{
    BATTERY_LEVEL_UUID, HRM_FLAG_RR_PRESENT, MANUFACTURER_NAME_UUID, MOCK_ACC_INTERVAL_SECS,
    MOCK_ACC_NOISE, MOCK_ACC_SINE_HZ, MOCK_IBI_MAX_SECS, MOCK_IBI_MIN_SECS, MODEL_NBR_UUID,
};
use crate::reader::{NotificationStream, Transport};

// ── Signal generator ─────────────────────────────────────────────────────────

/// Deterministic source of simulated notification payloads.
///
/// Pull-based: each call returns the delay until the payload would arrive and
/// the payload itself, so callers decide whether to actually wait (the CLI
/// sleeps; tests don't).
pub struct MockGenerator {
    rng: StdRng,
    /// Simulated time of the accelerometer signal, seconds.
    acc_t: f64,
}

impl MockGenerator {
    /// A generator with a fixed seed — the same seed always yields the same
    /// payload sequence.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            acc_t: 0.0,
        }
    }

    /// A generator seeded from the OS entropy source.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            acc_t: 0.0,
        }
    }

    /// Next simulated heartbeat: an inter-arrival delay uniform in
    /// 0.8–1.3 s and a standard Heart Rate Measurement payload whose single
    /// RR field equals that delay in milliseconds.
    pub fn next_ibi(&mut self) -> (Duration, Vec<u8>) {
        let ibi_secs = self.rng.gen_range(MOCK_IBI_MIN_SECS..MOCK_IBI_MAX_SECS);
        let ibi_ms = (ibi_secs * 1000.0).round() as u16;
        let bpm = (60_000 / u32::from(ibi_ms.max(1))).min(255) as u8;
        let payload = vec![
            HRM_FLAG_RR_PRESENT,
            bpm,
            (ibi_ms & 0xff) as u8,
            (ibi_ms >> 8) as u8,
        ];
        (Duration::from_secs_f64(ibi_secs), payload)
    }

    /// Next simulated accelerometer sample, 10 ms after the previous one:
    /// `x = sin(2π·2t)`, `y = cos(2π·2t)`, `z` uniform in ±0.1, packed as
    /// the mock family's `3 × f32 LE` layout.
    pub fn next_acc(&mut self) -> (Duration, Vec<u8>) {
        self.acc_t += MOCK_ACC_INTERVAL_SECS;
        let phase = std::f64::consts::TAU * MOCK_ACC_SINE_HZ * self.acc_t;
        let x = phase.sin() as f32;
        let y = phase.cos() as f32;
        let z: f32 = self.rng.gen_range(-MOCK_ACC_NOISE..MOCK_ACC_NOISE);

        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
        payload.extend_from_slice(&z.to_le_bytes());
        (Duration::from_secs_f64(MOCK_ACC_INTERVAL_SECS), payload)
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// One recorded transport operation, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Connected,
    Disconnected,
    Read(Uuid),
    Wrote(Uuid, Vec<u8>),
    Subscribed(Uuid),
    Unsubscribed(Uuid),
}

/// Injection and inspection handle paired with a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    tx: mpsc::UnboundedSender<(Uuid, Vec<u8>)>,
    ops: Arc<Mutex<Vec<TransportOp>>>,
}

impl MockHandle {
    /// Push a notification into the transport's stream, as if the peripheral
    /// had sent it.
    pub fn notify(&self, characteristic: Uuid, payload: Vec<u8>) {
        let _ = self.tx.send((characteristic, payload));
    }

    /// Snapshot of every operation the transport has performed so far.
    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().expect("mock op log poisoned").clone()
    }
}

/// In-memory [`Transport`] backing the mock family (and reader tests).
pub struct MockTransport {
    rx: Option<mpsc::UnboundedReceiver<(Uuid, Vec<u8>)>>,
    ops: Arc<Mutex<Vec<TransportOp>>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ops = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rx: Some(rx),
                ops: Arc::clone(&ops),
            },
            MockHandle { tx, ops },
        )
    }

    fn record(&self, op: TransportOp) {
        self.ops.lock().expect("mock op log poisoned").push(op);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        self.record(TransportOp::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.record(TransportOp::Disconnected);
        Ok(())
    }

    /// Canned device-info values; anything else reads as empty.
    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.record(TransportOp::Read(characteristic));
        Ok(if characteristic == MODEL_NBR_UUID {
            b"Mock".to_vec()
        } else if characteristic == MANUFACTURER_NAME_UUID {
            b"Mock sensor ltd".to_vec()
        } else if characteristic == BATTERY_LEVEL_UUID {
            vec![99]
        } else {
            Vec::new()
        })
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        self.record(TransportOp::Wrote(characteristic, payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.record(TransportOp::Subscribed(characteristic));
        Ok(())
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.record(TransportOp::Unsubscribed(characteristic));
        Ok(())
    }

    /// The channel-backed notification stream. The receiver can only be
    /// handed out once; later calls yield an empty stream.
    async fn notifications(&mut self) -> Result<NotificationStream> {
        match self.rx.take() {
            Some(rx) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{MockSensor, SensorDecoder};

    #[test]
    fn same_seed_same_payload_sequence() {
        let mut a = MockGenerator::new(42);
        let mut b = MockGenerator::new(42);
        for _ in 0..32 {
            assert_eq!(a.next_ibi(), b.next_ibi());
            assert_eq!(a.next_acc(), b.next_acc());
        }
    }

    #[test]
    fn ibi_payloads_stay_in_documented_range_and_decode() {
        let mut generator = MockGenerator::new(7);
        for _ in 0..64 {
            let (delay, payload) = generator.next_ibi();
            assert!(delay.as_secs_f64() >= MOCK_IBI_MIN_SECS);
            assert!(delay.as_secs_f64() < MOCK_IBI_MAX_SECS);

            let samples = MockSensor.decode_ibi(0.0, &payload);
            assert_eq!(samples.len(), 1);
            let ms = samples[0].interbeat_interval_ms;
            assert!((800..=1300).contains(&ms), "ibi out of range: {ms}");
        }
    }

    #[test]
    fn acc_signal_is_periodic_with_bounded_noise() {
        let mut generator = MockGenerator::new(7);
        for _ in 0..200 {
            let (delay, payload) = generator.next_acc();
            assert_eq!(delay, Duration::from_millis(10));

            let samples = MockSensor.decode_acc(0.0, &payload);
            assert_eq!(samples.len(), 1);
            let s = samples[0];
            assert!(s.x.abs() <= 1.0);
            assert!(s.y.abs() <= 1.0);
            // unit circle: the sinusoid axes stay phase-locked
            assert!((s.x * s.x + s.y * s.y - 1.0).abs() < 1e-3);
            assert!(s.z.abs() <= MOCK_ACC_NOISE);
        }
    }
}
