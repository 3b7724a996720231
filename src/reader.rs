//! The uniform sensor-reader contract: connection lifecycle, per-stream
//! callback dispatch, and the transport boundary.
//!
//! A [`SensorReader`] owns exactly one [`Transport`] handle and one
//! per-family [`SensorDecoder`]; all vendor variation lives in the decoder.
//! Decode-and-dispatch is synchronous and event-driven: the caller pulls
//! `(characteristic, bytes)` pairs from [`SensorReader::notification_stream`]
//! and feeds each one to [`SensorReader::handle_notification`], which invokes
//! the registered callbacks in production order before returning. The reader
//! never spawns tasks of its own.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::Stream;
use log::{debug, warn};
use uuid::Uuid;

use crate::decode::{decode_battery_level, decode_utf8_string, SensorDecoder};
use crate::error::{Error, Result};
use crate::protocol::{BATTERY_LEVEL_UUID, MANUFACTURER_NAME_UUID, MODEL_NBR_UUID};
use crate::types::{
    AccSample, CapabilitySet, DeviceDescriptor, DeviceInfo, EcgSample, IbiSample, StreamKind,
};

/// Notifications as delivered by a transport: the source characteristic and
/// the raw payload, in device-transmission order.
pub type NotificationStream = Pin<Box<dyn Stream<Item = (Uuid, Vec<u8>)> + Send>>;

/// The platform BLE boundary. Not reimplemented here — `blehrm` only
/// specifies what it needs from a connection: connect/disconnect, reads and
/// writes of named characteristics, notification subscribe/unsubscribe, and
/// an ordered notification stream.
///
/// Implementations: [`crate::ble::BleTransport`] (btleplug) and
/// [`crate::mock::MockTransport`] (in-memory, for tests and simulation).
/// A transport handle is exclusively owned by the one reader wrapping it.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>>;
    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<()>;
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()>;
    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()>;

    /// The inbound notification stream. Delivery order matches
    /// device-transmission order per characteristic.
    async fn notifications(&mut self) -> Result<NotificationStream>;
}

// ── Reader state ─────────────────────────────────────────────────────────────

/// Connection state of a reader. Stream sub-state (streaming or not) is
/// tracked per [`StreamKind`]; `disconnect` forces every stream back to
/// not-streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Disconnected,
    Connected,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReaderState::Disconnected => "disconnected",
            ReaderState::Connected => "connected",
        })
    }
}

/// Callback slot for one stream. `active` and `callback` are only ever
/// written together by that stream's start/stop operations, so an active
/// stream without a callback is an internal-invariant breach
/// ([`Error::CallbackNotSet`]), not something a caller can produce.
struct StreamSlot<T> {
    active: bool,
    callback: Option<Box<dyn FnMut(T) + Send>>,
}

impl<T> Default for StreamSlot<T> {
    fn default() -> Self {
        Self {
            active: false,
            callback: None,
        }
    }
}

impl<T> StreamSlot<T> {
    fn activate(&mut self, callback: Box<dyn FnMut(T) + Send>) {
        self.callback = Some(callback);
        self.active = true;
    }

    fn clear(&mut self) {
        self.active = false;
        self.callback = None;
    }

    /// Deliver samples in production order. An inactive slot swallows them
    /// (the notification arrived after `stop` — by design, not an error).
    fn dispatch(&mut self, kind: StreamKind, samples: Vec<T>) -> Result<usize> {
        if !self.active {
            debug!("dropping {} {kind} sample(s): stream not active", samples.len());
            return Ok(0);
        }
        let callback = self
            .callback
            .as_mut()
            .ok_or(Error::CallbackNotSet { stream: kind })?;
        let n = samples.len();
        for sample in samples {
            callback(sample);
        }
        Ok(n)
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ── SensorReader ─────────────────────────────────────────────────────────────

/// A connected (or connectable) heart-rate monitor with a uniform streaming
/// surface, regardless of vendor.
///
/// Created by [`crate::registry::Registry::create_reader`], which binds the
/// matched family's decoder and declared capabilities to a transport handle.
///
/// State machine per stream:
/// `Disconnected → Connected(no stream) → Connected(streaming) → …` —
/// `connect` and `disconnect` move between the outer states, `start_X_stream`
/// / `stop_X_stream` between the inner ones. Out-of-order operations fail
/// with [`Error::InvalidState`]; streams of an undeclared capability fail
/// with [`Error::UnsupportedCapability`].
pub struct SensorReader {
    device: DeviceDescriptor,
    decoder: Arc<dyn SensorDecoder>,
    capabilities: CapabilitySet,
    transport: Box<dyn Transport>,
    state: ReaderState,
    ibi: StreamSlot<IbiSample>,
    acc: StreamSlot<AccSample>,
    ecg: StreamSlot<EcgSample>,
}

impl std::fmt::Debug for SensorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorReader")
            .field("device", &self.device)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SensorReader {
    pub(crate) fn new(
        device: DeviceDescriptor,
        decoder: Arc<dyn SensorDecoder>,
        capabilities: CapabilitySet,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            device,
            decoder,
            capabilities,
            transport,
            state: ReaderState::Disconnected,
            ibi: StreamSlot::default(),
            acc: StreamSlot::default(),
            ecg: StreamSlot::default(),
        }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn family_id(&self) -> &'static str {
        self.decoder.family_id()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Whether a stream is currently delivering to a callback.
    pub fn is_streaming(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Ibi => self.ibi.active,
            StreamKind::Acc => self.acc.active,
            StreamKind::Ecg => self.ecg.active,
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────────────

    /// Establish the transport connection. Failures are reported, never
    /// retried here — retry/backoff policy belongs to the caller.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ReaderState::Connected {
            return Err(Error::InvalidState {
                current: self.state,
                attempted: "connect",
            });
        }
        self.transport.connect().await?;
        self.state = ReaderState::Connected;
        debug!("{}: connected", self.device);
        Ok(())
    }

    /// Release the transport handle. Cancels all active streams as a side
    /// effect. A second call reports `InvalidState` but cannot corrupt state.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ReaderState::Disconnected {
            return Err(Error::InvalidState {
                current: self.state,
                attempted: "disconnect",
            });
        }
        self.ibi.clear();
        self.acc.clear();
        self.ecg.clear();
        self.state = ReaderState::Disconnected;
        self.transport.disconnect().await?;
        debug!("{}: disconnected", self.device);
        Ok(())
    }

    /// Read model number, manufacturer name, and battery level from the
    /// standard Device Information / Battery characteristics.
    pub async fn device_info(&mut self) -> Result<DeviceInfo> {
        self.require_connected("read device info")?;
        let model = self.transport.read(MODEL_NBR_UUID).await?;
        let manufacturer = self.transport.read(MANUFACTURER_NAME_UUID).await?;
        let battery = self.transport.read(BATTERY_LEVEL_UUID).await?;
        Ok(DeviceInfo {
            model_number: decode_utf8_string(&model),
            manufacturer_name: decode_utf8_string(&manufacturer),
            battery_level: decode_battery_level(&battery),
        })
    }

    /// Hand the transport's notification stream to the caller, who drives
    /// decode-and-dispatch by feeding each item to
    /// [`SensorReader::handle_notification`].
    pub async fn notification_stream(&mut self) -> Result<NotificationStream> {
        self.require_connected("open the notification stream")?;
        self.transport.notifications().await
    }

    // ── Stream start/stop ────────────────────────────────────────────────────

    /// Start interbeat-interval streaming. The callback is bound atomically
    /// with activation: there is no window where the stream is enabled but
    /// the callback unset.
    pub async fn start_ibi_stream(
        &mut self,
        callback: impl FnMut(IbiSample) + Send + 'static,
    ) -> Result<()> {
        self.check_start(StreamKind::Ibi, "start the ibi stream")?;
        self.ibi.activate(Box::new(callback));
        if let Err(e) = self.arm(StreamKind::Ibi).await {
            self.ibi.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Stop interbeat-interval streaming. Effective before this returns: the
    /// callback slot is cleared first, so a notification already in flight is
    /// dropped, not dispatched. Stopping a stream that is not running is a
    /// no-op.
    pub async fn stop_ibi_stream(&mut self) -> Result<()> {
        self.require_connected("stop the ibi stream")?;
        if !self.ibi.active {
            return Ok(());
        }
        self.ibi.clear();
        self.disarm(StreamKind::Ibi).await
    }

    /// Start accelerometer streaming. Fails with
    /// [`Error::UnsupportedCapability`] for families that do not declare
    /// `acc`.
    pub async fn start_acc_stream(
        &mut self,
        callback: impl FnMut(AccSample) + Send + 'static,
    ) -> Result<()> {
        self.check_start(StreamKind::Acc, "start the acc stream")?;
        self.acc.activate(Box::new(callback));
        if let Err(e) = self.arm(StreamKind::Acc).await {
            self.acc.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Stop accelerometer streaming. Same ordering guarantee as
    /// [`SensorReader::stop_ibi_stream`].
    pub async fn stop_acc_stream(&mut self) -> Result<()> {
        self.require_connected("stop the acc stream")?;
        if !self.acc.active {
            return Ok(());
        }
        self.acc.clear();
        self.disarm(StreamKind::Acc).await
    }

    /// Start ECG streaming. Fails with [`Error::UnsupportedCapability`] for
    /// families that do not declare `ecg`.
    pub async fn start_ecg_stream(
        &mut self,
        callback: impl FnMut(EcgSample) + Send + 'static,
    ) -> Result<()> {
        self.check_start(StreamKind::Ecg, "start the ecg stream")?;
        self.ecg.activate(Box::new(callback));
        if let Err(e) = self.arm(StreamKind::Ecg).await {
            self.ecg.clear();
            return Err(e);
        }
        Ok(())
    }

    /// Stop ECG streaming. Same ordering guarantee as
    /// [`SensorReader::stop_ibi_stream`].
    pub async fn stop_ecg_stream(&mut self) -> Result<()> {
        self.require_connected("stop the ecg stream")?;
        if !self.ecg.active {
            return Ok(());
        }
        self.ecg.clear();
        self.disarm(StreamKind::Ecg).await
    }

    // ── Notification handling ────────────────────────────────────────────────

    /// Decode one inbound notification and dispatch the resulting samples to
    /// the owning stream's callback, synchronously and in production order.
    ///
    /// Returns the number of samples delivered. Unroutable characteristics
    /// and notifications for streams that are no longer active are dropped
    /// (logged, `Ok(0)`); malformed payloads decode to an empty sequence —
    /// a single bad notification never terminates the stream.
    pub fn handle_notification(&mut self, characteristic: Uuid, data: &[u8]) -> Result<usize> {
        let Some(kind) = self.decoder.route(characteristic, data) else {
            debug!("{}: unroutable notification from {characteristic}", self.device);
            return Ok(0);
        };
        let now = now_secs();
        match kind {
            StreamKind::Ibi => {
                let samples = self.decoder.decode_ibi(now, data);
                self.ibi.dispatch(kind, samples)
            }
            StreamKind::Acc => {
                let samples = self.decoder.decode_acc(now, data);
                self.acc.dispatch(kind, samples)
            }
            StreamKind::Ecg => {
                let samples = self.decoder.decode_ecg(now, data);
                self.ecg.dispatch(kind, samples)
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn require_connected(&self, attempted: &'static str) -> Result<()> {
        if self.state != ReaderState::Connected {
            return Err(Error::InvalidState {
                current: self.state,
                attempted,
            });
        }
        Ok(())
    }

    fn check_start(&self, kind: StreamKind, attempted: &'static str) -> Result<()> {
        if !self.capabilities.supports(kind) {
            return Err(Error::UnsupportedCapability {
                family_id: self.decoder.family_id(),
                capability: kind,
            });
        }
        self.require_connected(attempted)
    }

    /// Transport-side stream start: optional control write, then subscribe.
    async fn arm(&mut self, kind: StreamKind) -> Result<()> {
        if let Some((char_uuid, payload)) = self.decoder.start_command(kind) {
            self.transport.write(char_uuid, &payload).await?;
        }
        let char_uuid = self
            .decoder
            .characteristic(kind)
            .ok_or(Error::UnsupportedCapability {
                family_id: self.decoder.family_id(),
                capability: kind,
            })?;
        self.transport.subscribe(char_uuid).await
    }

    /// Transport-side stream stop. The characteristic is only unsubscribed
    /// when no *other* active stream still routes through it — Polar PMD
    /// carries ACC and ECG on one data characteristic.
    async fn disarm(&mut self, kind: StreamKind) -> Result<()> {
        if let Some((char_uuid, payload)) = self.decoder.stop_command(kind) {
            if let Err(e) = self.transport.write(char_uuid, &payload).await {
                warn!("{}: stop command for {kind} failed: {e}", self.device);
            }
        }
        let Some(char_uuid) = self.decoder.characteristic(kind) else {
            return Ok(());
        };
        let shared = [StreamKind::Ibi, StreamKind::Acc, StreamKind::Ecg]
            .into_iter()
            .filter(|&k| k != kind && self.is_streaming(k))
            .any(|k| self.decoder.characteristic(k) == Some(char_uuid));
        if shared {
            debug!(
                "{}: keeping subscription to {char_uuid}, still used by another stream",
                self.device
            );
            return Ok(());
        }
        self.transport.unsubscribe(char_uuid).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;

    use super::*;
    use crate::decode::{GarminHrmPro, MockSensor, PolarH10};
    use crate::mock::{MockHandle, MockTransport, TransportOp};
    use crate::protocol::{
        HEART_RATE_MEASUREMENT_UUID, PMD_ACC_START, PMD_ACC_STOP, PMD_CONTROL_UUID,
        PMD_DATA_UUID, PMD_ECG_START,
    };

    /// flags 0b00010000, HR 72, RR 300 then 500 ms
    const RR_PAYLOAD: [u8; 6] = [0x10, 72, 0x2c, 0x01, 0xf4, 0x01];

    fn mock_reader() -> (SensorReader, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let reader = SensorReader::new(
            DeviceDescriptor::new("MockSensor-1", "mock:01"),
            Arc::new(MockSensor),
            CapabilitySet {
                ibi: true,
                acc: true,
                ecg: false,
            },
            Box::new(transport),
        );
        (reader, handle)
    }

    fn polar_reader() -> (SensorReader, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let reader = SensorReader::new(
            DeviceDescriptor::new("Polar H10 B12345", "a1:b2:c3:d4:e5:f6"),
            Arc::new(PolarH10),
            CapabilitySet {
                ibi: true,
                acc: true,
                ecg: true,
            },
            Box::new(transport),
        );
        (reader, handle)
    }

    fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |sample| sink.lock().unwrap().push(sample))
    }

    #[tokio::test]
    async fn start_before_connect_is_invalid_state() {
        let (mut reader, _handle) = mock_reader();
        let err = reader.start_ibi_stream(|_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                current: ReaderState::Disconnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn samples_are_dispatched_in_production_order() {
        let (mut reader, _handle) = mock_reader();
        reader.connect().await.unwrap();

        let (seen, sink) = collector::<IbiSample>();
        reader.start_ibi_stream(sink).await.unwrap();
        assert!(reader.is_streaming(StreamKind::Ibi));

        let n = reader
            .handle_notification(HEART_RATE_MEASUREMENT_UUID, &RR_PAYLOAD)
            .unwrap();
        assert_eq!(n, 2);
        let ms: Vec<u16> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.interbeat_interval_ms)
            .collect();
        assert_eq!(ms, [300, 500]);
    }

    #[tokio::test]
    async fn late_notification_after_stop_never_reaches_the_callback() {
        let (mut reader, _handle) = mock_reader();
        reader.connect().await.unwrap();

        let (seen, sink) = collector::<IbiSample>();
        reader.start_ibi_stream(sink).await.unwrap();
        reader.stop_ibi_stream().await.unwrap();

        let n = reader
            .handle_notification(HEART_RATE_MEASUREMENT_UUID, &RR_PAYLOAD)
            .unwrap();
        assert_eq!(n, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_cancels_streams_and_resets_the_state_machine() {
        let (mut reader, _handle) = mock_reader();
        reader.connect().await.unwrap();
        reader.start_ibi_stream(|_| {}).await.unwrap();

        reader.disconnect().await.unwrap();
        assert!(!reader.is_streaming(StreamKind::Ibi));

        let err = reader.start_ibi_stream(|_| {}).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        // a second disconnect reports, but does not corrupt
        let err = reader.disconnect().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(reader.state(), ReaderState::Disconnected);

        // the full cycle is re-enterable
        reader.connect().await.unwrap();
        reader.start_ibi_stream(|_| {}).await.unwrap();
    }

    #[tokio::test]
    async fn undeclared_capability_is_rejected_with_the_family_name() {
        let (transport, _handle) = MockTransport::new();
        let mut reader = SensorReader::new(
            DeviceDescriptor::new("Garmin HRM-Pro", "aa:bb:cc:dd:ee:ff"),
            Arc::new(GarminHrmPro),
            CapabilitySet::IBI_ONLY,
            Box::new(transport),
        );
        reader.connect().await.unwrap();

        let err = reader.start_acc_stream(|_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedCapability {
                family_id: "GarminHrmPro",
                capability: StreamKind::Acc,
            }
        ));
    }

    #[tokio::test]
    async fn stopping_an_idle_stream_is_a_no_op() {
        let (mut reader, _handle) = mock_reader();
        reader.connect().await.unwrap();
        reader.stop_ibi_stream().await.unwrap();
    }

    #[tokio::test]
    async fn device_info_reads_the_standard_characteristics() {
        let (mut reader, _handle) = mock_reader();
        reader.connect().await.unwrap();
        let info = reader.device_info().await.unwrap();
        assert_eq!(info.model_number, "Mock");
        assert_eq!(info.manufacturer_name, "Mock sensor ltd");
        assert_eq!(info.battery_level, 99);
    }

    #[tokio::test]
    async fn polar_streams_are_armed_through_the_pmd_control_point() {
        let (mut reader, handle) = polar_reader();
        reader.connect().await.unwrap();

        reader.start_acc_stream(|_| {}).await.unwrap();
        reader.start_ecg_stream(|_| {}).await.unwrap();

        let ops = handle.ops();
        assert!(ops.contains(&TransportOp::Wrote(PMD_CONTROL_UUID, PMD_ACC_START.to_vec())));
        assert!(ops.contains(&TransportOp::Wrote(PMD_CONTROL_UUID, PMD_ECG_START.to_vec())));
        assert!(ops.contains(&TransportOp::Subscribed(PMD_DATA_UUID)));
    }

    #[tokio::test]
    async fn shared_pmd_characteristic_survives_stopping_one_stream() {
        let (mut reader, handle) = polar_reader();
        reader.connect().await.unwrap();
        reader.start_acc_stream(|_| {}).await.unwrap();
        reader.start_ecg_stream(|_| {}).await.unwrap();

        reader.stop_acc_stream().await.unwrap();
        let ops = handle.ops();
        assert!(ops.contains(&TransportOp::Wrote(PMD_CONTROL_UUID, PMD_ACC_STOP.to_vec())));
        assert!(!ops.contains(&TransportOp::Unsubscribed(PMD_DATA_UUID)));
        assert!(reader.is_streaming(StreamKind::Ecg));

        reader.stop_ecg_stream().await.unwrap();
        assert!(handle
            .ops()
            .contains(&TransportOp::Unsubscribed(PMD_DATA_UUID)));
    }

    #[tokio::test]
    async fn notifications_flow_from_the_transport_stream_to_callbacks() {
        let (mut reader, handle) = mock_reader();
        reader.connect().await.unwrap();

        let (seen, sink) = collector::<IbiSample>();
        reader.start_ibi_stream(sink).await.unwrap();

        handle.notify(HEART_RATE_MEASUREMENT_UUID, RR_PAYLOAD.to_vec());
        let mut notifications = reader.notification_stream().await.unwrap();
        let (uuid, data) = notifications.next().await.unwrap();
        reader.handle_notification(uuid, &data).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
