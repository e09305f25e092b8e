//! Session lifecycle.
//!
//! The session controller is the single mutator of all climb state. An
//! external scheduler calls it once per iteration; it reads the sensors,
//! drives the fall detector, telemetry batcher and incident alarm it owns,
//! and emits reports through the message gateway. START and END are
//! transient: their side effects happen inside the transition and the
//! observable state is already Active/Inactive when the call returns.

use chrono::Utc;

use crate::alarm::IncidentAlarm;
use crate::config::{Config, FallbackPosition};
use crate::fall::{FallAssessment, FallDetector};
use crate::gateway::{IncidentReport, MessageGateway, StartReport, StatusRequest, StatusResponse};
use crate::panel::{Panel, StatusLight};
use crate::sensors::{EnvSample, SensorSuite};
use crate::trace::TelemetryBatcher;
use crate::transport::Transport;

/// Observable session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No climb in progress
    Inactive,
    /// Climb running, altitude tracked, fall detection armed
    Active,
    /// Fall confirmed, local alarm running (countdown or escalated)
    Incident,
}

impl SessionState {
    /// Wire label used in status responses
    pub fn wire_label(&self) -> &'static str {
        match self {
            SessionState::Inactive => "INACTIVE",
            SessionState::Active => "ACTIVE",
            SessionState::Incident => "INCIDENT",
        }
    }
}

/// One climb, from START to END.
///
/// `id` is non-empty exactly while a session is open; timestamps are
/// device-monotonic milliseconds with 0 meaning unset.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub incident_ms: u64,
    /// Barometric altitude at START, zero-reference for relative heights
    pub baseline_alt: f64,
    pub origin_alt: f64,
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub origin_temp: f64,
    pub origin_humidity: f64,
    pub current_alt: f64,
    pub current_lat: f64,
    pub current_lon: f64,
}

impl Session {
    /// Inactive placeholder between climbs
    pub fn placeholder() -> Self {
        Session {
            state: SessionState::Inactive,
            id: "-".to_string(),
            start_ms: 0,
            end_ms: 0,
            incident_ms: 0,
            baseline_alt: 0.0,
            origin_alt: 0.0,
            origin_lat: 0.0,
            origin_lon: 0.0,
            origin_temp: 0.0,
            origin_humidity: 0.0,
            current_alt: 0.0,
            current_lat: 0.0,
            current_lon: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Inactive
    }
}

/// Session state machine, owner of detector, batcher, alarm and the
/// session record.
pub struct SessionController<S: SensorSuite, T: Transport, P: Panel> {
    sensors: S,
    gateway: MessageGateway<T>,
    panel: P,
    fall: FallDetector,
    batcher: TelemetryBatcher,
    alarm: IncidentAlarm,
    session: Session,
    fallback: FallbackPosition,
    session_seq: u64,
    last_env: Option<EnvSample>,
}

impl<S: SensorSuite, T: Transport, P: Panel> SessionController<S, T, P> {
    pub fn new(sensors: S, gateway: MessageGateway<T>, panel: P, config: &Config) -> Self {
        SessionController {
            sensors,
            gateway,
            panel,
            fall: FallDetector::new(config.detector.clone()),
            batcher: TelemetryBatcher::new(
                config.telemetry.trace_capacity,
                config.telemetry.sample_interval_ms,
            ),
            alarm: IncidentAlarm::new(config.alarm.clone()),
            session: Session::placeholder(),
            fallback: config.fallback.clone(),
            session_seq: 0,
            last_env: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Announce the device to the collector, once after boot.
    pub fn announce_startup(&self) {
        self.gateway.publish_startup_status();
    }

    /// One scheduler iteration.
    pub fn tick(&mut self, now_ms: u64) {
        match self.session.state {
            SessionState::Inactive => {
                self.panel.set_light(StatusLight::Idle);
            }
            SessionState::Active => {
                self.sample_trace(now_ms);
                match self.sensors.read_acceleration() {
                    Ok(accel) => {
                        if self.fall.update(accel.magnitude_g(), now_ms)
                            == FallAssessment::Confirmed
                        {
                            self.enter_incident(now_ms);
                            return;
                        }
                    }
                    Err(e) => {
                        // Skip fall evaluation this tick, keep the session alive
                        log::warn!("acceleration read failed: {}", e);
                    }
                }
                self.panel.set_light(StatusLight::Climbing);
            }
            SessionState::Incident => {
                self.sample_trace(now_ms);
                if let Some(effects) = self.alarm.tick(now_ms) {
                    if effects.send_emergency {
                        self.escalate();
                    }
                    if effects.beep {
                        self.panel.beep();
                    }
                    self.panel.set_light(if effects.escalated {
                        StatusLight::AlarmSteady
                    } else {
                        StatusLight::AlarmBlink
                    });
                }
            }
        }
    }

    /// Momentary button: start from Inactive, end from Active, cancel the
    /// alarm from Incident.
    pub fn handle_button(&mut self, now_ms: u64) {
        match self.session.state {
            SessionState::Inactive => self.start_session(now_ms),
            SessionState::Active => self.end_session(now_ms),
            SessionState::Incident => self.cancel_incident(),
        }
    }

    /// Answer a status request synchronously from a fresh snapshot.
    ///
    /// The requester identity is echoed back; handling is inline within the
    /// current iteration, so the newest request always wins.
    pub fn handle_request(&mut self, request: StatusRequest) {
        let env = self.read_env();
        let (lat, lon, gps_alt) = self.read_position();
        if self.session.is_open() {
            self.session.current_lat = lat;
            self.session.current_lon = lon;
            self.session.current_alt = gps_alt.unwrap_or(env.altitude_m);
        }

        log::info!("status request from {} ({})", request.user_name, request.chat_id);
        self.gateway.publish_status_response(StatusResponse {
            chat_id: request.chat_id,
            user_name: request.user_name,
            session_state: self.session.state.wire_label().to_string(),
            session_id: self.session.id.clone(),
            latitude: lat,
            longitude: lon,
            alt: gps_alt.unwrap_or(env.altitude_m),
            temp: env.temperature_c,
            humidity: env.humidity_pct,
        });
    }

    // START transition: id, environment snapshot, component resets, report.
    fn start_session(&mut self, now_ms: u64) {
        self.session_seq += 1;
        let id = format!(
            "session_{}_{}",
            Utc::now().timestamp_millis(),
            self.session_seq
        );

        let env = self.read_env();
        let (lat, lon, gps_alt) = self.read_position();

        self.session = Session {
            state: SessionState::Active,
            id: id.clone(),
            start_ms: now_ms,
            end_ms: 0,
            incident_ms: 0,
            baseline_alt: env.altitude_m,
            origin_alt: env.altitude_m,
            origin_lat: lat,
            origin_lon: lon,
            origin_temp: env.temperature_c,
            origin_humidity: env.humidity_pct,
            current_alt: gps_alt.unwrap_or(env.altitude_m),
            current_lat: lat,
            current_lon: lon,
        };

        self.fall.reset();
        self.batcher.reset(now_ms);
        self.alarm.cancel();

        log::info!("session {} started at {:.1}m", id, env.altitude_m);
        self.gateway.publish_start(StartReport {
            session_state: "START",
            session_id: id,
            alt: env.altitude_m,
            temp: env.temperature_c,
            humidity: env.humidity_pct,
            latitude: lat,
            longitude: lon,
        });
        self.panel.set_light(StatusLight::Climbing);
    }

    // END transition: flush, final altitude and duration, report, reset.
    fn end_session(&mut self, now_ms: u64) {
        if let Some(trace) = self.batcher.drain() {
            self.gateway.publish_trace(&self.session.id, trace);
        }

        let env = self.read_env();
        let (lat, lon, gps_alt) = self.read_position();
        self.session.end_ms = now_ms;
        self.session.current_alt = gps_alt.unwrap_or(env.altitude_m);
        self.session.current_lat = lat;
        self.session.current_lon = lon;

        let duration_s = now_ms.saturating_sub(self.session.start_ms) as f64 / 1000.0;
        log::info!(
            "session {} ended after {:.1}s at {:.1}m",
            self.session.id,
            duration_s,
            self.session.current_alt
        );
        self.gateway
            .publish_end(&self.session.id, self.session.current_alt, duration_s);

        self.alarm.cancel();
        self.fall.reset();
        self.session = Session::placeholder();
        self.panel.set_light(StatusLight::Idle);
    }

    fn enter_incident(&mut self, now_ms: u64) {
        self.session.incident_ms = now_ms;
        self.session.state = SessionState::Incident;
        // One key per incident episode, so a later fall in the same session
        // escalates independently
        self.alarm
            .arm(format!("{}:{}", self.session.id, now_ms), now_ms);
        log::warn!("session {} entered incident state", self.session.id);
        self.panel.set_light(StatusLight::AlarmBlink);
    }

    fn cancel_incident(&mut self) {
        self.alarm.cancel();
        self.fall.reset();
        self.session.incident_ms = 0;
        self.session.state = SessionState::Active;
        log::info!("incident cancelled, session {} resumed", self.session.id);
        self.panel.set_light(StatusLight::Climbing);
    }

    // One-time emergency report at alarm escalation.
    fn escalate(&mut self) {
        let env = self.read_env();
        let (lat, lon, gps_alt) = self.read_position();
        self.session.current_lat = lat;
        self.session.current_lon = lon;
        self.session.current_alt = gps_alt.unwrap_or(env.altitude_m);

        let elapsed_s = self
            .session
            .incident_ms
            .saturating_sub(self.session.start_ms) as f64
            / 1000.0;

        log::warn!(
            "escalating incident for session {} at ({:.5}, {:.5})",
            self.session.id,
            lat,
            lon
        );
        self.gateway.publish_incident(IncidentReport {
            session_state: "INCIDENT",
            session_id: self.session.id.clone(),
            alt: self.session.current_alt,
            time: elapsed_s,
            latitude: lat,
            longitude: lon,
        });
    }

    // Altitude sampling step, gated by the batcher's interval.
    fn sample_trace(&mut self, now_ms: u64) {
        if !self.batcher.due(now_ms) {
            return;
        }
        let env = self.read_env();
        if let Some(trace) = self.batcher.sample(
            now_ms,
            self.session.start_ms,
            env.altitude_m,
            self.session.baseline_alt,
        ) {
            self.gateway.publish_trace(&self.session.id, trace);
        }
    }

    // Environment read with last-known substitution, never halts a session.
    fn read_env(&mut self) -> EnvSample {
        match self.sensors.read_environment() {
            Ok(env) => {
                self.last_env = Some(env);
                env
            }
            Err(e) => {
                log::warn!("environment read failed, substituting last known: {}", e);
                self.last_env.unwrap_or(EnvSample {
                    altitude_m: self.session.baseline_alt,
                    temperature_c: 0.0,
                    humidity_pct: 0.0,
                })
            }
        }
    }

    // Position with configured fallback when no GPS fix is available.
    fn read_position(&mut self) -> (f64, f64, Option<f64>) {
        match self.sensors.read_gps() {
            Ok(fix) => (fix.latitude, fix.longitude, Some(fix.altitude_m)),
            Err(e) => {
                log::debug!("no GPS fix, using fallback position: {}", e);
                (self.fallback.latitude, self.fallback.longitude, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlarmTimingConfig, DeviceConfig, MqttConfig, TelemetryConfig};
    use crate::error::{DeviceError, DeviceResult};
    use crate::panel::RecordingPanel;
    use crate::sensors::{AccelSample, GpsFix, STANDARD_GRAVITY};
    use crate::transport::{MemoryTransport, OfflineTransport};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    /// Scripted sensor values a test can change while the controller owns
    /// the other handle.
    #[derive(Clone)]
    struct FakeSensors {
        inner: Arc<Mutex<SensorScript>>,
    }

    struct SensorScript {
        g: f64,
        altitude_m: f64,
        temperature_c: f64,
        humidity_pct: f64,
        gps: Option<GpsFix>,
        env_fails: bool,
    }

    impl FakeSensors {
        fn new() -> Self {
            FakeSensors {
                inner: Arc::new(Mutex::new(SensorScript {
                    g: 1.0,
                    altitude_m: 1200.0,
                    temperature_c: 18.0,
                    humidity_pct: 55.0,
                    gps: Some(GpsFix {
                        latitude: 46.0102,
                        longitude: 8.9631,
                        altitude_m: 1201.0,
                    }),
                    env_fails: false,
                })),
            }
        }

        fn set_g(&self, g: f64) {
            self.inner.lock().unwrap().g = g;
        }

        fn set_altitude(&self, altitude_m: f64) {
            self.inner.lock().unwrap().altitude_m = altitude_m;
        }

        fn drop_gps(&self) {
            self.inner.lock().unwrap().gps = None;
        }

        fn fail_env(&self, fail: bool) {
            self.inner.lock().unwrap().env_fails = fail;
        }
    }

    impl SensorSuite for FakeSensors {
        fn self_test(&mut self) -> DeviceResult<()> {
            Ok(())
        }

        fn read_environment(&mut self) -> DeviceResult<EnvSample> {
            let script = self.inner.lock().unwrap();
            if script.env_fails {
                return Err(DeviceError::SensorUnavailable("baro".to_string()));
            }
            Ok(EnvSample {
                altitude_m: script.altitude_m,
                temperature_c: script.temperature_c,
                humidity_pct: script.humidity_pct,
            })
        }

        fn read_acceleration(&mut self) -> DeviceResult<AccelSample> {
            let script = self.inner.lock().unwrap();
            Ok(AccelSample {
                x: 0.0,
                y: 0.0,
                z: script.g * STANDARD_GRAVITY,
            })
        }

        fn read_gps(&mut self) -> DeviceResult<GpsFix> {
            self.inner
                .lock()
                .unwrap()
                .gps
                .ok_or_else(|| DeviceError::SensorUnavailable("gps".to_string()))
        }
    }

    fn test_config() -> Config {
        Config {
            device: DeviceConfig {
                serial: "CM-TEST".to_string(),
            },
            mqtt: MqttConfig {
                broker_url: "mqtt://localhost:1883".to_string(),
                client_id: "test".to_string(),
                qos: 1,
            },
            detector: Default::default(),
            telemetry: TelemetryConfig {
                sample_interval_ms: 500,
                trace_capacity: 4,
            },
            alarm: AlarmTimingConfig::default(),
            fallback: FallbackPosition {
                latitude: 45.0,
                longitude: 7.0,
            },
        }
    }

    struct Harness {
        controller: SessionController<FakeSensors, MemoryTransport, RecordingPanel>,
        sensors: FakeSensors,
        transport: MemoryTransport,
        panel: RecordingPanel,
    }

    fn harness() -> Harness {
        let config = test_config();
        let sensors = FakeSensors::new();
        let transport = MemoryTransport::new();
        let panel = RecordingPanel::new();
        let gateway = MessageGateway::new(transport.clone(), &config.device.serial);
        let controller =
            SessionController::new(sensors.clone(), gateway, panel.clone(), &config);
        Harness {
            controller,
            sensors,
            transport,
            panel,
        }
    }

    fn sent_json(transport: &MemoryTransport) -> Vec<(String, Value)> {
        transport
            .sent()
            .into_iter()
            .map(|(topic, payload)| (topic, serde_json::from_str(&payload).unwrap()))
            .collect()
    }

    fn states(transport: &MemoryTransport) -> Vec<String> {
        sent_json(transport)
            .iter()
            .filter_map(|(_, json)| json["session_state"].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_start_opens_session_and_reports() {
        let mut h = harness();
        assert_eq!(h.controller.state(), SessionState::Inactive);

        h.controller.handle_button(1_000);

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Active);
        assert_ne!(session.id, "-");
        assert_eq!(session.start_ms, 1_000);
        assert_eq!(session.baseline_alt, 1200.0);
        assert_eq!(session.origin_temp, 18.0);

        let sent = sent_json(&h.transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "climbing/CM-TEST");
        assert_eq!(sent[0].1["session_state"], "START");
        assert_eq!(sent[0].1["alt"], 1200.0);
        assert_eq!(sent[0].1["latitude"], 46.0102);
    }

    #[test]
    fn test_session_ids_unique_across_consecutive_sessions() {
        let mut h = harness();
        h.controller.handle_button(1_000);
        let first = h.controller.session().id.clone();
        h.controller.handle_button(2_000);
        h.controller.handle_button(3_000);
        let second = h.controller.session().id.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn test_end_flushes_trace_then_reports_and_resets() {
        let mut h = harness();
        h.controller.handle_button(0);

        // Two samples land in the buffer, below capacity
        h.controller.tick(500);
        h.controller.tick(1_000);
        h.sensors.set_altitude(1215.0);
        h.controller.handle_button(60_000);

        assert_eq!(states(&h.transport), vec!["START", "ACTIVE", "END"]);

        let sent = sent_json(&h.transport);
        let trace = &sent[1].1["trace"];
        assert_eq!(trace.as_array().unwrap().len(), 2);
        let end = &sent[2].1;
        assert_eq!(end["time"], 60.0);
        assert_eq!(end["alt"], 1201.0); // GPS altitude preferred

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Inactive);
        assert_eq!(session.id, "-");

        // Nothing left to flush: a second start/end pair emits no stale trace
        h.controller.handle_button(70_000);
        h.controller.handle_button(71_000);
        assert_eq!(
            states(&h.transport),
            vec!["START", "ACTIVE", "END", "START", "END"]
        );
    }

    #[test]
    fn test_trace_auto_flush_at_capacity() {
        let mut h = harness();
        h.controller.handle_button(0);

        // Capacity is 4; the fourth sample triggers the flush
        for t in [500, 1_000, 1_500] {
            h.controller.tick(t);
            assert_eq!(states(&h.transport), vec!["START"]);
        }
        h.controller.tick(2_000);
        assert_eq!(states(&h.transport), vec!["START", "ACTIVE"]);

        let sent = sent_json(&h.transport);
        assert_eq!(sent[1].1["trace"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_relative_heights_against_baseline() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.sensors.set_altitude(1207.5);
        h.controller.tick(500);
        h.controller.handle_button(1_000);

        let sent = sent_json(&h.transport);
        let point = &sent[1].1["trace"][0];
        assert_eq!(point["height"], 7.5);
        assert_eq!(point["time"], 0.5);
    }

    #[test]
    fn test_confirmed_fall_enters_incident() {
        let mut h = harness();
        h.controller.handle_button(0);

        h.sensors.set_g(8.0);
        h.controller.tick(100);
        h.sensors.set_g(1.0);
        for t in (600..10_100).step_by(500) {
            h.controller.tick(t);
        }
        h.controller.tick(10_200);

        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Incident);
        assert_eq!(session.incident_ms, 10_200);
        assert!(h
            .panel
            .lights()
            .contains(&StatusLight::AlarmBlink));
    }

    #[test]
    fn test_escalation_sends_exactly_one_incident_report() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.sensors.set_g(8.0);
        h.controller.tick(100);
        h.sensors.set_g(1.0);
        h.controller.tick(10_200); // confirmed here

        // Poll well past the 30s wait
        for t in (10_300..80_000).step_by(100) {
            h.controller.tick(t);
        }

        let incidents: Vec<_> = sent_json(&h.transport)
            .into_iter()
            .filter(|(_, json)| json["session_state"] == "INCIDENT")
            .collect();
        assert_eq!(incidents.len(), 1);

        let (_, report) = &incidents[0];
        assert_eq!(report["time"], 10.2); // seconds from start to incident
        assert_eq!(report["latitude"], 46.0102);
    }

    #[test]
    fn test_escalation_uses_fallback_position_without_fix() {
        let mut h = harness();
        h.sensors.drop_gps();
        h.controller.handle_button(0);
        h.sensors.set_g(8.0);
        h.controller.tick(100);
        h.sensors.set_g(1.0);
        h.controller.tick(10_200);
        for t in (10_300..41_000).step_by(100) {
            h.controller.tick(t);
        }

        let sent = sent_json(&h.transport);
        let (_, report) = sent
            .iter()
            .find(|(_, json)| json["session_state"] == "INCIDENT")
            .unwrap();
        assert_eq!(report["latitude"], 45.0);
        assert_eq!(report["longitude"], 7.0);
        // Barometric altitude substitutes for the missing GPS altitude
        assert_eq!(report["alt"], 1200.0);
    }

    #[test]
    fn test_trace_flush_during_incident_reports_active() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.sensors.set_g(8.0);
        h.controller.tick(100);
        h.sensors.set_g(1.0);
        h.controller.tick(10_200);
        assert_eq!(h.controller.state(), SessionState::Incident);

        // Altitude tracking keeps running; capacity 4 fills during incident
        for t in (10_700..13_000).step_by(500) {
            h.controller.tick(t);
        }

        let flushes: Vec<_> = sent_json(&h.transport)
            .into_iter()
            .filter(|(_, json)| json.get("trace").is_some())
            .collect();
        assert!(!flushes.is_empty());
        for (_, flush) in flushes {
            assert_eq!(flush["session_state"], "ACTIVE");
        }
    }

    #[test]
    fn test_button_cancels_incident_silently() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.sensors.set_g(8.0);
        h.controller.tick(100);
        h.sensors.set_g(1.0);
        h.controller.tick(10_200);
        assert_eq!(h.controller.state(), SessionState::Incident);

        h.controller.handle_button(12_000);
        let session = h.controller.session();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.incident_ms, 0);

        // Cancellation itself sends nothing, and no escalation ever fires
        for t in (12_100..50_000).step_by(100) {
            h.controller.tick(t);
        }
        assert!(states(&h.transport)
            .iter()
            .all(|state| state != "INCIDENT"));
    }

    #[test]
    fn test_status_request_echoes_identity() {
        let mut h = harness();
        h.controller.handle_request(StatusRequest {
            request_type: "status_check".to_string(),
            chat_id: 4242,
            user_name: "ada".to_string(),
        });

        let sent = sent_json(&h.transport);
        assert_eq!(sent[0].0, "climbing/CM-TEST/telegram");
        let response = &sent[0].1;
        assert_eq!(response["chat_id"], 4242);
        assert_eq!(response["user_name"], "ada");
        assert_eq!(response["session_state"], "INACTIVE");
        assert_eq!(response["session_id"], "-");
        assert_eq!(response["temp"], 18.0);
    }

    #[test]
    fn test_status_request_during_session_reports_active() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.controller.handle_request(StatusRequest {
            request_type: "status_check".to_string(),
            chat_id: 1,
            user_name: "ada".to_string(),
        });

        let sent = sent_json(&h.transport);
        let response = &sent.last().unwrap().1;
        assert_eq!(response["session_state"], "ACTIVE");
        assert_eq!(response["session_id"], h.controller.session().id);
    }

    #[test]
    fn test_publish_failure_never_blocks_transitions() {
        let config = test_config();
        let sensors = FakeSensors::new();
        let gateway = MessageGateway::new(OfflineTransport, &config.device.serial);
        let mut controller =
            SessionController::new(sensors, gateway, RecordingPanel::new(), &config);

        controller.handle_button(1_000);
        assert_eq!(controller.state(), SessionState::Active);
        controller.tick(1_500);
        controller.handle_button(2_000);
        assert_eq!(controller.state(), SessionState::Inactive);
    }

    #[test]
    fn test_env_failure_substitutes_last_known() {
        let mut h = harness();
        h.controller.handle_button(0);
        h.controller.tick(500); // one good sample cached

        h.sensors.fail_env(true);
        h.controller.tick(1_000);
        h.controller.handle_button(2_000);

        // Trace and END still produced from the last known altitude
        assert_eq!(states(&h.transport), vec!["START", "ACTIVE", "END"]);
        let sent = sent_json(&h.transport);
        assert_eq!(sent[1].1["trace"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_idle_device_only_drives_indicator() {
        let mut h = harness();
        for t in (0..5_000).step_by(100) {
            h.controller.tick(t);
        }
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.panel.lights(), vec![StatusLight::Idle]);
    }
}
