use rtcore_devkit::{gps_app, init_tracing, light_app, BlockBuilder, IntercoreCall, MockIntercore, GPS_APP_ID, LIGHT_APP_ID};
use rtcore_kernel::intercore::app::RawDataHook;
use rtcore_kernel::intercore::{
    DecodeError, DispatchError, DispatchSettings, DispatchTable, Dispatched, Endpoint, HookSet, InterCoreCmd,
    RealTimeApp, SensorCache, SocketHandle,
};
use rtcore_kernel::{FaultCode, LastFault};
use serde_json::Value;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

const THIRD_ID: &str = "0d1c6b2a-3e4f-4a5b-9c8d-7e6f5a4b3c2d";

type Seen = Rc<RefCell<Vec<Vec<u8>>>>;

/// Keeps every block it is handed.
struct RecordingHook(Seen);

impl RawDataHook for RecordingHook {
    fn on_raw_data(&mut self, block: &[u8], _sensors: &mut SensorCache) -> Result<Option<Value>, DecodeError> {
        self.0.borrow_mut().push(block.to_vec());
        Ok(None)
    }
}

fn recording_app(name: &str, id: &str) -> (RealTimeApp, Seen) {
    let seen = Seen::default();
    let hooks = HookSet::generic().with_raw_data(Box::new(RecordingHook(seen.clone())));
    (RealTimeApp::new(Endpoint::new(name, id), hooks), seen)
}

fn table(apps: Vec<RealTimeApp>) -> (DispatchTable, MockIntercore, LastFault) {
    init_tracing();
    let mock = MockIntercore::new();
    let faults = LastFault::new();
    let table = DispatchTable::new(apps, Box::new(mock.clone()), DispatchSettings::default(), faults.clone());
    (table, mock, faults)
}

#[test]
fn test_initialize_opens_every_app() {
    let (mut table, mock, faults) = table(vec![light_app(), gps_app()]);
    table.initialize().unwrap();

    assert_eq!(mock.connects(), vec![LIGHT_APP_ID.to_string(), GPS_APP_ID.to_string()]);
    for id in [LIGHT_APP_ID, GPS_APP_ID] {
        let socket = mock.socket_of(id).unwrap();
        let calls = mock.calls();
        assert!(calls.contains(&IntercoreCall::SetTimeout(socket, Duration::from_secs(5))));
        assert!(calls.contains(&IntercoreCall::Register(socket)));
        assert_eq!(mock.sent_to(socket)[0].cmd, InterCoreCmd::Heartbeat);
    }
    assert!(table.apps().iter().all(|a| a.socket().is_some()));
    assert_eq!(faults.get(), None);
}

#[test]
fn test_too_many_apps_fails_before_connecting() {
    let (third, _) = recording_app("third", THIRD_ID);
    let (mut table, mock, _) = table(vec![light_app(), gps_app(), third]);

    let err = table.initialize().unwrap_err();
    assert!(matches!(err, DispatchError::TooManyApps { count: 3, max: 2 }));
    assert!(mock.calls().is_empty());
}

#[test]
fn test_limit_above_hardware_is_capped() {
    init_tracing();
    let (third, _) = recording_app("third", THIRD_ID);
    let mock = MockIntercore::new();
    let settings = DispatchSettings {
        max_apps: 3,
        ..DispatchSettings::default()
    };
    let mut table = DispatchTable::new(
        vec![light_app(), gps_app(), third],
        Box::new(mock.clone()),
        settings,
        LastFault::new(),
    );

    let err = table.initialize().unwrap_err();
    assert!(matches!(err, DispatchError::TooManyApps { count: 3, max: 2 }));
    assert!(mock.connects().is_empty());
}

#[test]
fn test_failed_connect_aborts_init() {
    let (mut table, mock, faults) = table(vec![light_app(), gps_app()]);
    mock.refuse(GPS_APP_ID);

    let err = table.initialize().unwrap_err();
    assert!(matches!(err, DispatchError::Transport { .. }));
    assert_eq!(faults.get(), Some(FaultCode::OpenRtSocket));
    assert!(table.apps()[0].socket().is_some());
    assert!(table.apps()[1].socket().is_none());
}

#[test]
fn test_heartbeat_failure_is_not_fatal() {
    let (mut table, mock, faults) = table(vec![light_app()]);
    mock.fail_sends(true);

    table.initialize().unwrap();
    assert_eq!(faults.get(), Some(FaultCode::WriteRtSocket));
}

#[test]
fn test_app_without_response_hook_is_not_registered() {
    let mut hooks = HookSet::generic();
    hooks.response = None;
    let (mut table, mock, _) = table(vec![RealTimeApp::new(Endpoint::new("silent", LIGHT_APP_ID), hooks)]);
    table.initialize().unwrap();

    assert!(!mock.calls().iter().any(|c| matches!(c, IntercoreCall::Register(_))));
}

#[test]
fn test_raw_data_goes_to_the_sending_app_only() {
    let (a, seen_a) = recording_app("a", LIGHT_APP_ID);
    let (b, seen_b) = recording_app("b", GPS_APP_ID);
    let (mut table, mock, _) = table(vec![a, b]);
    table.initialize().unwrap();

    let block = BlockBuilder::gps(10.5, 20.25, 3.0);
    let outcome = table.on_response(mock.socket_of(GPS_APP_ID).unwrap(), &block);

    assert_eq!(outcome, Dispatched::RawData { app: "b".into(), report: None });
    assert!(seen_a.borrow().is_empty());
    assert_eq!(*seen_b.borrow(), vec![block]);
}

#[test]
fn test_raw_data_from_unknown_socket_is_dropped() {
    let (a, seen) = recording_app("a", LIGHT_APP_ID);
    let (mut table, _, _) = table(vec![a]);
    table.initialize().unwrap();

    let outcome = table.on_response(SocketHandle(999), &BlockBuilder::light(1, 1.0));
    assert_eq!(outcome, Dispatched::Discarded);
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_light_block_updates_sensor_cache() {
    let (mut table, mock, _) = table(vec![light_app()]);
    table.initialize().unwrap();

    table.on_response(mock.socket_of(LIGHT_APP_ID).unwrap(), &BlockBuilder::light(812, 42.5));
    let light = table.sensors().light.unwrap();
    assert_eq!(light.sensor_data, 812);
    assert_eq!(light.lux, 42.5);
}

#[test]
fn test_short_block_changes_nothing() {
    let (mut table, mock, _) = table(vec![light_app()]);
    table.initialize().unwrap();

    let mut block = BlockBuilder::light(812, 42.5);
    block.truncate(12);
    let outcome = table.on_response(mock.socket_of(LIGHT_APP_ID).unwrap(), &block);
    assert_eq!(outcome, Dispatched::Discarded);
    assert!(table.sensors().light.is_none());
}

#[test]
fn test_telemetry_response() {
    let (mut table, mock, _) = table(vec![light_app()]);
    table.initialize().unwrap();
    let socket = mock.socket_of(LIGHT_APP_ID).unwrap();

    let outcome = table.on_response(socket, &BlockBuilder::telemetry(r#"{"light_intensity":42.5}"#));
    assert_eq!(outcome, Dispatched::Telemetry(r#"{"light_intensity":42.5}"#.into()));

    let outcome = table.on_response(socket, &BlockBuilder::telemetry("{broken"));
    assert_eq!(outcome, Dispatched::Discarded);
}

#[test]
fn test_acks_and_heartbeats() {
    let (mut table, mock, _) = table(vec![light_app()]);
    table.initialize().unwrap();
    let socket = mock.socket_of(LIGHT_APP_ID).unwrap();

    assert_eq!(table.on_response(socket, &BlockBuilder::sample_rate_ack(30)), Dispatched::SampleRateAck(30));
    assert_eq!(table.on_response(socket, &BlockBuilder::heartbeat()), Dispatched::Heartbeat);
    assert_eq!(table.on_response(socket, &[]), Dispatched::Discarded);
}

#[test]
fn test_unknown_tag_changes_nothing() {
    let (mut table, mock, faults) = table(vec![light_app(), gps_app()]);
    table.initialize().unwrap();
    let sockets: Vec<_> = table.apps().iter().map(|a| a.socket()).collect();
    mock.clear_calls();

    for tag in [0u8, 9, 0xff] {
        let outcome = table.on_response(mock.socket_of(GPS_APP_ID).unwrap(), &BlockBuilder::with_tag(tag));
        assert_eq!(outcome, Dispatched::Unknown(tag));
    }

    let after: Vec<_> = table.apps().iter().map(|a| a.socket()).collect();
    assert_eq!(sockets, after);
    assert!(table.sensors().light.is_none() && table.sensors().gps.is_none());
    assert!(mock.calls().is_empty());
    assert_eq!(faults.get(), None);
}

#[test]
fn test_requests_follow_hooks() {
    let (mut table, mock, _) = table(vec![
        light_app(),
        RealTimeApp::generic("plain", GPS_APP_ID),
    ]);
    table.initialize().unwrap();
    mock.clear_calls();
    let light = mock.socket_of(LIGHT_APP_ID).unwrap();
    let plain = mock.socket_of(GPS_APP_ID).unwrap();

    table.request_raw_data();
    assert_eq!(mock.sent_commands().len(), 1);
    assert_eq!(mock.sent_to(light)[0].cmd, InterCoreCmd::ReadSensor);

    mock.clear_calls();
    table.request_telemetry();
    assert_eq!(mock.sent_to(light)[0].cmd, InterCoreCmd::ReadSensorRespondWithTelemetry);
    assert_eq!(mock.sent_to(plain)[0].cmd, InterCoreCmd::ReadSensorRespondWithTelemetry);
}

#[test]
fn test_sample_interval_broadcast() {
    let (mut table, mock, _) = table(vec![light_app(), gps_app()]);
    table.initialize().unwrap();
    mock.clear_calls();

    table.set_sample_interval(0);
    let sent = mock.sent_commands();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|(_, b)| b.cmd == InterCoreCmd::SetSampleRate && b.sample_rate == 0));
}

#[test]
fn test_send_failure_is_recorded() {
    let (mut table, mock, faults) = table(vec![light_app()]);
    table.initialize().unwrap();
    mock.fail_sends(true);

    table.request_raw_data();
    assert_eq!(faults.get(), Some(FaultCode::WriteRtSocket));
}

#[test]
fn test_receive_error_is_recorded() {
    let (mut table, mock, faults) = table(vec![light_app()]);
    table.initialize().unwrap();

    let socket = mock.socket_of(LIGHT_APP_ID).unwrap();
    table.on_receive_error(socket, &io::Error::new(io::ErrorKind::TimedOut, "timed out"));
    assert_eq!(faults.get(), Some(FaultCode::ReadRtSocket));
}

#[test]
fn test_find_and_shutdown() {
    let (mut table, mock, _) = table(vec![light_app(), gps_app()]);
    assert_eq!(table.find_by_socket(SocketHandle(10)), None);

    table.initialize().unwrap();
    let gps = mock.socket_of(GPS_APP_ID).unwrap();
    assert_eq!(table.find_by_socket(gps), Some(1));
    assert_eq!(table.find_by_socket(SocketHandle(-1)), None);

    table.shutdown();
    let mut closed = mock.closed();
    closed.sort();
    let mut expected: Vec<_> = table.apps().iter().filter_map(|a| a.socket()).collect();
    expected.sort();
    assert_eq!(closed, expected);
}
