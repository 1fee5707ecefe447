//! Client session behaviour against a recording adapter.

use gattlink::ble::gatt::{CharProperties, GattCharacteristic, GattDescriptor, GattService};
use gattlink::ble::uuids::uuid_from_u16;
use gattlink::{
    AdapterState, AttributePath, CentralAdapter, CentralCallback, ClientEvent, ClientSession,
    ClientState, Error, GattStatus, Result, ScanApi, TransportConfig, WriteType,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEVICE_A: &str = "AA:AA:AA:AA:AA:01";
const DEVICE_B: &str = "BB:BB:BB:BB:BB:02";

const SERVICE: Uuid = uuid_from_u16(0xffe0);
const DATA: Uuid = uuid_from_u16(0xffe1);
const ALERT: Uuid = uuid_from_u16(0xffe2);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect(String),
    Disconnect(String),
    DiscoverServices(String),
    Read(AttributePath),
    Write(AttributePath, Vec<u8>, WriteType),
    LocalNotify(AttributePath, bool),
    WriteDescriptor(AttributePath, Vec<u8>),
}

#[derive(Default)]
struct RecordingCentral {
    calls: Mutex<Vec<Call>>,
}

impl RecordingCentral {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

impl CentralAdapter for RecordingCentral {
    fn state(&self) -> AdapterState {
        AdapterState::Enabled
    }

    fn scan_api(&self) -> ScanApi {
        ScanApi::Modern
    }

    fn start_scan(&self) -> Result<()> {
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    fn connect(&self, address: &str) -> Result<()> {
        self.record(Call::Connect(address.to_string()))
    }

    fn disconnect(&self, address: &str) -> Result<()> {
        self.record(Call::Disconnect(address.to_string()))
    }

    fn discover_services(&self, address: &str) -> Result<()> {
        self.record(Call::DiscoverServices(address.to_string()))
    }

    fn read_characteristic(&self, _address: &str, path: &AttributePath) -> Result<()> {
        self.record(Call::Read(*path))
    }

    fn write_characteristic(
        &self,
        _address: &str,
        path: &AttributePath,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        self.record(Call::Write(*path, value.to_vec(), write_type))
    }

    fn set_notification_enabled(
        &self,
        _address: &str,
        path: &AttributePath,
        enabled: bool,
    ) -> Result<()> {
        self.record(Call::LocalNotify(*path, enabled))
    }

    fn write_descriptor(&self, _address: &str, path: &AttributePath, value: &[u8]) -> Result<()> {
        self.record(Call::WriteDescriptor(*path, value.to_vec()))
    }
}

fn profile() -> Vec<GattService> {
    vec![GattService::primary(SERVICE)
        .with_characteristic(
            GattCharacteristic::new(
                DATA,
                CharProperties::READ | CharProperties::WRITE | CharProperties::NOTIFY,
            )
            .with_descriptor(GattDescriptor::cccd()),
        )
        .with_characteristic(
            GattCharacteristic::new(ALERT, CharProperties::INDICATE)
                .with_descriptor(GattDescriptor::cccd()),
        )]
}

fn data_path() -> AttributePath {
    AttributePath::characteristic(SERVICE, DATA)
}

fn alert_path() -> AttributePath {
    AttributePath::characteristic(SERVICE, ALERT)
}

fn session() -> (Arc<RecordingCentral>, ClientSession) {
    let adapter = Arc::new(RecordingCentral::default());
    let session = ClientSession::new(adapter.clone(), TransportConfig::default());
    (adapter, session)
}

fn bring_up(session: &ClientSession, address: &str) {
    session.connect(address).unwrap();
    session.handle_callback(CentralCallback::ConnectionStateChanged {
        address: address.to_string(),
        status: GattStatus::SUCCESS,
        connected: true,
    });
    session.handle_callback(CentralCallback::ServicesDiscovered {
        address: address.to_string(),
        status: GattStatus::SUCCESS,
        services: profile(),
    });
    assert_eq!(session.state(), ClientState::Ready);
}

fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn connect_while_connecting_tears_down_once() {
    let (adapter, session) = session();

    session.connect(DEVICE_A).unwrap();
    session.connect(DEVICE_B).unwrap();

    assert_eq!(
        adapter.calls(),
        vec![
            Call::Connect(DEVICE_A.to_string()),
            Call::Disconnect(DEVICE_A.to_string()),
            Call::Connect(DEVICE_B.to_string()),
        ]
    );
    assert_eq!(session.state(), ClientState::Connecting);
    assert_eq!(session.device().as_deref(), Some(DEVICE_B));
}

#[test]
fn connect_while_ready_tears_down_once() {
    let (adapter, session) = session();
    bring_up(&session, DEVICE_A);
    adapter.clear();

    session.connect(DEVICE_B).unwrap();

    assert_eq!(
        adapter.calls(),
        vec![
            Call::Disconnect(DEVICE_A.to_string()),
            Call::Connect(DEVICE_B.to_string()),
        ]
    );
    assert!(session.services().is_empty());
}

#[test]
fn reconnect_to_same_device_reaches_discovery() {
    let (adapter, session) = session();

    session.connect(DEVICE_A).unwrap();
    session.connect(DEVICE_A).unwrap();
    // The torn-down link reports its drop after the new attempt started.
    session.handle_callback(CentralCallback::ConnectionStateChanged {
        address: DEVICE_A.to_string(),
        status: GattStatus::SUCCESS,
        connected: false,
    });
    session.handle_callback(CentralCallback::ConnectionStateChanged {
        address: DEVICE_A.to_string(),
        status: GattStatus::SUCCESS,
        connected: true,
    });

    assert_eq!(
        adapter.calls(),
        vec![
            Call::Connect(DEVICE_A.to_string()),
            Call::Disconnect(DEVICE_A.to_string()),
            Call::Connect(DEVICE_A.to_string()),
            Call::DiscoverServices(DEVICE_A.to_string()),
        ]
    );
    assert_eq!(session.state(), ClientState::DiscoveringServices);
    assert_eq!(session.device().as_deref(), Some(DEVICE_A));
}

#[test]
fn callbacks_from_previous_device_are_ignored() {
    let (adapter, session) = session();
    session.connect(DEVICE_A).unwrap();
    session.connect(DEVICE_B).unwrap();

    session.handle_callback(CentralCallback::ConnectionStateChanged {
        address: DEVICE_A.to_string(),
        status: GattStatus::SUCCESS,
        connected: true,
    });

    assert_eq!(session.state(), ClientState::Connecting);
    assert!(!adapter
        .calls()
        .contains(&Call::DiscoverServices(DEVICE_A.to_string())));
}

#[test]
fn operations_need_a_ready_link() {
    let (adapter, session) = session();

    assert!(matches!(session.read(SERVICE, DATA), Err(Error::NotConnected)));
    assert!(matches!(
        session.write(SERVICE, DATA, b"hello"),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        session.set_notification(SERVICE, DATA, true),
        Err(Error::NotConnected)
    ));

    session.connect(DEVICE_A).unwrap();
    assert!(matches!(session.read(SERVICE, DATA), Err(Error::NotConnected)));

    assert_eq!(adapter.calls(), vec![Call::Connect(DEVICE_A.to_string())]);
}

#[test]
fn chunked_write_waits_for_each_acknowledgement() {
    let (adapter, session) = session();
    bring_up(&session, DEVICE_A);
    adapter.clear();
    let mut rx = session.subscribe();

    let payload: Vec<u8> = (0..45).collect();
    session.write(SERVICE, DATA, &payload).unwrap();

    let mut sizes = Vec::new();
    for _ in 0..3 {
        let calls = adapter.calls();
        assert_eq!(calls.len(), sizes.len() + 1, "next chunk issued early");
        match calls.last() {
            Some(Call::Write(path, chunk, WriteType::WithResponse)) => {
                assert_eq!(*path, data_path());
                sizes.push(chunk.len());
            }
            other => panic!("unexpected call {:?}", other),
        }
        session.handle_callback(CentralCallback::CharacteristicWrite {
            address: DEVICE_A.to_string(),
            path: data_path(),
            status: GattStatus::SUCCESS,
        });
    }

    assert_eq!(sizes, vec![20, 20, 5]);
    assert_eq!(
        drain(&mut rx),
        vec![ClientEvent::WriteComplete {
            characteristic: data_path(),
            bytes_written: 45,
        }]
    );
}

#[test]
fn second_operation_is_rejected_while_one_is_pending() {
    let (_adapter, session) = session();
    bring_up(&session, DEVICE_A);

    session.read(SERVICE, DATA).unwrap();
    assert!(matches!(
        session.write(SERVICE, DATA, b"x"),
        Err(Error::AlreadyInProgress { .. })
    ));

    session.handle_callback(CentralCallback::CharacteristicRead {
        address: DEVICE_A.to_string(),
        path: data_path(),
        status: GattStatus::SUCCESS,
        value: b"abc".to_vec(),
    });
    assert!(session.write(SERVICE, DATA, b"x").is_ok());
}

#[test]
fn notifications_flow_after_descriptor_write() {
    let (adapter, session) = session();
    bring_up(&session, DEVICE_A);
    adapter.clear();
    let mut rx = session.subscribe();

    session.set_notification(SERVICE, DATA, true).unwrap();
    assert_eq!(
        adapter.calls(),
        vec![
            Call::LocalNotify(data_path(), true),
            Call::WriteDescriptor(data_path().cccd(), vec![0x01, 0x00]),
        ]
    );
    assert_eq!(session.notifying(), None);

    session.handle_callback(CentralCallback::DescriptorWrite {
        address: DEVICE_A.to_string(),
        path: data_path().cccd(),
        status: GattStatus::SUCCESS,
    });
    assert_eq!(session.notifying(), Some(data_path()));

    session.handle_callback(CentralCallback::CharacteristicChanged {
        address: DEVICE_A.to_string(),
        path: data_path(),
        value: b"reading".to_vec(),
    });

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ClientEvent::NotificationStateChanged {
                characteristic: data_path(),
                enabled: true,
            },
            ClientEvent::NotificationReceived {
                characteristic: data_path(),
                value: bytes::Bytes::from_static(b"reading"),
            },
        ]
    );
}

#[test]
fn failed_link_releases_session_state() {
    let (_adapter, session) = session();
    bring_up(&session, DEVICE_A);
    session.read(SERVICE, DATA).unwrap();

    session.handle_callback(CentralCallback::ConnectionStateChanged {
        address: DEVICE_A.to_string(),
        status: GattStatus(0x08),
        connected: false,
    });

    assert_eq!(session.state(), ClientState::Failed);
    assert_eq!(session.device(), None);
    assert!(session.services().is_empty());
    assert!(matches!(session.read(SERVICE, DATA), Err(Error::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn read_value_times_out_without_callback() {
    let (_adapter, session) = session();
    bring_up(&session, DEVICE_A);

    let result = session
        .read_value(SERVICE, DATA, Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(Error::Timeout)));
}

#[tokio::test]
async fn read_value_returns_the_platform_value() {
    let (_adapter, session) = session();
    let session = Arc::new(session);
    bring_up(&session, DEVICE_A);

    let feeder = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        feeder.handle_callback(CentralCallback::CharacteristicRead {
            address: DEVICE_A.to_string(),
            path: data_path(),
            status: GattStatus::SUCCESS,
            value: vec![0x2a],
        });
    });

    let value = session
        .read_value(SERVICE, DATA, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(&value[..], &[0x2a]);
}

#[test]
fn only_one_characteristic_notifies_at_a_time() {
    let (adapter, session) = session();
    bring_up(&session, DEVICE_A);
    session.set_notification(SERVICE, DATA, true).unwrap();
    session.handle_callback(CentralCallback::DescriptorWrite {
        address: DEVICE_A.to_string(),
        path: data_path().cccd(),
        status: GattStatus::SUCCESS,
    });
    adapter.clear();
    let mut rx = session.subscribe();

    session.set_notification(SERVICE, ALERT, true).unwrap();
    assert_eq!(
        adapter.calls(),
        vec![
            Call::LocalNotify(data_path(), false),
            Call::LocalNotify(alert_path(), true),
            Call::WriteDescriptor(alert_path().cccd(), vec![0x02, 0x00]),
        ]
    );

    session.handle_callback(CentralCallback::DescriptorWrite {
        address: DEVICE_A.to_string(),
        path: alert_path().cccd(),
        status: GattStatus::SUCCESS,
    });
    assert_eq!(session.notifying(), Some(alert_path()));
    assert_eq!(
        drain(&mut rx),
        vec![
            ClientEvent::NotificationStateChanged {
                characteristic: data_path(),
                enabled: false,
            },
            ClientEvent::NotificationStateChanged {
                characteristic: alert_path(),
                enabled: true,
            },
        ]
    );
}
