/*!
Test harness for the kernel

Builds a `Gateway` on top of the mocks and keeps a handle on each mock for
assertions.
*/

use crate::builders::HandshakeBuilder;
use crate::cloud_stub::MockCloudLink;
use crate::intercore_stub::MockIntercore;
use crate::store_stub::MemorySessionStore;
use rtcore_kernel::intercore::{
    AlsPt19Decoder, DispatchError, DispatchSettings, DispatchTable, Endpoint, GroveGpsDecoder, HookSet,
    IntercoreEvent, RealTimeApp, SocketHandle,
};
use rtcore_kernel::iotconnect::{IotConnectAdapter, DEFAULT_HELLO_PERIOD};
use rtcore_kernel::{CloudEvent, Gateway, GatewayOptions, LastFault};
use tracing_subscriber::EnvFilter;

pub const LIGHT_APP_ID: &str = "f6768b9a-e086-4f5a-8219-5ffe9684b001";
pub const GPS_APP_ID: &str = "7e3f5b3c-9c3a-4b7e-8b64-6d3e4f2a1c02";

/// Installs a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

pub fn light_app() -> RealTimeApp {
    RealTimeApp::new(
        Endpoint::new("ALS-PT19 light sensor", LIGHT_APP_ID),
        HookSet::generic().with_raw_data(Box::new(AlsPt19Decoder)),
    )
}

pub fn gps_app() -> RealTimeApp {
    RealTimeApp::new(
        Endpoint::new("Grove GPS", GPS_APP_ID),
        HookSet::generic().with_raw_data(Box::new(GroveGpsDecoder)),
    )
}

pub struct TestHarness {
    pub intercore: MockIntercore,
    pub cloud: MockCloudLink,
    pub store: MemorySessionStore,
    pub faults: LastFault,
    pub gateway: Gateway<MockCloudLink>,
}

impl TestHarness {
    pub fn new(apps: Vec<RealTimeApp>) -> Self {
        Self::with_parts(apps, MemorySessionStore::new(), GatewayOptions::default())
    }

    /// The stock two-app setup: light sensor and GPS.
    pub fn light_and_gps() -> Self {
        Self::new(vec![light_app(), gps_app()])
    }

    pub fn with_parts(apps: Vec<RealTimeApp>, store: MemorySessionStore, options: GatewayOptions) -> Self {
        init_tracing();

        let intercore = MockIntercore::new();
        let cloud = MockCloudLink::new();
        let faults = LastFault::new();

        let dispatch = DispatchTable::new(
            apps,
            Box::new(intercore.clone()),
            DispatchSettings::default(),
            faults.clone(),
        );
        let iotc = IotConnectAdapter::new(Box::new(store.clone()), DEFAULT_HELLO_PERIOD, faults.clone());
        let gateway = Gateway::new(dispatch, iotc, cloud.clone(), options, faults.clone());

        Self {
            intercore,
            cloud,
            store,
            faults,
            gateway,
        }
    }

    pub fn start(&mut self) -> Result<(), DispatchError> {
        self.gateway.start()
    }

    pub fn socket_of(&self, component_id: &str) -> SocketHandle {
        self.intercore
            .socket_of(component_id)
            .unwrap_or_else(|| panic!("{component_id} was never connected"))
    }

    /// Feeds bytes as if they arrived on the app's socket.
    pub fn deliver(&mut self, component_id: &str, bytes: Vec<u8>) {
        let socket = self.socket_of(component_id);
        self.gateway.handle_intercore(IntercoreEvent::Message { socket, bytes });
    }

    /// Cloud connection followed by a complete IoT Connect handshake.
    pub fn complete_handshake(&mut self, sid: &str) -> HandshakeBuilder {
        let handshake = HandshakeBuilder::complete(sid);
        self.gateway.on_cloud_event(CloudEvent::Connected);
        self.gateway.on_cloud_event(CloudEvent::Message(handshake.build()));
        handshake
    }
}
