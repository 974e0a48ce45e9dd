/*!
# rtcore DevKit - Stubs and helpers for kernel tests

Lets the kernel be exercised without real-time cores or an IoT Hub:
- Recording intercore transport with injectable failures
- Recording cloud link
- In-memory session store
- Builders for raw sensor blocks, telemetry responses and handshakes
- A harness wiring all of the above into a `Gateway`
*/

pub mod builders;
pub mod cloud_stub;
pub mod intercore_stub;
pub mod store_stub;
pub mod test_utils;

pub use builders::{fixed_time, BlockBuilder, HandshakeBuilder};
pub use cloud_stub::MockCloudLink;
pub use intercore_stub::{IntercoreCall, MockIntercore};
pub use store_stub::MemorySessionStore;
pub use test_utils::{gps_app, init_tracing, light_app, TestHarness, GPS_APP_ID, LIGHT_APP_ID};
