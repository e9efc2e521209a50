//! Constants used throughout the transport
//! Default identifiers and timings for talking to the Blox appliance.
//! Every value here is only a default; `TransportConfig` can override it.

use uuid::Uuid;

/// Advertised name of the Blox appliance
pub const BLOX_DEVICE_NAME: &str = "Blox";

/// The UUID of the Blox command service
pub const UUID_BLOX_SERVICE: Uuid = Uuid::from_u128(0x00000001_710e_4a5b_8d75_3e5b444bc3cf);

/// The UUID of the Blox command characteristic (write + notify)
pub const UUID_BLOX_COMMAND_CHAR: Uuid = Uuid::from_u128(0x00000003_710e_4a5b_8d75_3e5b444bc3cf);

/// Marker of a chunked response header
pub const HEADER_MARKER: &str = "ble_header";

/// Marker of a chunked response fragment
pub const CHUNK_MARKER: &str = "ble_chunk";

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Delay after connecting before the link is used, in milliseconds
pub const DEFAULT_STABILIZATION_DELAY_MS: u64 = 1000;

/// How long to wait for the adapter to become available, in seconds
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 10;

/// Default timeout of a single BLE command, in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default timeout of a fallback HTTP call, in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Address of the appliance's local API while it serves its own hotspot
pub const DEFAULT_HTTP_BASE_URL: &str = "http://10.42.0.1:3500";

/// Capacity of the notification pump queue
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 64;
