pub mod mac;
pub mod packet;

pub use mac::{MacParseError, MAC};
pub use packet::ethernet::ETHERNET_HEADER_LEN;
pub use packet::{Data, Ethernet, MalformedTelemetry, Packet, Telemetry};
