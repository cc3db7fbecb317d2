use rusty_p4_ecn_packet::Telemetry;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// A threshold crossing seen by the data plane.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CongestionEvent {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub egress_port: u16,
    pub threshold: u32,
}

impl From<Telemetry> for CongestionEvent {
    fn from(t: Telemetry) -> Self {
        CongestionEvent {
            src: t.src,
            dst: t.dst,
            egress_port: t.egress_port,
            threshold: t.threshold,
        }
    }
}

/// A [CongestionEvent] tagged with the switch that reported it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CongestionReport {
    pub switch: String,
    #[serde(flatten)]
    pub event: CongestionEvent,
}

impl Display for CongestionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: congestion on port {} (threshold {}) for {} -> {}",
            self.switch, self.event.egress_port, self.event.threshold, self.event.src, self.event.dst
        )
    }
}
