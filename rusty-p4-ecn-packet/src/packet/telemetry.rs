use super::Packet;
use bytes::BufMut;
use nom::number::complete::be_u32;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Congestion report emitted by the egress pipeline towards the CPU port.
///
/// Layout, most significant bit first:
///
/// ```text
/// | src_ip:32 | dst_ip:32 | egress_port:9 | threshold:19 | pad:4 |
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub egress_port: u16,
    pub threshold: u32,
    pub pad: u8,
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("telemetry record needs {expected} bytes, got {actual}")]
pub struct MalformedTelemetry {
    pub expected: usize,
    pub actual: usize,
}

const PORT_BITS: u32 = 9;
const THRESHOLD_BITS: u32 = 19;
const PAD_BITS: u32 = 4;

const PORT_MASK: u32 = (1 << PORT_BITS) - 1;
const THRESHOLD_MASK: u32 = (1 << THRESHOLD_BITS) - 1;
const PAD_MASK: u32 = (1 << PAD_BITS) - 1;

impl Telemetry {
    /// 96 bits on the wire.
    pub const LEN: usize = 12;

    pub fn decode(b: &[u8]) -> Result<Telemetry, MalformedTelemetry> {
        let malformed = MalformedTelemetry {
            expected: Self::LEN,
            actual: b.len(),
        };
        if b.len() < Self::LEN {
            return Err(malformed);
        }
        let (b, src) = be_u32::<_, ()>(b).map_err(|_| malformed)?;
        let (b, dst) = be_u32::<_, ()>(b).map_err(|_| malformed)?;
        let (_, word) = be_u32::<_, ()>(b).map_err(|_| malformed)?;
        Ok(Telemetry {
            src: Ipv4Addr::from(src),
            dst: Ipv4Addr::from(dst),
            egress_port: ((word >> (THRESHOLD_BITS + PAD_BITS)) & PORT_MASK) as u16,
            threshold: (word >> PAD_BITS) & THRESHOLD_MASK,
            pad: (word & PAD_MASK) as u8,
        })
    }

    fn packed_word(&self) -> u32 {
        ((self.egress_port as u32 & PORT_MASK) << (THRESHOLD_BITS + PAD_BITS))
            | ((self.threshold & THRESHOLD_MASK) << PAD_BITS)
            | (self.pad as u32 & PAD_MASK)
    }
}

impl<'a> Packet<'a> for Telemetry {
    type Payload = ();

    fn self_bytes_hint(&self) -> usize {
        Self::LEN
    }

    fn from_bytes(b: &'a [u8]) -> Option<Self> {
        Telemetry::decode(b).ok()
    }

    fn write_self_to_buf<T: BufMut>(&self, buf: &mut T) {
        buf.put_u32(u32::from(self.src));
        buf.put_u32(u32::from(self.dst));
        buf.put_u32(self.packed_word());
    }

    fn get_payload(&self) -> Option<&Self::Payload> {
        None
    }
}
