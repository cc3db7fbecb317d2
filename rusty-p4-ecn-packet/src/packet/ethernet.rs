use super::Packet;
use crate::mac::MAC;
use byteorder::{BigEndian, ByteOrder};
use bytes::BufMut;
use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use std::fmt::{Debug, Formatter};

pub const ETHERNET_HEADER_LEN: usize = 14;

pub struct Ethernet<P> {
    pub dst: MAC,
    pub src: MAC,
    pub ether_type: u16,
    pub payload: P,
}

impl<P> Debug for Ethernet<P> {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "src: {:?} dst: {:?} type: {:#06x}",
            self.src, self.dst, self.ether_type
        )
    }
}

impl Ethernet<()> {
    /// Reads the type field without parsing the rest of the frame.
    pub fn peek_ether_type(b: &[u8]) -> Option<u16> {
        if b.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        Some(BigEndian::read_u16(&b[12..14]))
    }
}

fn take_mac(b: &[u8]) -> Option<(&[u8], MAC)> {
    let (b, raw) = take::<_, _, ()>(6u8)(b).ok()?;
    let mut mac = [0u8; 6];
    mac.copy_from_slice(raw);
    Some((b, MAC(mac)))
}

impl<'a, P> Packet<'a> for Ethernet<P>
where
    P: Packet<'a>,
{
    type Payload = P;

    fn self_bytes_hint(&self) -> usize {
        ETHERNET_HEADER_LEN
    }

    fn from_bytes(b: &'a [u8]) -> Option<Self> {
        let (b, dst) = take_mac(b)?;
        let (b, src) = take_mac(b)?;
        let (b, ether_type) = be_u16::<_, ()>(b).ok()?;
        let payload = P::from_bytes(b)?;
        Some(Ethernet {
            dst,
            src,
            ether_type,
            payload,
        })
    }

    fn write_self_to_buf<T: BufMut>(&self, buf: &mut T) {
        buf.put_slice(&self.dst.0);
        buf.put_slice(&self.src.0);
        buf.put_u16(self.ether_type);
    }

    fn get_payload(&self) -> Option<&Self::Payload> {
        Some(&self.payload)
    }
}
