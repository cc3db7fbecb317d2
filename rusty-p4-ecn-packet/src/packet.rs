use bytes::{BufMut, Bytes, BytesMut};

pub use data::Data;
pub use ethernet::Ethernet;
pub use telemetry::{MalformedTelemetry, Telemetry};

pub mod data;
pub mod ethernet;
pub mod telemetry;

pub trait Packet<'a>
where
    Self: Sized,
{
    type Payload: Packet<'a>;

    fn self_bytes_hint(&self) -> usize;

    fn from_bytes(b: &'a [u8]) -> Option<Self>;

    fn write_self_to_buf<T: BufMut>(&self, buf: &mut T);

    fn write_all_to_buf<T: BufMut>(&self, buf: &mut T) {
        self.write_self_to_buf(buf);
        if let Some(payload) = self.get_payload() {
            payload.write_all_to_buf(buf);
        }
    }

    fn get_payload(&self) -> Option<&Self::Payload>;

    fn bytes_hint(&self) -> usize {
        let mut size = self.self_bytes_hint();
        if let Some(payload) = self.get_payload() {
            size += payload.bytes_hint();
        }
        size
    }

    fn write_to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.bytes_hint());
        self.write_all_to_buf(&mut buffer);
        buffer.freeze()
    }
}

impl<'a> Packet<'a> for () {
    type Payload = ();

    fn self_bytes_hint(&self) -> usize {
        0
    }

    fn from_bytes(_b: &'a [u8]) -> Option<Self> {
        Some(())
    }

    fn write_self_to_buf<T: BufMut>(&self, _buf: &mut T) {}

    fn get_payload(&self) -> Option<&Self::Payload> {
        None
    }
}
