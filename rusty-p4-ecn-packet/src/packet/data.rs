use super::Packet;
use bytes::BufMut;

/// Opaque payload bytes, borrowed from the frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Data<'a>(pub &'a [u8]);

impl<'a> Packet<'a> for Data<'a> {
    type Payload = ();

    fn self_bytes_hint(&self) -> usize {
        self.0.len()
    }

    fn from_bytes(b: &'a [u8]) -> Option<Self> {
        Some(Data(b))
    }

    fn write_self_to_buf<T: BufMut>(&self, buf: &mut T) {
        buf.put_slice(self.0);
    }

    fn get_payload(&self) -> Option<&Self::Payload> {
        None
    }
}
