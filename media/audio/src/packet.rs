use bytes::{Buf, BufMut, Bytes};

/// Size of the sequence number prefix
pub const HEADER_LEN: usize = 2;

/// A single audio datagram: `[u16 BE sequence number][μ-law payload]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    pub sequence: u16,
    pub payload: Bytes,
}

impl AudioPacket {
    /// Parse a received datagram, returns `None` if it is shorter than the header
    pub fn parse(mut datagram: &[u8]) -> Option<Self> {
        if datagram.len() < HEADER_LEN {
            return None;
        }

        let sequence = datagram.get_u16();

        Some(Self {
            sequence,
            payload: Bytes::copy_from_slice(datagram),
        })
    }

    /// Write the header for `sequence` into `buf`, the payload is appended by the caller
    pub fn write_header(sequence: u16, buf: &mut impl BufMut) {
        buf.put_u16(sequence);
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        Self::write_header(self.sequence, buf);
        buf.put_slice(&self.payload);
    }
}
