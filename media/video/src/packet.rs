use bytes::{Buf, BufMut, Bytes};

/// Size of the chunk header
pub const HEADER_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("encoded frame of {size} bytes would need {chunks} chunks")]
    FrameTooLarge { size: usize, chunks: usize },
}

/// Header prefixed to every video chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub frame_id: u64,
    pub total: u16,
    pub index: u16,
}

impl ChunkHeader {
    /// Read the header from the front of `buf`, advancing it past the header
    pub fn parse(buf: &mut &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }

        Some(Self {
            frame_id: buf.get_u64(),
            total: buf.get_u16(),
            index: buf.get_u16(),
        })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.frame_id);
        buf.put_u16(self.total);
        buf.put_u16(self.index);
    }
}

/// A single received chunk of an encoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub payload: Bytes,
}

impl Chunk {
    /// Parse a received datagram, returns `None` if it is shorter than the header
    pub fn parse(mut datagram: &[u8]) -> Option<Self> {
        let header = ChunkHeader::parse(&mut datagram)?;

        Some(Self {
            header,
            payload: Bytes::copy_from_slice(datagram),
        })
    }
}

/// Split an encoded frame into datagrams of at most `max_payload` fragment bytes each.
///
/// Frames which would need more than `max_chunks` datagrams are refused as a whole. An empty
/// frame still produces a single (empty) chunk so the receiver sees a complete frame.
pub fn fragment(
    frame_id: u64,
    data: &[u8],
    max_payload: usize,
    max_chunks: usize,
) -> Result<Vec<Bytes>, FragmentError> {
    let max_payload = max_payload.max(1);
    let chunks = data.len().div_ceil(max_payload).max(1);

    if chunks > max_chunks || chunks > usize::from(u16::MAX) {
        return Err(FragmentError::FrameTooLarge {
            size: data.len(),
            chunks,
        });
    }

    let total = chunks as u16;

    let datagrams = (0..total)
        .map(|index| {
            let start = usize::from(index) * max_payload;
            let end = (start + max_payload).min(data.len());
            let fragment = &data[start.min(end)..end];

            let mut datagram = Vec::with_capacity(HEADER_LEN + fragment.len());

            ChunkHeader {
                frame_id,
                total,
                index,
            }
            .encode(&mut datagram);
            datagram.put_slice(fragment);

            Bytes::from(datagram)
        })
        .collect();

    Ok(datagrams)
}
