use crate::packet::Chunk;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// Reason a chunk was not accepted into the reassembly table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChunkRejected {
    #[error("chunk declares zero total chunks")]
    ZeroTotal,
    #[error("chunk declares {total} total chunks, at most {max} are accepted")]
    TooManyChunks { total: u16, max: u16 },
    #[error("chunk index {index} out of range for {total} chunks")]
    IndexOutOfRange { index: u16, total: u16 },
    #[error("frame {frame_id} is pending with {expected} chunks, chunk declares {declared}")]
    TotalMismatch {
        frame_id: u64,
        expected: u16,
        declared: u16,
    },
}

struct PendingFrame {
    chunks: Vec<Option<Bytes>>,
    received: usize,
}

impl PendingFrame {
    fn new(total: u16) -> Self {
        Self {
            chunks: vec![None; usize::from(total)],
            received: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.chunks.len()
    }

    fn assemble(self) -> Bytes {
        let len = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut frame = BytesMut::with_capacity(len);

        for chunk in self.chunks.into_iter().flatten() {
            frame.extend_from_slice(&chunk);
        }

        frame.freeze()
    }
}

/// Collects chunks of encoded frames until all chunks of a frame have arrived.
///
/// The table never holds more than `capacity` incomplete frames, opening a new frame while full
/// evicts the one with the lowest id. Frames declaring more than `max_chunks` chunks are never
/// opened.
pub struct FrameReassembler {
    frames: BTreeMap<u64, PendingFrame>,
    capacity: usize,
    max_chunks: u16,
}

impl FrameReassembler {
    pub fn new(capacity: usize, max_chunks: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            capacity: capacity.max(1),
            max_chunks: u16::try_from(max_chunks).unwrap_or(u16::MAX).max(1),
        }
    }

    /// Number of incomplete frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Insert a chunk, returns the assembled frame once its last missing chunk arrived.
    ///
    /// Duplicate chunks are ignored.
    pub fn insert(&mut self, chunk: Chunk) -> Result<Option<Bytes>, ChunkRejected> {
        let Chunk { header, payload } = chunk;

        if header.total == 0 {
            return Err(ChunkRejected::ZeroTotal);
        }

        if header.total > self.max_chunks {
            return Err(ChunkRejected::TooManyChunks {
                total: header.total,
                max: self.max_chunks,
            });
        }

        if header.index >= header.total {
            return Err(ChunkRejected::IndexOutOfRange {
                index: header.index,
                total: header.total,
            });
        }

        if let Some(pending) = self.frames.get(&header.frame_id) {
            if pending.chunks.len() != usize::from(header.total) {
                return Err(ChunkRejected::TotalMismatch {
                    frame_id: header.frame_id,
                    expected: pending.chunks.len() as u16,
                    declared: header.total,
                });
            }
        } else {
            while self.frames.len() >= self.capacity {
                if let Some((evicted, _)) = self.frames.pop_first() {
                    log::trace!("evicting incomplete frame {evicted}, reassembly table is full");
                }
            }

            self.frames
                .insert(header.frame_id, PendingFrame::new(header.total));
        }

        let Some(pending) = self.frames.get_mut(&header.frame_id) else {
            return Ok(None);
        };

        let slot = &mut pending.chunks[usize::from(header.index)];

        if slot.is_some() {
            return Ok(None);
        }

        *slot = Some(payload);
        pending.received += 1;

        if !pending.is_complete() {
            return Ok(None);
        }

        Ok(self
            .frames
            .remove(&header.frame_id)
            .map(PendingFrame::assemble))
    }

    /// Drop every incomplete frame if more than `threshold` are pending.
    ///
    /// Returns the number of dropped frames.
    pub fn sweep(&mut self, threshold: usize) -> usize {
        if self.frames.len() <= threshold {
            return 0;
        }

        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{ChunkHeader, fragment};

    fn chunk(frame_id: u64, total: u16, index: u16, payload: &'static [u8]) -> Chunk {
        Chunk {
            header: ChunkHeader {
                frame_id,
                total,
                index,
            },
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn single_chunk_frame() {
        let mut table = FrameReassembler::new(128, 100);

        let frame = table.insert(chunk(1, 1, 0, b"abc")).unwrap();

        assert_eq!(frame.as_deref(), Some(&b"abc"[..]));
        assert!(table.is_empty());
    }

    #[test]
    fn any_arrival_order_restores_frame() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();
        let chunks: Vec<Chunk> = fragment(42, &data, 1000, 100)
            .unwrap()
            .iter()
            .map(|d| Chunk::parse(d).unwrap())
            .collect();
        assert_eq!(chunks.len(), 5);

        let orders: [[usize; 5]; 4] = [
            [0, 1, 2, 3, 4],
            [4, 3, 2, 1, 0],
            [2, 0, 4, 1, 3],
            [1, 4, 0, 3, 2],
        ];

        for order in orders {
            let mut table = FrameReassembler::new(128, 100);

            for (n, &i) in order.iter().enumerate() {
                let result = table.insert(chunks[i].clone()).unwrap();

                if n + 1 < order.len() {
                    assert!(result.is_none());
                    assert_eq!(table.len(), 1);
                } else {
                    assert_eq!(result.as_deref(), Some(&data[..]));
                    assert!(table.is_empty());
                }
            }
        }
    }

    #[test]
    fn duplicate_chunk_is_ignored() {
        let mut table = FrameReassembler::new(128, 100);

        assert!(table.insert(chunk(1, 2, 0, b"ab")).unwrap().is_none());
        assert!(table.insert(chunk(1, 2, 0, b"XX")).unwrap().is_none());

        let frame = table.insert(chunk(1, 2, 1, b"cd")).unwrap();
        assert_eq!(frame.as_deref(), Some(&b"abcd"[..]));
    }

    #[test]
    fn mismatched_total_does_not_corrupt_entry() {
        let mut table = FrameReassembler::new(128, 100);

        assert!(table.insert(chunk(9, 3, 0, b"a")).unwrap().is_none());

        assert_eq!(
            table.insert(chunk(9, 2, 1, b"X")),
            Err(ChunkRejected::TotalMismatch {
                frame_id: 9,
                expected: 3,
                declared: 2,
            })
        );

        assert!(table.insert(chunk(9, 3, 1, b"b")).unwrap().is_none());
        let frame = table.insert(chunk(9, 3, 2, b"c")).unwrap();

        assert_eq!(frame.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let mut table = FrameReassembler::new(128, 100);

        assert_eq!(
            table.insert(chunk(1, 0, 0, b"")),
            Err(ChunkRejected::ZeroTotal)
        );
        assert_eq!(
            table.insert(chunk(1, 2, 2, b"")),
            Err(ChunkRejected::IndexOutOfRange { index: 2, total: 2 })
        );
        assert!(table.is_empty());
    }

    #[test]
    fn oversized_frames_are_never_opened() {
        let mut table = FrameReassembler::new(128, 100);

        for id in 0..128 {
            assert_eq!(
                table.insert(chunk(id, u16::MAX, 0, b"")),
                Err(ChunkRejected::TooManyChunks {
                    total: u16::MAX,
                    max: 100,
                })
            );
        }
        assert!(table.is_empty());

        assert_eq!(
            table.insert(chunk(1, 101, 100, b"x")),
            Err(ChunkRejected::TooManyChunks { total: 101, max: 100 })
        );

        // the largest frame a sender produces is still accepted
        assert!(table.insert(chunk(1, 100, 99, b"x")).unwrap().is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn full_table_evicts_oldest() {
        let mut table = FrameReassembler::new(3, 100);

        for id in [5, 2, 8] {
            table.insert(chunk(id, 2, 0, b"x")).unwrap();
        }
        assert_eq!(table.len(), 3);

        table.insert(chunk(10, 2, 0, b"x")).unwrap();
        assert_eq!(table.len(), 3);

        // frame 2 was evicted and starts over
        assert!(table.insert(chunk(2, 2, 1, b"y")).unwrap().is_none());
        // frame 5 was evicted by the line above, 8 is still complete-able
        assert_eq!(
            table.insert(chunk(8, 2, 1, b"y")).unwrap().as_deref(),
            Some(&b"xy"[..])
        );
    }

    #[test]
    fn sweep_clears_only_above_threshold() {
        let mut table = FrameReassembler::new(128, 100);

        for id in 0..50 {
            table.insert(chunk(id, 2, 0, b"x")).unwrap();
        }

        assert_eq!(table.sweep(50), 0);
        assert_eq!(table.len(), 50);

        table.insert(chunk(50, 2, 0, b"x")).unwrap();

        assert_eq!(table.sweep(50), 51);
        assert!(table.is_empty());
    }
}
