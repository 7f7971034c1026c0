//! Wire protocol for the audio relay
//!
//! Two variants share one TCP connection model:
//!
//! - **Framed**: every chunk is sent as `[8-byte big-endian length][payload]`.
//!   The reader loops on short reads for both prefix and payload, so arbitrary
//!   TCP segmentation never desynchronizes the frame boundary.
//! - **Fixed**: raw chunks of a size both peers agreed on out of band. No
//!   prefix, no negotiation; a size mismatch silently corrupts the stream.
//!
//! There is no handshake, version field, or checksum. The framed reader also
//! reports how many socket reads a payload took, which the receiver uses as
//! its drift heuristic.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};

use crate::constants::LENGTH_PREFIX_BYTES;
use crate::error::TransferError;

/// Upper bound on a declared payload length. Anything larger means the
/// prefix was parsed out of position or the peer is misbehaving.
pub const MAX_FRAME_BYTES: u64 = 1024 * 1024;

/// Outcome of one framed read
#[derive(Debug)]
pub enum FrameRead<'a> {
    /// A complete payload was reassembled
    Frame {
        payload: &'a [u8],
        /// Number of socket reads spent accumulating the payload
        payload_reads: u64,
    },
    /// The remote closed the connection at or inside a frame
    Closed,
}

/// Outcome of one fixed-size block read
#[derive(Debug, PartialEq, Eq)]
pub enum BlockRead {
    /// The buffer was filled completely
    Block,
    /// The remote closed the connection
    Closed,
}

/// Encode a payload as one framed wire unit
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Write one framed wire unit to the socket
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), TransferError> {
    let prefix = (payload.len() as u64).to_be_bytes();
    writer.write_all(&prefix).map_err(TransferError::Write)?;
    writer.write_all(payload).map_err(TransferError::Write)?;
    Ok(())
}

/// Write one raw chunk to the socket (fixed variant)
pub fn write_block<W: Write>(writer: &mut W, chunk: &[u8]) -> Result<(), TransferError> {
    writer.write_all(chunk).map_err(TransferError::Write)
}

/// Incremental framed reader with a reused payload buffer
pub struct FrameReader {
    payload: Vec<u8>,
    max_frame_bytes: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: u64) -> Self {
        Self {
            payload: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Read exactly one frame, looping on short reads.
    ///
    /// A zero-byte read anywhere — before the prefix, inside it, or while
    /// accumulating the payload — is an orderly remote close.
    pub fn read_frame<'a, R: Read>(
        &'a mut self,
        reader: &mut R,
    ) -> Result<FrameRead<'a>, TransferError> {
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_BYTES {
            match reader.read(&mut prefix[filled..]) {
                Ok(0) => return Ok(FrameRead::Closed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::Read(e)),
            }
        }

        let declared = u64::from_be_bytes(prefix);
        if declared > self.max_frame_bytes {
            return Err(TransferError::FrameTooLarge(declared));
        }

        let declared = declared as usize;
        self.payload.clear();
        self.payload.resize(declared, 0);

        let mut received = 0;
        let mut payload_reads = 0u64;
        while received < declared {
            match reader.read(&mut self.payload[received..]) {
                Ok(0) => return Ok(FrameRead::Closed),
                Ok(n) => {
                    received += n;
                    payload_reads += 1;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::Read(e)),
            }
        }

        Ok(FrameRead::Frame {
            payload: &self.payload,
            payload_reads,
        })
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill `chunk` from the socket, looping on short reads (fixed variant)
pub fn read_block<R: Read>(reader: &mut R, chunk: &mut [u8]) -> Result<BlockRead, TransferError> {
    let mut filled = 0;
    while filled < chunk.len() {
        match reader.read(&mut chunk[filled..]) {
            Ok(0) => return Ok(BlockRead::Closed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Read(e)),
        }
    }
    Ok(BlockRead::Block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Reader that hands out at most `fragment` bytes per call,
    /// simulating heavy TCP segmentation.
    struct FragmentedReader {
        data: Vec<u8>,
        pos: usize,
        fragment: usize,
    }

    impl FragmentedReader {
        fn new(data: Vec<u8>, fragment: usize) -> Self {
            Self {
                data,
                pos: 0,
                fragment,
            }
        }
    }

    impl Read for FragmentedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.data.len() - self.pos;
            let n = remaining.min(self.fragment).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = b"pcm audio bytes".to_vec();
        let wire = encode_frame(&payload);

        let mut reader = FrameReader::new();
        let mut cursor = Cursor::new(wire.to_vec());
        match reader.read_frame(&mut cursor).unwrap() {
            FrameRead::Frame { payload: got, .. } => assert_eq!(got, &payload[..]),
            FrameRead::Closed => panic!("unexpected close"),
        }
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let wire = encode_frame(&[]);
        assert_eq!(wire.len(), LENGTH_PREFIX_BYTES);

        let mut reader = FrameReader::new();
        let mut cursor = Cursor::new(wire.to_vec());
        match reader.read_frame(&mut cursor).unwrap() {
            FrameRead::Frame {
                payload,
                payload_reads,
            } => {
                assert!(payload.is_empty());
                assert_eq!(payload_reads, 0);
            }
            FrameRead::Closed => panic!("unexpected close"),
        }
    }

    #[test]
    fn test_one_byte_fragments_match_whole_frame() {
        let payload: Vec<u8> = (0..=255).collect();
        let wire = encode_frame(&payload).to_vec();

        let mut whole = FrameReader::new();
        let mut fragmented = FrameReader::new();

        let whole_payload = match whole.read_frame(&mut Cursor::new(wire.clone())).unwrap() {
            FrameRead::Frame { payload, .. } => payload.to_vec(),
            FrameRead::Closed => panic!("unexpected close"),
        };

        let mut reader = FragmentedReader::new(wire, 1);
        let frag_payload = match fragmented.read_frame(&mut reader).unwrap() {
            FrameRead::Frame { payload, .. } => payload.to_vec(),
            FrameRead::Closed => panic!("unexpected close"),
        };

        assert_eq!(whole_payload, frag_payload);
        assert_eq!(frag_payload, payload);
    }

    #[test]
    fn test_payload_reads_counts_fragments() {
        // 2000-byte payload delivered in 700-byte fragments: 3 reads
        let payload = vec![7u8; 2000];
        let wire = encode_frame(&payload).to_vec();

        let mut reader = FrameReader::new();
        let mut fragmented = FragmentedReader::new(wire, 700);
        match reader.read_frame(&mut fragmented).unwrap() {
            FrameRead::Frame {
                payload: got,
                payload_reads,
            } => {
                assert_eq!(got.len(), 2000);
                // payload arrives as 700 + 700 + 600
                assert_eq!(payload_reads, 3);
            }
            FrameRead::Closed => panic!("unexpected close"),
        }
    }

    #[test]
    fn test_zero_read_before_prefix_is_close() {
        let mut reader = FrameReader::new();
        let mut empty = Cursor::new(Vec::new());
        assert!(matches!(
            reader.read_frame(&mut empty).unwrap(),
            FrameRead::Closed
        ));
    }

    #[test]
    fn test_zero_read_mid_payload_is_close() {
        // Declare 100 bytes, deliver only 40
        let mut wire = encode_frame(&vec![1u8; 100]).to_vec();
        wire.truncate(LENGTH_PREFIX_BYTES + 40);

        let mut reader = FrameReader::new();
        let mut cursor = Cursor::new(wire);
        assert!(matches!(
            reader.read_frame(&mut cursor).unwrap(),
            FrameRead::Closed
        ));
    }

    #[test]
    fn test_oversized_declared_length_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());

        let mut reader = FrameReader::new();
        let mut cursor = Cursor::new(wire);
        assert!(matches!(
            reader.read_frame(&mut cursor),
            Err(TransferError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_reader_reuse_across_frames() {
        let mut wire = encode_frame(b"first").to_vec();
        wire.extend_from_slice(&encode_frame(b"second chunk"));

        let mut reader = FrameReader::new();
        let mut cursor = Cursor::new(wire);

        match reader.read_frame(&mut cursor).unwrap() {
            FrameRead::Frame { payload, .. } => assert_eq!(payload, b"first"),
            FrameRead::Closed => panic!("unexpected close"),
        }
        match reader.read_frame(&mut cursor).unwrap() {
            FrameRead::Frame { payload, .. } => assert_eq!(payload, b"second chunk"),
            FrameRead::Closed => panic!("unexpected close"),
        }
        assert!(matches!(
            reader.read_frame(&mut cursor).unwrap(),
            FrameRead::Closed
        ));
    }

    #[test]
    fn test_read_block_fills_exactly() {
        let data = vec![9u8; 1024];
        let mut fragmented = FragmentedReader::new(data.clone(), 100);
        let mut chunk = vec![0u8; 1024];
        assert_eq!(read_block(&mut fragmented, &mut chunk).unwrap(), BlockRead::Block);
        assert_eq!(chunk, data);
    }

    #[test]
    fn test_read_block_close_mid_chunk() {
        let mut short = Cursor::new(vec![9u8; 500]);
        let mut chunk = vec![0u8; 1024];
        assert_eq!(read_block(&mut short, &mut chunk).unwrap(), BlockRead::Closed);
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..4096),
                                fragment in 1usize..512) {
            let wire = encode_frame(&payload).to_vec();
            let mut reader = FrameReader::new();
            let mut fragmented = FragmentedReader::new(wire, fragment);
            match reader.read_frame(&mut fragmented).unwrap() {
                FrameRead::Frame { payload: got, .. } => prop_assert_eq!(got, &payload[..]),
                FrameRead::Closed => prop_assert!(false, "unexpected close"),
            }
        }
    }
}
