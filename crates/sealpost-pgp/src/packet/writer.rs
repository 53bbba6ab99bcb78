//! Packet header encoding and streaming body writer.
//!
//! Definite-length packets are written with [`write_packet`]. Bodies of
//! unknown length (literal data, SEIPD) stream through
//! [`PartialBodyWriter`], which emits fixed power-of-two partial segments
//! and closes with a definite tail.

use std::io::Write;

use bytes::BufMut;

use super::Tag;

/// Partial segment size: 8 KiB (2^13). Large enough to satisfy the
/// 512-octet minimum for the first partial segment, small enough to keep
/// memory per in-flight request bounded.
const PARTIAL_CHUNK: usize = 8192;

/// Length octet announcing a `PARTIAL_CHUNK` partial segment.
const PARTIAL_CHUNK_OCTET: u8 = 0xE0 | 13;

/// Encode a new-format definite body length.
///
/// Returns the encoding buffer and the number of valid octets in it.
pub fn encode_length(len: u32) -> ([u8; 5], usize) {
    let mut out = [0u8; 5];
    if len < 192 {
        out[0] = len as u8;
        (out, 1)
    } else if len < 8384 {
        let reduced = len - 192;
        out[0] = (reduced >> 8) as u8 + 192;
        out[1] = (reduced & 0xFF) as u8;
        (out, 2)
    } else {
        out[0] = 0xFF;
        out[1..5].copy_from_slice(&len.to_be_bytes());
        (out, 5)
    }
}

/// Write a new-format packet header (tag octet plus definite length).
pub fn write_header(out: &mut impl BufMut, tag: Tag, len: u32) {
    out.put_u8(0xC0 | tag.to_u8());
    let (encoded, used) = encode_length(len);
    out.put_slice(&encoded[..used]);
}

/// Write a complete definite-length packet.
///
/// # Panics
///
/// Panics if `body.len()` exceeds `u32::MAX`. In practice this cannot
/// happen: definite-length packets built in memory are bounded far below
/// 4 GiB by the request body limit at the service boundary.
pub fn write_packet(out: &mut impl BufMut, tag: Tag, body: &[u8]) {
    #[allow(clippy::expect_used)]
    let len = u32::try_from(body.len()).expect("invariant: packet body fits in u32");
    write_header(out, tag, len);
    out.put_slice(body);
}

/// Streaming writer for a packet body of unknown length.
///
/// Buffers up to [`PARTIAL_CHUNK`] bytes. Each full buffer is flushed as a
/// partial segment; [`finish`](Self::finish) writes the remainder as the
/// definite final segment. A body that never fills the buffer is written as
/// a single definite-length packet with no partial segments at all.
pub struct PartialBodyWriter<W: Write> {
    inner: W,
    tag: Tag,
    buf: Vec<u8>,
    segments_emitted: bool,
}

impl<W: Write> PartialBodyWriter<W> {
    /// Start a streaming packet body with the given tag.
    pub fn new(inner: W, tag: Tag) -> Self {
        Self { inner, tag, buf: Vec::with_capacity(PARTIAL_CHUNK), segments_emitted: false }
    }

    /// Append body bytes, flushing full segments as they accumulate.
    pub fn write_body(&mut self, mut data: &[u8]) -> std::io::Result<()> {
        while !data.is_empty() {
            let room = PARTIAL_CHUNK - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buf.len() == PARTIAL_CHUNK {
                self.emit_partial_segment()?;
            }
        }
        Ok(())
    }

    /// Close the body: write the buffered remainder as the definite final
    /// segment and return the inner writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        if !self.segments_emitted {
            self.inner.write_all(&[0xC0 | self.tag.to_u8()])?;
        }
        // INVARIANT: buf holds less than PARTIAL_CHUNK bytes here, so the
        // length always fits in u32.
        let (encoded, used) = encode_length(self.buf.len() as u32);
        self.inner.write_all(&encoded[..used])?;
        self.inner.write_all(&self.buf)?;
        Ok(self.inner)
    }

    fn emit_partial_segment(&mut self) -> std::io::Result<()> {
        if !self.segments_emitted {
            self.inner.write_all(&[0xC0 | self.tag.to_u8()])?;
            self.segments_emitted = true;
        }
        self.inner.write_all(&[PARTIAL_CHUNK_OCTET])?;
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}
