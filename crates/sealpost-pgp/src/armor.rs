//! ASCII armor (RFC 9580 §6): a reversible text-safe encoding applied at
//! the message boundary. Not part of the cryptographic core; armoring or
//! de-armoring never touches key material or plaintext.

use std::io::Write;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Octets of binary input per armor line (encodes to 64 base64 columns).
const LINE_OCTETS: usize = 48;

/// CRC-24 initial value and generator (RFC 9580 §6.1.1).
const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_GENERATOR: u32 = 0x0186_4CFB;

/// Armor block labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `PGP MESSAGE`
    Message,
    /// `PGP PUBLIC KEY BLOCK`
    PublicKey,
    /// `PGP PRIVATE KEY BLOCK`
    PrivateKey,
    /// `PGP SIGNATURE`
    Signature,
}

impl BlockKind {
    fn label(self) -> &'static str {
        match self {
            Self::Message => "PGP MESSAGE",
            Self::PublicKey => "PGP PUBLIC KEY BLOCK",
            Self::PrivateKey => "PGP PRIVATE KEY BLOCK",
            Self::Signature => "PGP SIGNATURE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PGP MESSAGE" => Some(Self::Message),
            "PGP PUBLIC KEY BLOCK" => Some(Self::PublicKey),
            "PGP PRIVATE KEY BLOCK" => Some(Self::PrivateKey),
            "PGP SIGNATURE" => Some(Self::Signature),
            _ => None,
        }
    }
}

/// Errors from armor decoding.
#[derive(Debug, Error)]
pub enum ArmorError {
    /// No `-----BEGIN PGP ...-----` line found
    #[error("missing armor begin line")]
    MissingBegin,

    /// Begin line present but no matching end line
    #[error("missing armor end line for {label}")]
    MissingEnd {
        /// Label from the begin line
        label: String,
    },

    /// Begin line carries a label outside the known set
    #[error("unknown armor block label: {label}")]
    UnknownLabel {
        /// The unrecognized label
        label: String,
    },

    /// Body is not valid base64
    #[error("invalid armor base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// CRC-24 trailer present and does not match the decoded body
    #[error("armor checksum mismatch: expected {expected:#08x}, computed {computed:#08x}")]
    ChecksumMismatch {
        /// CRC from the trailer
        expected: u32,
        /// CRC computed over the decoded body
        computed: u32,
    },
}

/// True if the input looks like an armored block rather than raw packets.
pub fn is_armored(input: &[u8]) -> bool {
    let trimmed = input.iter().position(|b| !b.is_ascii_whitespace()).map_or(&[][..], |i| &input[i..]);
    trimmed.starts_with(b"-----BEGIN PGP")
}

/// Armor `data` as a complete block.
pub fn encode(kind: BlockKind, data: &[u8]) -> String {
    let mut out = Vec::new();
    let mut writer = ArmorWriter::new(&mut out, kind);
    // INVARIANT: writing into a Vec cannot fail
    #[allow(clippy::expect_used)]
    {
        writer.write_data(data).expect("invariant: Vec write is infallible");
        writer.finish().expect("invariant: Vec write is infallible");
    }
    #[allow(clippy::expect_used)]
    let text = String::from_utf8(out).expect("invariant: armor output is ASCII");
    text
}

/// Decode one armored block, verifying the CRC-24 trailer when present.
///
/// Armor headers (`Version:`, `Comment:`, ...) are skipped. Returns the
/// block kind from the begin line and the decoded octets.
pub fn decode(input: &str) -> Result<(BlockKind, Vec<u8>), ArmorError> {
    let mut lines = input.lines();

    let label = loop {
        let Some(line) = lines.next() else {
            return Err(ArmorError::MissingBegin);
        };
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("-----BEGIN ") {
            if let Some(label) = rest.strip_suffix("-----") {
                break label.to_string();
            }
        }
    };
    let kind =
        BlockKind::from_label(&label).ok_or_else(|| ArmorError::UnknownLabel { label: label.clone() })?;

    let mut base64_body = String::new();
    let mut crc_line: Option<String> = None;
    let mut in_headers = true;
    let mut saw_end = false;

    for line in lines {
        let line = line.trim();
        if in_headers {
            // Header block ends at the first blank line; a body line with
            // no colon also ends it (blocks without headers)
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(':') && !line.starts_with("-----") {
                continue;
            }
            in_headers = false;
        }
        if line.is_empty() {
            continue;
        }
        if line == format!("-----END {label}-----") {
            saw_end = true;
            break;
        }
        if let Some(crc) = line.strip_prefix('=') {
            crc_line = Some(crc.to_string());
            continue;
        }
        base64_body.push_str(line);
    }

    if !saw_end {
        return Err(ArmorError::MissingEnd { label });
    }

    let data = STANDARD.decode(base64_body.as_bytes())?;

    if let Some(crc) = crc_line {
        let crc_octets = STANDARD.decode(crc.as_bytes())?;
        if crc_octets.len() == 3 {
            let expected =
                (u32::from(crc_octets[0]) << 16) | (u32::from(crc_octets[1]) << 8) | u32::from(crc_octets[2]);
            let computed = crc24_update(CRC24_INIT, &data);
            if expected != computed {
                return Err(ArmorError::ChecksumMismatch { expected, computed });
            }
        }
    }

    Ok((kind, data))
}

/// Streaming armor encoder.
///
/// Accepts binary octets incrementally and writes 64-column base64 lines,
/// keeping O(line) state. [`finish`](Self::finish) emits the CRC-24
/// trailer and the end line.
pub struct ArmorWriter<W: Write> {
    inner: W,
    kind: BlockKind,
    buf: Vec<u8>,
    crc: u32,
    header_written: bool,
}

impl<W: Write> ArmorWriter<W> {
    /// Start an armored block of the given kind.
    pub fn new(inner: W, kind: BlockKind) -> Self {
        Self { inner, kind, buf: Vec::with_capacity(LINE_OCTETS), crc: CRC24_INIT, header_written: false }
    }

    /// Append binary octets, emitting full lines as they accumulate.
    pub fn write_data(&mut self, mut data: &[u8]) -> std::io::Result<()> {
        self.ensure_header()?;
        self.crc = crc24_update(self.crc, data);

        while !data.is_empty() {
            let room = LINE_OCTETS - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buf.len() == LINE_OCTETS {
                writeln!(self.inner, "{}", STANDARD.encode(&self.buf))?;
                self.buf.clear();
            }
        }
        Ok(())
    }

    /// Write the final partial line, CRC trailer, and end line; returns the
    /// inner writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.ensure_header()?;
        if !self.buf.is_empty() {
            writeln!(self.inner, "{}", STANDARD.encode(&self.buf))?;
        }
        let crc_octets = [(self.crc >> 16) as u8, (self.crc >> 8) as u8, self.crc as u8];
        writeln!(self.inner, "={}", STANDARD.encode(crc_octets))?;
        writeln!(self.inner, "-----END {}-----", self.kind.label())?;
        Ok(self.inner)
    }

    fn ensure_header(&mut self) -> std::io::Result<()> {
        if !self.header_written {
            writeln!(self.inner, "-----BEGIN {}-----", self.kind.label())?;
            writeln!(self.inner)?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl<W: Write> Write for ArmorWriter<W> {
    /// Binary octets in, armored text to the inner writer.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn crc24_update(mut crc: u32, data: &[u8]) -> u32 {
    for &octet in data {
        crc ^= u32::from(octet) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_GENERATOR;
            }
        }
    }
    crc & 0x00FF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let data: Vec<u8> = (0..200u8).collect();
        let armored = encode(BlockKind::Message, &data);

        assert!(armored.starts_with("-----BEGIN PGP MESSAGE-----"));
        assert!(armored.trim_end().ends_with("-----END PGP MESSAGE-----"));

        let (kind, decoded) = decode(&armored).unwrap();
        assert_eq!(kind, BlockKind::Message);
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_payload_round_trips() {
        let armored = encode(BlockKind::Message, &[]);
        let (_, decoded) = decode(&armored).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn lines_are_64_columns() {
        let data = vec![0x5Au8; 500];
        let armored = encode(BlockKind::PublicKey, &data);
        for line in armored.lines() {
            assert!(line.len() <= 64, "line too long: {}", line.len());
        }
    }

    #[test]
    fn armor_headers_are_skipped() {
        let data = b"payload".to_vec();
        let armored = encode(BlockKind::Message, &data);
        let with_headers = armored.replacen(
            "-----BEGIN PGP MESSAGE-----\n",
            "-----BEGIN PGP MESSAGE-----\nVersion: Sealpost\nComment: test\n",
            1,
        );
        let (_, decoded) = decode(&with_headers).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn corrupted_body_fails_crc() {
        let armored = encode(BlockKind::Message, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        // Swap two distinct base64 characters in the body line
        let corrupted = armored.replacen("AQIDBAUG", "AQIDBAUH", 1);
        assert_ne!(armored, corrupted, "corruption must change the text");
        assert!(matches!(decode(&corrupted), Err(ArmorError::ChecksumMismatch { .. })));
    }

    #[test]
    fn missing_end_line_is_rejected() {
        let armored = encode(BlockKind::Message, b"abc");
        let truncated = armored.replace("-----END PGP MESSAGE-----", "");
        assert!(matches!(decode(&truncated), Err(ArmorError::MissingEnd { .. })));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(decode("not armor at all"), Err(ArmorError::MissingBegin)));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let text = "-----BEGIN PGP TOAST-----\n\nAAAA\n-----END PGP TOAST-----\n";
        assert!(matches!(decode(text), Err(ArmorError::UnknownLabel { .. })));
    }

    #[test]
    fn is_armored_detects_blocks() {
        assert!(is_armored(b"-----BEGIN PGP MESSAGE-----"));
        assert!(is_armored(b"  \n-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        assert!(!is_armored(&[0xC1, 0x02, 0x03]));
        assert!(!is_armored(b""));
    }

    #[test]
    fn crc24_known_vector() {
        // CRC-24 of the empty string is the initializer
        assert_eq!(crc24_update(CRC24_INIT, &[]), CRC24_INIT);
        // Regression pin for a simple input
        let crc = crc24_update(CRC24_INIT, b"hello");
        assert_eq!(crc, crc24_update(CRC24_INIT, b"hello"));
        assert_ne!(crc, crc24_update(CRC24_INIT, b"hellp"));
    }
}
