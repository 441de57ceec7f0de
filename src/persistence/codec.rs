//! Little-endian primitives shared by the forest and reducer formats.
//!
//! Every artifact is `magic (4B) | version (u32) | body | crc32 (u32)`, where
//! the checksum covers everything before it.

use crate::error::{Result, SearchError};
use std::io::Read;

/// Append-only writer. [`finish`](Encoder::finish) seals the buffer with its CRC32.
pub(crate) struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub(crate) fn new(magic: &[u8; 4], version: u32, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity + 12);
        buf.extend_from_slice(magic);
        buf.extend_from_slice(&version.to_le_bytes());
        Self { buf }
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Lengths and indices are stored as `u32`. [`ForestParams::validate`] and
    /// the forest builder keep every count in range.
    ///
    /// [`ForestParams::validate`]: crate::ForestParams::validate
    pub(crate) fn count(&mut self, v: usize) {
        debug_assert!(u32::try_from(v).is_ok(), "count {v} exceeds u32");
        self.u32(v as u32);
    }

    pub(crate) fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn f32s(&mut self, vs: &[f32]) {
        for v in vs {
            self.f32(*v);
        }
    }

    pub(crate) fn str(&mut self, s: &str) {
        self.count(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let crc = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf
    }
}

/// Bounds-checked reader over a checksummed artifact body.
pub(crate) struct Decoder<'a> {
    what: &'static str,
    rest: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Check magic, version and checksum; position the reader after the version.
    pub(crate) fn open(
        bytes: &'a [u8],
        what: &'static str,
        magic: &[u8; 4],
        version: u32,
    ) -> Result<Self> {
        if bytes.len() < 12 {
            return Err(SearchError::corrupt(format!(
                "{what}: {} bytes is too short",
                bytes.len()
            )));
        }
        if &bytes[..4] != magic {
            return Err(SearchError::corrupt(format!("{what}: bad magic")));
        }
        let found = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if found != version {
            return Err(SearchError::corrupt(format!(
                "{what}: unsupported version {found} (expected {version})"
            )));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(SearchError::corrupt(format!(
                "{what}: checksum mismatch (stored {stored:08x}, computed {actual:08x})"
            )));
        }

        Ok(Self {
            what,
            rest: &body[8..],
        })
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.rest
            .read_exact(buf)
            .map_err(|_| SearchError::corrupt(format!("{}: unexpected end of data", self.what)))
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.fill(&mut b)?;
        Ok(b[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub(crate) fn count(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub(crate) fn f32(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    /// Read `count` floats, refusing counts the remaining bytes cannot hold.
    pub(crate) fn f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        self.expect_at_least(count, 4)?;
        (0..count).map(|_| self.f32()).collect()
    }

    pub(crate) fn string(&mut self) -> Result<String> {
        let n = self.count()?;
        self.expect_at_least(n, 1)?;
        let mut bytes = vec![0u8; n];
        self.fill(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|_| SearchError::corrupt(format!("{}: identifier is not UTF-8", self.what)))
    }

    /// Fail early when `count` records of at least `min_size` bytes cannot fit.
    pub(crate) fn expect_at_least(&self, count: usize, min_size: usize) -> Result<()> {
        match count.checked_mul(min_size) {
            Some(need) if need <= self.rest.len() => Ok(()),
            _ => Err(SearchError::corrupt(format!(
                "{}: declared {count} records but only {} bytes remain",
                self.what,
                self.rest.len()
            ))),
        }
    }

    /// The body must be consumed exactly.
    pub(crate) fn finish(self) -> Result<()> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(SearchError::corrupt(format!(
                "{}: {} trailing bytes",
                self.what,
                self.rest.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: &[u8; 4] = b"TEST";

    fn sample() -> Vec<u8> {
        let mut enc = Encoder::new(MAGIC, 3, 0);
        enc.u8(7);
        enc.u64(u64::MAX - 1);
        enc.f32s(&[1.5, -2.0]);
        enc.str("cats/01.jpg");
        enc.finish()
    }

    #[test]
    fn reads_back_what_was_written() {
        let bytes = sample();
        let mut dec = Decoder::open(&bytes, "test", MAGIC, 3).unwrap();
        assert_eq!(dec.u8().unwrap(), 7);
        assert_eq!(dec.u64().unwrap(), u64::MAX - 1);
        assert_eq!(dec.f32s(2).unwrap(), vec![1.5, -2.0]);
        assert_eq!(dec.string().unwrap(), "cats/01.jpg");
        dec.finish().unwrap();
    }

    #[test]
    fn rejects_wrong_magic_version_and_checksum() {
        let bytes = sample();
        assert!(Decoder::open(&bytes, "test", b"NOPE", 3).is_err());
        assert!(Decoder::open(&bytes, "test", MAGIC, 4).is_err());

        let mut flipped = bytes.clone();
        flipped[10] ^= 0x40;
        let err = Decoder::open(&flipped, "test", MAGIC, 3).err().unwrap();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn oversized_counts_fail_without_allocating() {
        let mut enc = Encoder::new(MAGIC, 1, 0);
        enc.u32(u32::MAX);
        let bytes = enc.finish();
        let mut dec = Decoder::open(&bytes, "test", MAGIC, 1).unwrap();
        let n = dec.count().unwrap();
        assert!(dec.f32s(n).is_err());
    }

    #[test]
    fn leftover_bytes_are_an_error() {
        let bytes = sample();
        let mut dec = Decoder::open(&bytes, "test", MAGIC, 3).unwrap();
        dec.u8().unwrap();
        assert!(dec.finish().is_err());
    }
}
