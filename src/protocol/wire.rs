//! Wire-level request reading and reply framing
//!
//! Requests are read from a streaming reader so handlers can consume exactly
//! the bytes a request declares and drain the remainder on a malformed
//! request, keeping the connection's framing synchronized. Replies are
//! assembled into a complete buffer and written under the per-connection
//! output lock in a single write, so packets from concurrent writers never
//! interleave on the same stream.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, BufReader, Read, Write};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

/// Streaming big-endian reader for one client connection.
pub struct RequestReader {
    inner: BufReader<Box<dyn Read + Send>>,
}

impl RequestReader {
    pub fn new(stream: Box<dyn Read + Send>) -> Self {
        RequestReader {
            inner: BufReader::new(stream),
        }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.inner.read_u16::<BigEndian>()
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        self.inner.read_i16::<BigEndian>()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.inner.read_u32::<BigEndian>()
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        self.inner.read_i64::<BigEndian>()
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)
    }

    pub fn read_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read and discard `n` bytes.
    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        let mut remaining = n;
        let mut scratch = [0u8; 256];
        while remaining > 0 {
            let chunk = remaining.min(scratch.len());
            self.inner.read_exact(&mut scratch[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }
}

/// The write half of a client connection.
///
/// Shared between the client's own dispatch thread and any other thread that
/// delivers events to this client. The stream lock keeps each packet atomic
/// on the wire; the sequence counter is the per-connection request counter
/// echoed in replies, errors and events.
pub struct ClientOutput {
    stream: Mutex<Box<dyn Write + Send>>,
    sequence: AtomicU16,
}

impl ClientOutput {
    pub fn new(stream: Box<dyn Write + Send>) -> Self {
        ClientOutput {
            stream: Mutex::new(stream),
            sequence: AtomicU16::new(0),
        }
    }

    /// Advance the sequence counter for a newly read request.
    pub fn bump_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn sequence(&self) -> u16 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Write a complete packet and flush.
    pub fn send(&self, packet: &[u8]) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap();
        stream.write_all(packet)?;
        stream.flush()
    }
}

/// Incremental builder for reply packets.
///
/// The reply-length word (in 4-byte units beyond the fixed 32-byte header)
/// is patched in by `finish`, which also pads short replies up to the
/// 32-byte minimum.
pub struct ReplyBuilder {
    buf: Vec<u8>,
}

impl ReplyBuilder {
    pub fn new(arg: u8, sequence: u16) -> Self {
        let mut buf = Vec::with_capacity(32);
        buf.push(1); // Reply
        buf.push(arg);
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]); // Length, patched in finish()
        ReplyBuilder { buf }
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_pad(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Pad to the next 4-byte boundary.
    pub fn align(&mut self) -> &mut Self {
        let pad = super::pad(self.buf.len());
        self.put_pad(pad)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finalize the packet: pad to the 32-byte minimum and patch the
    /// reply-length word. The body must end on a 4-byte boundary.
    pub fn finish(mut self) -> Vec<u8> {
        if self.buf.len() < 32 {
            self.buf.resize(32, 0);
        }
        debug_assert!(self.buf.len() % 4 == 0, "reply not 4-byte aligned");
        let extra = ((self.buf.len() - 32) / 4) as u32;
        self.buf[4..8].copy_from_slice(&extra.to_be_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> RequestReader {
        RequestReader::new(Box::new(Cursor::new(bytes)))
    }

    #[test]
    fn test_big_endian_reads() {
        let mut r = reader(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_u32().unwrap(), 0x03040506);
    }

    #[test]
    fn test_skip_consumes_exactly() {
        let mut r = reader(vec![0u8; 600]);
        r.skip(599).unwrap();
        assert!(r.read_u8().is_ok());
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn test_minimal_reply_is_32_bytes() {
        let reply = ReplyBuilder::new(7, 0x1234).finish();
        assert_eq!(reply.len(), 32);
        assert_eq!(reply[0], 1);
        assert_eq!(reply[1], 7);
        assert_eq!(&reply[2..4], &[0x12, 0x34]);
        assert_eq!(&reply[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_reply_length_counts_extra_words() {
        let mut b = ReplyBuilder::new(0, 1);
        b.put_pad(24); // Fill the fixed header
        b.put_bytes(&[0xAA; 8]); // Two extra words
        let reply = b.finish();
        assert_eq!(reply.len(), 40);
        assert_eq!(&reply[4..8], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_align_pads_to_word_boundary() {
        let mut b = ReplyBuilder::new(0, 1);
        b.put_bytes(b"abc");
        b.align();
        assert_eq!(b.len() % 4, 0);
    }
}
