//! Buffered random-access byte reader shared by all loaders.
//!
//! Wraps any `Read + Seek` source, tracks the logical stream position
//! without issuing syscalls, and exposes the primitive reads the format
//! decoders need: endian-aware scalars, whitespace-delimited words and
//! whole lines.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, ReadBytesExt};

pub struct ByteReader<R> {
    inner: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            inner: BufReader::new(source),
            pos: 0,
        }
    }

    /// Logical position of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Seek to an absolute position. A seek to the current position is a
    /// no-op; short hops stay inside the buffer via `seek_relative`.
    pub fn seek(&mut self, target: u64) -> std::io::Result<()> {
        if target != self.pos {
            let delta = target as i64 - self.pos as i64;
            self.inner.seek_relative(delta)?;
            self.pos = target;
        }
        Ok(())
    }

    /// Total length of the underlying stream. Restores the current
    /// position before returning.
    pub fn stream_len(&mut self) -> std::io::Result<u64> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        Ok(len)
    }

    pub fn is_eof(&mut self) -> std::io::Result<bool> {
        Ok(self.inner.fill_buf()?.is_empty())
    }

    /// Up to `max` buffered bytes at the current position, without
    /// consuming them. May return fewer near EOF.
    pub fn peek(&mut self, max: usize) -> std::io::Result<&[u8]> {
        let buf = self.inner.fill_buf()?;
        let n = buf.len().min(max);
        Ok(&buf[..n])
    }

    fn advance(&mut self, n: usize) {
        self.inner.consume(n);
        self.pos += n as u64;
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_u8(&mut self) -> std::io::Result<u8> {
        let v = self.inner.read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> std::io::Result<i8> {
        let v = self.inner.read_i8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16<E: ByteOrder>(&mut self) -> std::io::Result<u16> {
        let v = self.inner.read_u16::<E>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16<E: ByteOrder>(&mut self) -> std::io::Result<i16> {
        let v = self.inner.read_i16::<E>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32<E: ByteOrder>(&mut self) -> std::io::Result<u32> {
        let v = self.inner.read_u32::<E>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32<E: ByteOrder>(&mut self) -> std::io::Result<i32> {
        let v = self.inner.read_i32::<E>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f32<E: ByteOrder>(&mut self) -> std::io::Result<f32> {
        let v = self.inner.read_f32::<E>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64<E: ByteOrder>(&mut self) -> std::io::Result<f64> {
        let v = self.inner.read_f64::<E>()?;
        self.pos += 8;
        Ok(v)
    }

    /// Next whitespace-delimited token. Leading whitespace is skipped, the
    /// terminating whitespace byte is consumed. EOF with no token pending
    /// is an `UnexpectedEof` error; EOF right after a token yields it.
    pub fn next_word(&mut self) -> std::io::Result<String> {
        let mut word = String::new();
        loop {
            let (used, terminated) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    if word.is_empty() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "expected a token, found end of stream",
                        ));
                    }
                    return Ok(word);
                }
                let mut used = 0;
                let mut terminated = false;
                for &byte in buf {
                    used += 1;
                    if byte.is_ascii_whitespace() {
                        if !word.is_empty() {
                            terminated = true;
                            break;
                        }
                    } else {
                        word.push(byte as char);
                    }
                }
                (used, terminated)
            };
            self.advance(used);
            if terminated {
                return Ok(word);
            }
        }
    }

    /// Read up to and including the next `\n`, returning the line without
    /// its terminator (`\r\n` and `\n` both accepted).
    pub fn read_line(&mut self) -> std::io::Result<String> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        self.pos += n as u64;
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }
}
