// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing for message boundaries over TCP.
//!
//! Every frame is a 32-bit big-endian length followed by the payload:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | Payload           |
//! +----------------+-------------------+
//! ```
//!
//! Request/reply traffic carries one frame per message; publications carry
//! two back-to-back frames (channel, body). [`FrameReader`] reassembles
//! frames incrementally from a non-blocking stream.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Frame header size (4 bytes for the length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum accepted payload size (anti-OOM protection).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Prepend the length header to a payload.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    data.extend_from_slice(payload);
    data
}

/// Write one frame to a blocking stream.
pub fn write_frame<W: Write>(dst: &mut W, payload: &[u8]) -> io::Result<()> {
    dst.write_all(&(payload.len() as u32).to_be_bytes())?;
    dst.write_all(payload)?;
    dst.flush()
}

/// Read one frame from a blocking stream.
pub fn read_frame<R: Read>(src: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    src.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    src.read_exact(&mut payload)?;
    Ok(payload)
}

/// Incremental state while reassembling a frame.
#[derive(Debug)]
enum ReadState {
    Length { header: [u8; FRAME_HEADER_SIZE], got: usize },
    Body { frame: Vec<u8>, got: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::Length {
            header: [0; FRAME_HEADER_SIZE],
            got: 0,
        }
    }
}

/// Reassembles length-prefixed frames from a non-blocking byte stream.
///
/// Partial reads are buffered between calls, so a frame may arrive across
/// any number of segments.
#[derive(Debug, Default)]
pub struct FrameReader {
    state: ReadState,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull everything currently available from `src`, appending completed
    /// frames to `out`.
    ///
    /// Returns `true` when the stream reached end-of-file. `WouldBlock`
    /// terminates the read without error; any other failure propagates.
    pub fn read_from<R: Read>(
        &mut self,
        src: &mut R,
        out: &mut VecDeque<Vec<u8>>,
    ) -> io::Result<bool> {
        let mut chunk = [0u8; 8192];
        loop {
            match src.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => self.feed(&chunk[..n], out)?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn feed(&mut self, mut bytes: &[u8], out: &mut VecDeque<Vec<u8>>) -> io::Result<()> {
        while !bytes.is_empty() {
            match &mut self.state {
                ReadState::Length { header, got } => {
                    let take = (FRAME_HEADER_SIZE - *got).min(bytes.len());
                    header[*got..*got + take].copy_from_slice(&bytes[..take]);
                    *got += take;
                    bytes = &bytes[take..];

                    if *got == FRAME_HEADER_SIZE {
                        let len = u32::from_be_bytes(*header) as usize;
                        if len > MAX_FRAME_SIZE {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("frame of {len} bytes exceeds limit"),
                            ));
                        }
                        if len == 0 {
                            out.push_back(Vec::new());
                            self.state = ReadState::default();
                        } else {
                            self.state = ReadState::Body {
                                frame: vec![0u8; len],
                                got: 0,
                            };
                        }
                    }
                }
                ReadState::Body { frame, got } => {
                    let take = (frame.len() - *got).min(bytes.len());
                    frame[*got..*got + take].copy_from_slice(&bytes[..take]);
                    *got += take;
                    bytes = &bytes[take..];

                    if *got == frame.len() {
                        out.push_back(std::mem::take(frame));
                        self.state = ReadState::default();
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let data = frame(b"abc");
        assert_eq!(&data[..4], &3u32.to_be_bytes());
        assert_eq!(&data[4..], b"abc");
    }

    #[test]
    fn test_blocking_roundtrip() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"hello").unwrap();
        write_frame(&mut wire, b"").unwrap();

        let mut src = io::Cursor::new(wire);
        assert_eq!(read_frame(&mut src).unwrap(), b"hello");
        assert_eq!(read_frame(&mut src).unwrap(), b"");
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        let err = read_frame(&mut io::Cursor::new(wire)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_reader_reassembles_across_segments() {
        let mut wire = frame(b"first");
        wire.extend_from_slice(&frame(b"second"));

        let mut reader = FrameReader::new();
        let mut frames = VecDeque::new();

        // Feed one byte at a time to exercise every partial state.
        for byte in &wire {
            reader.feed(std::slice::from_ref(byte), &mut frames).unwrap();
        }

        assert_eq!(frames.pop_front().unwrap(), b"first");
        assert_eq!(frames.pop_front().unwrap(), b"second");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_reader_reports_eof() {
        let wire = frame(b"only");
        let mut src = io::Cursor::new(wire);
        let mut reader = FrameReader::new();
        let mut frames = VecDeque::new();

        let eof = reader.read_from(&mut src, &mut frames).unwrap();
        assert!(eof, "cursor drains to end-of-file");
        assert_eq!(frames.pop_front().unwrap(), b"only");
    }

    #[test]
    fn test_reader_rejects_oversized_header() {
        let mut reader = FrameReader::new();
        let mut frames = VecDeque::new();
        let header = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        let err = reader.feed(&header, &mut frames).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
