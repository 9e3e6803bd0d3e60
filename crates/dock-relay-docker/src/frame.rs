//! Event frame splitting.
//!
//! The docker `/events` endpoint writes one JSON document per line, but the
//! transport hands us arbitrary chunks. [`FrameBuffer`] reassembles them.

use crate::{DockerError, Result};

/// Most bytes buffered while waiting for a newline.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Reassembles newline-delimited frames from a chunked byte stream.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    limit: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty frame buffer holding at most `limit` unterminated bytes.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Feed a chunk and return every frame it completes.
    ///
    /// Blank lines are skipped; a trailing partial frame is kept for the next chunk.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::Stream` and discards the buffer when the partial
    /// frame grows past the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                frames.push(line);
            }
        }

        if self.pending.len() > self.limit {
            let buffered = self.pending.len();
            self.pending = Vec::new();
            return Err(DockerError::Stream(format!(
                "unterminated event frame of {buffered} bytes exceeds {} byte limit",
                self.limit
            )));
        }

        Ok(frames)
    }

    /// Number of buffered bytes not yet terminated by a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn carries_partial_frames() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"{\"status\":").unwrap().is_empty());
        assert_eq!(buffer.pending_len(), 10);

        let frames = buffer.push(b"\"start\"}\r\n{\"sta").unwrap();
        assert_eq!(frames, vec![b"{\"status\":\"start\"}".to_vec()]);
        assert_eq!(buffer.pending_len(), 5);
    }

    #[test]
    fn skips_blank_lines() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"\n  \n{}\n").unwrap();
        assert_eq!(frames, vec![b"{}".to_vec()]);
    }

    #[test]
    fn unterminated_frame_over_limit_is_stream_error() {
        let mut buffer = FrameBuffer::with_limit(16);
        assert!(buffer.push(b"{\"status\":").unwrap().is_empty());

        let err = buffer.push(b"\"aaaaaaaaaaaa").unwrap_err();
        assert!(matches!(err, DockerError::Stream(_)));
        assert!(err.is_retriable());
        assert_eq!(buffer.pending_len(), 0);

        // Usable again after the reset
        assert_eq!(buffer.push(b"{}\n").unwrap(), vec![b"{}".to_vec()]);
    }

    #[test]
    fn completed_frames_do_not_count_toward_limit() {
        let mut buffer = FrameBuffer::with_limit(8);
        let frames = buffer.push(b"{\"status\":\"start\"}\n{}").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.pending_len(), 2);
    }

    #[test]
    fn default_limit_is_one_mebibyte() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(&vec![b'x'; MAX_PENDING_BYTES]).is_ok());
        assert!(buffer.push(b"x").is_err());
    }
}
