//! Byte-backed video access.
//!
//! Video records are stored as the original container bytes. Frame decoding
//! belongs to an external codec plugged in through [`VideoDecoder`].

use crate::error::Result;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// A frame decoder built from a video stream.
pub trait VideoDecoder: Sized {
    type Frame;

    /// Build a decoder over the stream.
    fn open(stream: VideoReader) -> Result<Self>;

    /// Number of frames in the stream.
    fn frame_count(&self) -> usize;

    /// Decode the frame at `index`.
    fn frame(&mut self, index: usize) -> Result<Self::Frame>;
}

/// Seekable reader over one stored video.
#[derive(Clone, Debug)]
pub struct VideoReader {
    inner: Cursor<Vec<u8>>,
}

impl VideoReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.get_ref()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }

    /// Size of the stored stream in bytes.
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the stream to a frame decoder.
    pub fn decode<D: VideoDecoder>(self) -> Result<D> {
        D::open(self)
    }
}

impl Read for VideoReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for VideoReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
