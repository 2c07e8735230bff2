//! Frame sources
//!
//! ## Responsibilities
//!
//! - Yield decoded frames from a live source
//! - Delimit embedded JPEG stills inside an MJPEG byte stream
//! - Drop malformed chunks without stopping ingestion
//!
//! Two adapters feed the same scanner: a remote long-lived HTTP response
//! (`HttpStreamSource`) and a local capture device read through an ffmpeg
//! MJPEG pipe (`LocalCaptureSource`). The buffer engine is written once
//! against the `FrameSource` trait and never sees which one is wired in.

mod http_stream;
mod local;
mod mjpeg;

pub use http_stream::HttpStreamSource;
pub use local::LocalCaptureSource;
pub use mjpeg::JpegScanner;

use crate::error::Result;
use bytes::Bytes;
use image::GenericImageView;
use std::future::Future;

/// One decoded frame. The JPEG payload is shared, so cloning a frame (and
/// snapshotting a full window) is a pointer copy, not a pixel copy.
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG bytes as delimited from the stream
    pub data: Bytes,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
}

impl Frame {
    /// Decode a delimited JPEG chunk into a frame.
    ///
    /// Returns None for undecodable chunks; the caller drops them and keeps
    /// delimiting (decode failure is never fatal).
    pub fn decode(data: Bytes) -> Option<Self> {
        match image::load_from_memory(&data) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                Some(Self {
                    width,
                    height,
                    data,
                })
            }
            Err(e) => {
                tracing::debug!(size = data.len(), error = %e, "Dropping undecodable frame chunk");
                None
            }
        }
    }
}

/// A live source of decoded frames.
///
/// `next_frame` returns `Ok(None)` on a clean end-of-stream; transient I/O
/// failures are `Err` and the capture task decides whether to reconnect.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Frame>>> + Send;
}

/// Runtime selection between the two adapters.
pub enum VideoSource {
    Remote(HttpStreamSource),
    Local(LocalCaptureSource),
}

impl FrameSource for VideoSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            VideoSource::Remote(s) => s.next_frame().await,
            VideoSource::Local(s) => s.next_frame().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_reads_dimensions() {
        let frame = Frame::decode(Bytes::from(encoded_jpeg(4, 2))).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
    }

    // A chunk that delimits like a JPEG but does not decode is dropped,
    // never fatal
    #[test]
    fn test_undecodable_chunk_dropped() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(b"garbage that is not entropy-coded data");
        data.extend_from_slice(&[0xFF, 0xD9]);
        assert!(Frame::decode(Bytes::from(data)).is_none());
    }

    #[test]
    fn test_frame_clone_shares_payload() {
        let frame = Frame::decode(Bytes::from(encoded_jpeg(2, 2))).unwrap();
        let copy = frame.clone();
        // Same backing allocation: window snapshots copy pointers, not pixels
        assert_eq!(frame.data.as_ptr(), copy.data.as_ptr());
    }
}
