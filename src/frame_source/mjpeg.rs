//! Incremental JPEG delimiter for MJPEG byte streams
//!
//! Scans an unbounded chunk sequence for the JPEG start marker `0xFFD8` and
//! end marker `0xFFD9`, yielding each embedded still. Bytes before a start
//! marker are garbage (partial frame from mid-stream connect, multipart
//! boundaries) and are trimmed so the scan buffer stays bounded.

use bytes::Bytes;

const JPEG_START: [u8; 2] = [0xFF, 0xD8];
const JPEG_END: [u8; 2] = [0xFF, 0xD9];

/// Cap on retained bytes while waiting for an end marker. A frame larger
/// than this is abandoned as corrupt and the scan restarts at the next
/// start marker.
const MAX_PENDING_BYTES: usize = 8 * 1024 * 1024;

/// Incremental scanner over MJPEG chunks
#[derive(Debug, Default)]
pub struct JpegScanner {
    buf: Vec<u8>,
}

impl JpegScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk from the stream
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete JPEG, if one is fully buffered.
    ///
    /// Call repeatedly after each `push` until it returns None; a single
    /// chunk may carry several frames.
    pub fn next_jpeg(&mut self) -> Option<Bytes> {
        loop {
            let start = find(&self.buf, &JPEG_START)?;
            if start > 0 {
                self.buf.drain(..start);
            }

            match find(&self.buf[JPEG_START.len()..], &JPEG_END) {
                Some(rel) => {
                    let end = JPEG_START.len() + rel + JPEG_END.len();
                    let jpg = Bytes::copy_from_slice(&self.buf[..end]);
                    self.buf.drain(..end);
                    return Some(jpg);
                }
                None => {
                    if self.buf.len() > MAX_PENDING_BYTES {
                        tracing::warn!(
                            pending = self.buf.len(),
                            "No end marker within bound, discarding partial frame"
                        );
                        self.buf.drain(..JPEG_START.len());
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    /// Bytes currently held waiting for markers
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(body);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn test_single_frame_in_one_chunk() {
        let mut scanner = JpegScanner::new();
        scanner.push(&jpeg(b"abc"));

        let frame = scanner.next_jpeg().unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame[frame.len() - 2..], &[0xFF, 0xD9]);
        assert!(scanner.next_jpeg().is_none());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let data = jpeg(b"split-me");
        let (a, b) = data.split_at(4);

        let mut scanner = JpegScanner::new();
        scanner.push(a);
        assert!(scanner.next_jpeg().is_none());
        scanner.push(b);
        assert_eq!(scanner.next_jpeg().unwrap().len(), data.len());
    }

    #[test]
    fn test_multiple_frames_per_chunk() {
        let mut chunk = jpeg(b"one");
        chunk.extend_from_slice(&jpeg(b"two"));

        let mut scanner = JpegScanner::new();
        scanner.push(&chunk);
        assert!(scanner.next_jpeg().is_some());
        assert!(scanner.next_jpeg().is_some());
        assert!(scanner.next_jpeg().is_none());
    }

    #[test]
    fn test_garbage_before_start_is_trimmed() {
        let mut chunk = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        chunk.extend_from_slice(&jpeg(b"payload"));

        let mut scanner = JpegScanner::new();
        scanner.push(&chunk);
        let frame = scanner.next_jpeg().unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        assert_eq!(scanner.pending(), 0);
    }

    // Malformed bytes injected between two valid frames must not break
    // delimiting of the second frame.
    #[test]
    fn test_malformed_chunk_between_frames() {
        let mut scanner = JpegScanner::new();
        scanner.push(&jpeg(b"first"));
        scanner.push(b"\x00\x01\x02 not a jpeg \x03");
        scanner.push(&jpeg(b"second"));

        let first = scanner.next_jpeg().unwrap();
        let second = scanner.next_jpeg().unwrap();
        assert!(first.ends_with(&[0xFF, 0xD9]));
        assert!(second.ends_with(&[0xFF, 0xD9]));
        assert!(scanner.next_jpeg().is_none());
    }

    #[test]
    fn test_lone_end_marker_is_skipped() {
        let mut scanner = JpegScanner::new();
        scanner.push(&[0xFF, 0xD9]);
        assert!(scanner.next_jpeg().is_none());

        scanner.push(&jpeg(b"after"));
        assert!(scanner.next_jpeg().is_some());
    }
}
