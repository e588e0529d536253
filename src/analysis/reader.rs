//! Streaming reader for classic libpcap capture files.
//!
//! Container parsing is done by `pcap-file`; this layer validates the global
//! header eagerly in [`CaptureReader::new`], numbers the frames and maps the
//! crate's errors onto [`CaptureError`]. Once a frame fails to read the
//! iterator is fused, so nothing after a truncated record is ever interpreted.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use pcap_file::pcap::{PcapHeader, PcapReader};
use pcap_file::{DataLink, PcapError};
use crate::error::CaptureError;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

const SUPPORTED_MAJOR_VERSION: u16 = 2;

/// One captured link-layer frame with its record metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Zero-based position in the capture.
    pub index: usize,
    pub data: Vec<u8>,
    pub captured_len: Option<u32>,
    pub original_len: Option<u32>,
    /// Capture time as an offset from the Unix epoch.
    pub captured_at: Duration,
}

impl RawFrame {
    /// Frame built from bytes alone; both lengths are taken from the buffer.
    pub fn from_bytes(index: usize, data: Vec<u8>) -> Self {
        let len = u32::try_from(data.len()).ok();
        Self {
            index,
            data,
            captured_len: len,
            original_len: len,
            captured_at: Duration::ZERO,
        }
    }

    /// Size used for reporting: captured length, then original length, then 0.
    pub fn size(&self) -> u32 {
        self.captured_len.or(self.original_len).unwrap_or(0)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.captured_at.as_secs()).ok()?;
        DateTime::from_timestamp(secs, self.captured_at.subsec_nanos())
    }
}

/// Counts the bytes the source has handed to the pcap parser.
struct Tally<R> {
    inner: R,
    produced: Arc<AtomicUsize>,
}

impl<R: Read> Read for Tally<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.produced.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }
}

pub struct CaptureReader<R: Read> {
    inner: PcapReader<Tally<R>>,
    header: PcapHeader,
    produced: Arc<AtomicUsize>,
    /// Bytes of the source covered by the header and every frame yielded so far.
    consumed: usize,
    next_index: usize,
    finished: bool,
}

impl<R: Read> CaptureReader<R> {
    pub fn new(source: R) -> Result<Self, CaptureError> {
        let produced = Arc::new(AtomicUsize::new(0));
        let tally = Tally {
            inner: source,
            produced: produced.clone(),
        };

        let inner = PcapReader::new(tally).map_err(|e| match e {
            e if is_end_of_source(&e) => CaptureError::MalformedContainer(format!(
                "global header needs {} bytes, source holds {}",
                GLOBAL_HEADER_LEN,
                produced.load(Ordering::Relaxed)
            )),
            PcapError::IoError(e) => CaptureError::Io(e),
            other => CaptureError::MalformedContainer(other.to_string()),
        })?;

        let header = inner.header();
        if header.version_major != SUPPORTED_MAJOR_VERSION {
            return Err(CaptureError::MalformedContainer(format!(
                "unsupported format version {}.{}",
                header.version_major, header.version_minor
            )));
        }
        if !matches!(header.datalink, DataLink::ETHERNET) {
            log::warn!(
                "Capture link type {:?} is not Ethernet; frames will be decoded as Ethernet anyway",
                header.datalink
            );
        }
        log::debug!(
            "Capture header: version {}.{}, {:?} endian, {:?} timestamps, snaplen {}, link type {:?}",
            header.version_major,
            header.version_minor,
            header.endianness,
            header.ts_resolution,
            header.snaplen,
            header.datalink
        );

        Ok(Self {
            inner,
            header,
            produced,
            consumed: GLOBAL_HEADER_LEN,
            next_index: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    /// Number of frames yielded so far.
    pub fn frames_read(&self) -> usize {
        self.next_index
    }

    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if self.finished {
            return Ok(None);
        }

        match self.read_record() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let index = self.next_index;

        let packet = match self.inner.next_packet() {
            None => return Ok(None),
            Some(Ok(packet)) => packet,
            Some(Err(e)) if is_end_of_source(&e) => {
                return Err(CaptureError::TruncatedFrame {
                    index,
                    available: self
                        .produced
                        .load(Ordering::Relaxed)
                        .saturating_sub(self.consumed),
                })
            }
            Some(Err(PcapError::IoError(e))) => return Err(CaptureError::Io(e)),
            Some(Err(e)) => {
                return Err(CaptureError::MalformedContainer(format!(
                    "frame #{}: {}",
                    index, e
                )))
            }
        };

        let data = packet.data.into_owned();
        self.consumed += RECORD_HEADER_LEN + data.len();
        self.next_index += 1;
        Ok(Some(RawFrame {
            index,
            captured_len: u32::try_from(data.len()).ok(),
            original_len: Some(packet.orig_len),
            captured_at: packet.timestamp,
            data,
        }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RawFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// The source ran dry in the middle of a header or record.
fn is_end_of_source(error: &PcapError) -> bool {
    match error {
        PcapError::IncompleteBuffer => true,
        PcapError::IoError(e) => e.kind() == ErrorKind::UnexpectedEof,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::*;
    use pcap_file::{Endianness, TsResolution};
    use std::io::Cursor;

    #[test]
    fn test_reads_all_frames() {
        let bytes = capture(&[
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 6),
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 3], 17),
            short_frame(8),
        ]);

        let mut reader = CaptureReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.header().datalink, DataLink::ETHERNET));
        assert!(matches!(reader.header().endianness, Endianness::Little));
        assert_eq!(reader.header().snaplen, 65535);

        let frames: Vec<RawFrame> = reader.by_ref().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].index, 0);
        assert_eq!(frames[2].index, 2);
        assert_eq!(frames[2].data.len(), 8);
        assert_eq!(frames[0].captured_len, Some(IPV4_FRAME_LEN as u32));
        assert_eq!(frames[0].original_len, Some(IPV4_FRAME_LEN as u32));
        assert_eq!(reader.frames_read(), 3);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_capture_yields_nothing() {
        let mut reader = CaptureReader::new(Cursor::new(pcap_header())).unwrap();
        assert!(reader.next().is_none());
        assert_eq!(reader.frames_read(), 0);
    }

    #[test]
    fn test_big_endian_nanosecond_header() {
        let mut bytes = pcap_header_be_nanos();
        bytes.extend(record_be(&ipv4_frame([1, 2, 3, 4], [5, 6, 7, 8], 1), 1_700_000_000, 123_456_789));

        let mut reader = CaptureReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.header().endianness, Endianness::Big));
        assert!(matches!(reader.header().ts_resolution, TsResolution::NanoSecond));

        let frame = reader.next().unwrap().unwrap();
        assert_eq!(frame.data.len(), IPV4_FRAME_LEN);
        let ts = frame.timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_microsecond_timestamp() {
        let bytes = capture(&[short_frame(4)]);
        let frame = CaptureReader::new(Cursor::new(bytes)).unwrap().next().unwrap().unwrap();
        let ts = frame.timestamp().unwrap();
        assert_eq!(ts.timestamp(), FIXTURE_TS_SEC as i64);
        assert_eq!(ts.timestamp_subsec_nanos(), 250_000);
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let err = CaptureReader::new(Cursor::new(Vec::<u8>::new())).err().unwrap();
        assert!(matches!(err, CaptureError::MalformedContainer(_)));

        let err = CaptureReader::new(Cursor::new(pcap_header()[..10].to_vec())).err().unwrap();
        match err {
            CaptureError::MalformedContainer(msg) => assert!(msg.contains("source holds 10")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_is_malformed() {
        let mut bytes = pcap_header();
        bytes[..4].copy_from_slice(&[0x0a, 0x0d, 0x0d, 0x0a]);
        let err = CaptureReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, CaptureError::MalformedContainer(_)));
    }

    #[test]
    fn test_unsupported_version_is_malformed() {
        let mut bytes = pcap_header();
        bytes[4..6].copy_from_slice(&1u16.to_le_bytes());
        let err = CaptureReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, CaptureError::MalformedContainer(_)));
    }

    #[test]
    fn test_truncated_payload_ends_sequence() {
        let mut bytes = capture(&[
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 6),
            ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 6),
        ]);
        bytes.truncate(bytes.len() - 10);

        let mut reader = CaptureReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(CaptureError::TruncatedFrame { index, available }) => {
                assert_eq!(index, 1);
                assert_eq!(available, RECORD_HEADER_LEN + IPV4_FRAME_LEN - 10);
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(reader.next().is_none());
        assert_eq!(reader.frames_read(), 1);
    }

    #[test]
    fn test_partial_record_header_is_truncated() {
        let mut bytes = capture(&[short_frame(20)]);
        bytes.extend_from_slice(&[0u8; 7]);

        let mut reader = CaptureReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(CaptureError::TruncatedFrame { index, available }) => {
                assert_eq!(index, 1);
                assert_eq!(available, 7);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_bogus_declared_length_ends_sequence() {
        let mut bytes = pcap_header();
        bytes.extend_from_slice(&FIXTURE_TS_SEC.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);

        let mut reader = CaptureReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
        assert_eq!(reader.frames_read(), 0);
    }

    #[test]
    fn test_frame_size_fallbacks() {
        let mut frame = RawFrame::from_bytes(0, vec![0u8; 60]);
        assert_eq!(frame.size(), 60);
        frame.captured_len = None;
        frame.original_len = Some(1514);
        assert_eq!(frame.size(), 1514);
        frame.original_len = None;
        assert_eq!(frame.size(), 0);
        assert_eq!(frame.timestamp().map(|ts| ts.timestamp()), Some(0));
    }
}
