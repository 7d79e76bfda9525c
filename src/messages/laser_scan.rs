use bytes::{Buf, Bytes};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanDecodeError {
    #[error("payload too short for CDR encapsulation header")]
    MissingHeader,
    #[error("unsupported CDR representation {0:#06x}")]
    UnsupportedRepresentation(u16),
    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),
    #[error("sequence of {0} elements does not fit in payload")]
    SequenceTooLong(usize),
    #[error("frame id is not valid utf-8")]
    InvalidString,
}

const CDR_BE: u16 = 0x0000;
const CDR_LE: u16 = 0x0001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// `sensor_msgs/LaserScan` as published by the turtle lidar node
///
/// Ranges are in metres, angles in radians.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaserScan {
    pub header: Header,
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    pub time_increment: f32,
    pub scan_time: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub ranges: Vec<f32>,
    pub intensities: Vec<f32>,
}

impl LaserScan {
    pub fn from_cdr(payload: impl Into<Bytes>) -> Result<Self, ScanDecodeError> {
        let mut reader = CdrReader::new(payload.into())?;
        let stamp = Time {
            sec: reader.read_u32("stamp.sec")?,
            nsec: reader.read_u32("stamp.nsec")?,
        };
        let frame_id = reader.read_string()?;
        Ok(Self {
            header: Header { stamp, frame_id },
            angle_min: reader.read_f32("angle_min")?,
            angle_max: reader.read_f32("angle_max")?,
            angle_increment: reader.read_f32("angle_increment")?,
            time_increment: reader.read_f32("time_increment")?,
            scan_time: reader.read_f32("scan_time")?,
            range_min: reader.read_f32("range_min")?,
            range_max: reader.read_f32("range_max")?,
            ranges: reader.read_f32_sequence("ranges")?,
            intensities: reader.read_f32_sequence("intensities")?,
        })
    }
}

/// Minimal XCDR1 reader, enough for flat messages of 4 byte primitives
struct CdrReader {
    buf: Bytes,
    offset: usize,
    little_endian: bool,
}

impl CdrReader {
    fn new(mut buf: Bytes) -> Result<Self, ScanDecodeError> {
        if buf.remaining() < 4 {
            return Err(ScanDecodeError::MissingHeader);
        }
        let representation = buf.get_u16();
        // options are unused for plain CDR
        buf.advance(2);
        let little_endian = match representation {
            CDR_LE => true,
            CDR_BE => false,
            other => return Err(ScanDecodeError::UnsupportedRepresentation(other)),
        };
        Ok(Self {
            buf,
            offset: 0,
            little_endian,
        })
    }

    fn take(&mut self, count: usize, field: &'static str) -> Result<(), ScanDecodeError> {
        if self.buf.remaining() < count {
            return Err(ScanDecodeError::Truncated(field));
        }
        self.offset += count;
        Ok(())
    }

    fn align(&mut self, alignment: usize, field: &'static str) -> Result<(), ScanDecodeError> {
        let padding = (alignment - self.offset % alignment) % alignment;
        self.take(padding, field)?;
        self.buf.advance(padding);
        Ok(())
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, ScanDecodeError> {
        self.align(4, field)?;
        self.take(4, field)?;
        Ok(if self.little_endian {
            self.buf.get_u32_le()
        } else {
            self.buf.get_u32()
        })
    }

    fn read_f32(&mut self, field: &'static str) -> Result<f32, ScanDecodeError> {
        self.align(4, field)?;
        self.take(4, field)?;
        Ok(if self.little_endian {
            self.buf.get_f32_le()
        } else {
            self.buf.get_f32()
        })
    }

    fn read_string(&mut self) -> Result<String, ScanDecodeError> {
        let length = self.read_u32("frame_id")? as usize;
        self.take(length, "frame_id")?;
        let raw = self.buf.split_to(length);
        // length includes the nul terminator
        let text = raw.strip_suffix(&[0]).unwrap_or(&raw[..]);
        String::from_utf8(text.to_vec()).map_err(|_| ScanDecodeError::InvalidString)
    }

    fn read_f32_sequence(&mut self, field: &'static str) -> Result<Vec<f32>, ScanDecodeError> {
        let count = self.read_u32(field)? as usize;
        if count.saturating_mul(4) > self.buf.remaining() {
            return Err(ScanDecodeError::SequenceTooLong(count));
        }
        (0..count).map(|_| self.read_f32(field)).collect()
    }
}
