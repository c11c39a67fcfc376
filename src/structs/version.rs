use std::io::{Read, Write};
use std::mem::size_of;

use chrono::Local;

use super::*;
use crate::Error;

/// Wall-clock timestamp in the format version records carry.
pub(crate) fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl VersionInfo {
    pub(crate) fn record(&self) -> VersionRecord {
        let mut timestamp = [0u8; TIMESTAMP_FIELD];
        let length = self.timestamp.len().min(TIMESTAMP_FIELD);
        timestamp[..length].copy_from_slice(&self.timestamp.as_bytes()[..length]);
        VersionRecord {
            size: self.size as u64,
            block_index: self.block_index,
            delta_start: self.delta_start as u64,
            delta_size: self.delta_size as u64,
            version_number: self.version_number,
            prev_version: self.prev_version,
            timestamp,
        }
    }

    pub(crate) fn from_record(record: &VersionRecord) -> Result<Self, Error> {
        let terminator = record
            .timestamp
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(TIMESTAMP_FIELD);
        let timestamp = std::str::from_utf8(&record.timestamp[..terminator])?.to_owned();
        Ok(Self {
            version_number: record.version_number,
            timestamp,
            size: record.size as usize,
            block_index: record.block_index,
            delta_start: record.delta_start as usize,
            delta_size: record.delta_size as usize,
            prev_version: record.prev_version,
        })
    }
}

impl VersionRecord {
    /// Version records are stored back-to-back; the device must already be
    /// positioned at the record boundary.
    pub(crate) fn read_from<D: Read>(device: &mut D) -> Result<Self, Error> {
        let mut raw = [0u8; size_of::<Self>()];
        device.read_exact(&mut raw)?;
        Ok(bytemuck::pod_read_unaligned(&raw))
    }

    pub(crate) fn write_to<D: Write>(&self, device: &mut D) -> Result<(), Error> {
        device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{timestamp_now, VersionInfo, VersionRecord};
    use std::io::Cursor;

    #[test]
    fn timestamp_format() {
        let stamp = timestamp_now();
        assert_eq!(stamp.len(), 19);
        let bytes = stamp.as_bytes();
        assert_eq!(bytes[4], b'-');
        assert_eq!(bytes[7], b'-');
        assert_eq!(bytes[10], b' ');
        assert_eq!(bytes[13], b':');
        assert_eq!(bytes[16], b':');
    }

    #[test]
    fn record_round_trip() {
        let version = VersionInfo {
            version_number: 3,
            timestamp: "2024-05-01 12:30:00".to_owned(),
            size: 11,
            block_index: 4,
            delta_start: 5,
            delta_size: 6,
            prev_version: 2,
        };
        let loaded = VersionInfo::from_record(&version.record()).unwrap();
        assert_eq!(loaded, version);
    }

    #[test]
    fn sequential_read_and_write() {
        let first = VersionInfo {
            version_number: 1,
            timestamp: timestamp_now(),
            size: 5,
            block_index: 0,
            delta_start: 0,
            delta_size: 5,
            prev_version: 0,
        };
        let second = VersionInfo {
            version_number: 2,
            timestamp: timestamp_now(),
            size: 11,
            block_index: 1,
            delta_start: 5,
            delta_size: 6,
            prev_version: 1,
        };
        let mut device = Cursor::new(Vec::new());
        first.record().write_to(&mut device).unwrap();
        second.record().write_to(&mut device).unwrap();
        device.set_position(0);
        let records = [
            VersionRecord::read_from(&mut device).unwrap(),
            VersionRecord::read_from(&mut device).unwrap(),
        ];
        assert_eq!(VersionInfo::from_record(&records[0]).unwrap(), first);
        assert_eq!(VersionInfo::from_record(&records[1]).unwrap(), second);
    }
}
