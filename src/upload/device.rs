//! Rewrites the recording-device identity inside FIT files so the service
//! treats uploads from third-party sources as coming from a known watch.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Not a FIT file: {0}")]
    NotFit(&'static str),

    #[error("FIT data truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Data message at byte {offset} uses undefined local type {local}")]
    UndefinedLocal { local: u8, offset: usize },
}

/// Transforms an activity file before it is uploaded.
pub trait DeviceAdaptor: Send + Sync {
    fn adapt(&self, file_name: &str, bytes: Vec<u8>) -> Result<Vec<u8>, DeviceError>;
}

const FILE_ID: u16 = 0;
const DEVICE_INFO: u16 = 23;

/// Replaces manufacturer, product and serial number in every `file_id` and
/// `device_info` message, then fixes up the file CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitDeviceSpoofer {
    pub manufacturer: u16,
    pub product: u16,
    pub serial_number: u32,
}

impl Default for FitDeviceSpoofer {
    fn default() -> Self {
        Self {
            manufacturer: 1,
            product: 3415,
            serial_number: 1_234_567_890,
        }
    }
}

impl DeviceAdaptor for FitDeviceSpoofer {
    fn adapt(&self, file_name: &str, mut bytes: Vec<u8>) -> Result<Vec<u8>, DeviceError> {
        let is_fit = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("fit"));
        if !is_fit {
            tracing::warn!("{} is not a FIT file; uploading it unchanged", file_name);
            return Ok(bytes);
        }

        let (header_size, data_end) = parse_header(&bytes)?;
        let patched = self.patch_records(&mut bytes[..data_end], header_size)?;
        tracing::debug!("Rewrote device identity in {} messages of {}", patched, file_name);

        let crc = fit_crc(&bytes[..data_end]);
        bytes[data_end..data_end + 2].copy_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }
}

struct Definition {
    big_endian: bool,
    global: u16,
    /// (field number, size in bytes)
    fields: Vec<(u8, u8)>,
    developer_size: usize,
}

impl Definition {
    fn data_size(&self) -> usize {
        self.fields.iter().map(|&(_, size)| size as usize).sum::<usize>() + self.developer_size
    }
}

/// Returns the header size and the offset where the record data ends
/// (and the 2-byte file CRC begins).
fn parse_header(bytes: &[u8]) -> Result<(usize, usize), DeviceError> {
    let header_size = *bytes.first().ok_or(DeviceError::NotFit("empty file"))? as usize;
    if header_size != 12 && header_size != 14 {
        return Err(DeviceError::NotFit("unexpected header size"));
    }
    if bytes.len() < header_size || &bytes[8..12] != b".FIT" {
        return Err(DeviceError::NotFit("missing .FIT signature"));
    }
    let data_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let data_end = header_size + data_size;
    if bytes.len() < data_end + 2 {
        return Err(DeviceError::Truncated { offset: bytes.len() });
    }
    Ok((header_size, data_end))
}

impl FitDeviceSpoofer {
    fn patch_records(&self, data: &mut [u8], mut pos: usize) -> Result<usize, DeviceError> {
        let mut definitions: HashMap<u8, Definition> = HashMap::new();
        let mut patched = 0;

        while pos < data.len() {
            let header = data[pos];
            let record_start = pos;
            pos += 1;

            if header & 0x80 != 0 {
                // Compressed timestamp header: always a data message.
                let local = (header >> 5) & 0x03;
                pos = self.patch_data(data, pos, local, record_start, &definitions, &mut patched)?;
            } else if header & 0x40 != 0 {
                let local = header & 0x0F;
                let (definition, next) = read_definition(data, pos, header & 0x20 != 0)?;
                definitions.insert(local, definition);
                pos = next;
            } else {
                let local = header & 0x0F;
                pos = self.patch_data(data, pos, local, record_start, &definitions, &mut patched)?;
            }
        }
        Ok(patched)
    }

    fn patch_data(
        &self,
        data: &mut [u8],
        pos: usize,
        local: u8,
        record_start: usize,
        definitions: &HashMap<u8, Definition>,
        patched: &mut usize,
    ) -> Result<usize, DeviceError> {
        let definition = definitions.get(&local).ok_or(DeviceError::UndefinedLocal {
            local,
            offset: record_start,
        })?;
        let end = pos + definition.data_size();
        if end > data.len() {
            return Err(DeviceError::Truncated { offset: record_start });
        }

        let (manufacturer, product, serial) = match definition.global {
            FILE_ID => (1, 2, 3),
            DEVICE_INFO => (2, 4, 3),
            _ => return Ok(end),
        };

        let mut offset = pos;
        for &(number, size) in &definition.fields {
            let field = &mut data[offset..offset + size as usize];
            if number == manufacturer && size == 2 {
                write_u16(field, self.manufacturer, definition.big_endian);
            } else if number == product && size == 2 {
                write_u16(field, self.product, definition.big_endian);
            } else if number == serial && size == 4 {
                write_u32(field, self.serial_number, definition.big_endian);
            }
            offset += size as usize;
        }
        *patched += 1;
        Ok(end)
    }
}

fn read_definition(data: &[u8], pos: usize, has_developer_fields: bool) -> Result<(Definition, usize), DeviceError> {
    let truncated = DeviceError::Truncated { offset: pos };
    let fixed = data.get(pos..pos + 5).ok_or(truncated)?;
    let big_endian = fixed[1] == 1;
    let global = if big_endian {
        u16::from_be_bytes([fixed[2], fixed[3]])
    } else {
        u16::from_le_bytes([fixed[2], fixed[3]])
    };
    let field_count = fixed[4] as usize;
    let mut next = pos + 5;

    let raw_fields = data
        .get(next..next + field_count * 3)
        .ok_or(DeviceError::Truncated { offset: next })?;
    let fields = raw_fields.chunks_exact(3).map(|f| (f[0], f[1])).collect();
    next += field_count * 3;

    let mut developer_size = 0;
    if has_developer_fields {
        let count = *data.get(next).ok_or(DeviceError::Truncated { offset: next })? as usize;
        next += 1;
        let raw = data
            .get(next..next + count * 3)
            .ok_or(DeviceError::Truncated { offset: next })?;
        developer_size = raw.chunks_exact(3).map(|f| f[1] as usize).sum();
        next += count * 3;
    }

    Ok((
        Definition {
            big_endian,
            global,
            fields,
            developer_size,
        },
        next,
    ))
}

fn write_u16(field: &mut [u8], value: u16, big_endian: bool) {
    let bytes = if big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
    field.copy_from_slice(&bytes);
}

fn write_u32(field: &mut [u8], value: u32, big_endian: bool) {
    let bytes = if big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
    field.copy_from_slice(&bytes);
}

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800, 0xB401,
    0x5000, 0x9C01, 0x8801, 0x4400,
];

/// FIT CRC-16, processed a nibble at a time.
pub(crate) fn fit_crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |mut crc, &byte| {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(byte & 0xF) as usize];

        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize]
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal FIT file: a little-endian file_id, a big-endian device_info
    /// and one unrelated record message.
    pub(crate) fn sample_fit() -> Vec<u8> {
        let mut records = Vec::new();

        // Definition, local 0 -> file_id, little endian.
        records.extend([0x40, 0, 0, 0, 0, 5]);
        records.extend([0, 1, 0x00, 1, 2, 0x84, 2, 2, 0x84, 3, 4, 0x8C, 4, 4, 0x86]);
        // Data: type=4 (activity), manufacturer=255, product=42, serial=7, time.
        records.push(0x00);
        records.push(4);
        records.extend(255u16.to_le_bytes());
        records.extend(42u16.to_le_bytes());
        records.extend(7u32.to_le_bytes());
        records.extend(1_000_000u32.to_le_bytes());

        // Definition, local 1 -> device_info, big endian.
        records.extend([0x41, 0, 1]);
        records.extend(23u16.to_be_bytes());
        records.push(4);
        records.extend([0, 1, 0x02, 2, 2, 0x84, 3, 4, 0x8C, 4, 2, 0x84]);
        records.push(0x01);
        records.push(0);
        records.extend(255u16.to_be_bytes());
        records.extend(7u32.to_be_bytes());
        records.extend(42u16.to_be_bytes());

        // Definition, local 2 -> record (20), heart_rate only.
        records.extend([0x42, 0, 0, 20, 0, 1, 3, 1, 0x02]);
        records.extend([0x02, 150]);
        // Compressed-timestamp header pointing at local 2.
        records.extend([0x80 | (2 << 5) | 5, 151]);

        let mut file = vec![14, 0x20, 0x08, 0x08];
        file.extend((records.len() as u32).to_le_bytes());
        file.extend(b".FIT");
        file.extend([0, 0]);
        file.extend(records);
        let crc = fit_crc(&file);
        file.extend(crc.to_le_bytes());
        file
    }

    #[test]
    fn test_crc_of_file_with_trailing_crc_is_zero() {
        assert_eq!(fit_crc(&sample_fit()), 0);
    }

    #[test]
    fn test_rewrites_file_id_and_device_info() {
        let original = sample_fit();
        let out = FitDeviceSpoofer::default().adapt("ride.FIT", original.clone()).unwrap();
        assert_eq!(out.len(), original.len());
        assert_eq!(fit_crc(&out), 0, "file CRC recomputed");

        // file_id data payload starts after header (14) + definition (6 + 15) + record header.
        let file_id = 14 + 21 + 1;
        assert_eq!(out[file_id], 4, "type untouched");
        assert_eq!(u16::from_le_bytes([out[file_id + 1], out[file_id + 2]]), 1);
        assert_eq!(u16::from_le_bytes([out[file_id + 3], out[file_id + 4]]), 3415);
        assert_eq!(
            u32::from_le_bytes(out[file_id + 5..file_id + 9].try_into().unwrap()),
            1_234_567_890
        );
        assert_eq!(out[file_id + 9..file_id + 13], original[file_id + 9..file_id + 13]);

        // device_info payload: after file_id data (13) + definition (6 + 12) + header.
        let device = file_id + 13 + 18 + 1;
        assert_eq!(out[device], 0);
        assert_eq!(u16::from_be_bytes([out[device + 1], out[device + 2]]), 1);
        assert_eq!(
            u32::from_be_bytes(out[device + 3..device + 7].try_into().unwrap()),
            1_234_567_890
        );
        assert_eq!(u16::from_be_bytes([out[device + 7], out[device + 8]]), 3415);

        // Heart-rate records are untouched.
        let tail = out.len() - 2;
        assert_eq!(out[tail - 4..tail], [0x02, 150, 0xC5, 151]);
    }

    #[test]
    fn test_non_fit_passes_through() {
        let gpx = b"<gpx></gpx>".to_vec();
        let out = FitDeviceSpoofer::default().adapt("route.gpx", gpx.clone()).unwrap();
        assert_eq!(out, gpx);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = sample_fit();
        bytes[8] = b'X';
        let err = FitDeviceSpoofer::default().adapt("a.fit", bytes).unwrap_err();
        assert!(matches!(err, DeviceError::NotFit(_)));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = sample_fit();
        let cut = bytes[..bytes.len() - 10].to_vec();
        let err = FitDeviceSpoofer::default().adapt("a.fit", cut).unwrap_err();
        assert!(matches!(err, DeviceError::Truncated { .. }));
    }

    #[test]
    fn test_data_before_definition() {
        let mut file = vec![12, 0x10, 0, 0];
        file.extend(2u32.to_le_bytes());
        file.extend(b".FIT");
        file.extend([0x03, 0x00, 0, 0]);
        let err = FitDeviceSpoofer::default().adapt("a.fit", file).unwrap_err();
        assert!(matches!(err, DeviceError::UndefinedLocal { local: 3, offset: 12 }));
    }
}
