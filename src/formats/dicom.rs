//! A narrow DICOM element reader.
//!
//! Full DICOM tag parsing is out of scope (`spec.md` section 1); this module
//! reads just the handful of elements the stack descriptor needs: rows,
//! columns, bits allocated/stored, samples per pixel, photometric
//! interpretation, and the pixel-data element (native or encapsulated
//! JPEG). It understands explicit-VR little-endian transfer syntax, the
//! common case for the formats this pipeline cares about.

use std::path::{Path, PathBuf};

use crate::error::{InvalidPayload, IoError};
use crate::model::{StackDescriptor, StackElement, StackKind};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

#[derive(Debug, Clone)]
pub struct DicomElementInfo {
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub samples_per_pixel: u16,
    pub photometric_interpretation: String,
    /// Absolute byte offset to the pixel-data payload (after any VR/length
    /// header), per [`crate::model::StackElement`].
    pub payload_offset: u64,
    pub jpeg_encoded: bool,
}

/// Sniff: does this file start with the 128-byte preamble and "DICM" magic?
pub fn is_dicom(first_512: &[u8]) -> bool {
    first_512.len() >= PREAMBLE_LEN + 4 && &first_512[PREAMBLE_LEN..PREAMBLE_LEN + 4] == MAGIC
}

/// Parse the handful of tags this pipeline cares about out of a DICOM file.
pub fn read_dicom_header(path: &Path) -> Result<DicomElementInfo, InvalidPayload> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if !is_dicom(&bytes) {
        return Err(InvalidPayload::MissingTag {
            path: path.to_path_buf(),
            tag: "DICM magic",
        });
    }

    let mut cursor = PREAMBLE_LEN + 4;
    let mut rows = None;
    let mut columns = None;
    let mut bits_allocated = None;
    let mut bits_stored = None;
    let mut samples_per_pixel = None;
    let mut photometric = None;
    let mut payload_offset = None;
    let mut jpeg_encoded = false;

    while cursor + 8 <= bytes.len() {
        let group = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]);
        let element = u16::from_le_bytes([bytes[cursor + 2], bytes[cursor + 3]]);
        let vr = [bytes[cursor + 4], bytes[cursor + 5]];
        let vr_str = std::str::from_utf8(&vr).unwrap_or("??");
        let header_len;
        let value_len: u64;
        let value_start;

        if matches!(vr_str, "OB" | "OW" | "OF" | "SQ" | "UT" | "UN") {
            // Long-form VR: 2 reserved bytes then a u32 length.
            header_len = 12;
            value_len = u32::from_le_bytes(bytes[cursor + 8..cursor + 12].try_into().unwrap()) as u64;
            value_start = cursor + header_len;
        } else {
            header_len = 8;
            value_len = u16::from_le_bytes([bytes[cursor + 6], bytes[cursor + 7]]) as u64;
            value_start = cursor + header_len;
        }

        match (group, element) {
            (0x0028, 0x0010) => rows = Some(u16::from_le_bytes([bytes[value_start], bytes[value_start + 1]])),
            (0x0028, 0x0011) => columns = Some(u16::from_le_bytes([bytes[value_start], bytes[value_start + 1]])),
            (0x0028, 0x0100) => {
                bits_allocated = Some(u16::from_le_bytes([bytes[value_start], bytes[value_start + 1]]))
            }
            (0x0028, 0x0101) => bits_stored = Some(u16::from_le_bytes([bytes[value_start], bytes[value_start + 1]])),
            (0x0028, 0x0002) => {
                samples_per_pixel = Some(u16::from_le_bytes([bytes[value_start], bytes[value_start + 1]]))
            }
            (0x0028, 0x0004) => {
                let raw = &bytes[value_start..value_start + value_len as usize];
                photometric = Some(String::from_utf8_lossy(raw).trim().to_string());
            }
            (0x7FE0, 0x0010) => {
                if value_len == u32::MAX as u64 {
                    // Encapsulated (compressed) pixel data: Basic Offset
                    // Table item, then the first (and here, only) fragment.
                    jpeg_encoded = true;
                    let mut p = value_start;
                    p = skip_item(&bytes, p);
                    payload_offset = Some(first_fragment_offset(&bytes, p) as u64);
                } else {
                    payload_offset = Some(value_start as u64);
                }
                break;
            }
            _ => {}
        }

        cursor = value_start + value_len as usize;
    }

    Ok(DicomElementInfo {
        rows: rows.ok_or(InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "Rows (0028,0010)" })?,
        columns: columns.ok_or(InvalidPayload::MissingTag { path: path.to_path_buf(), tag: "Columns (0028,0011)" })?,
        bits_allocated: bits_allocated.ok_or(InvalidPayload::MissingTag {
            path: path.to_path_buf(),
            tag: "BitsAllocated (0028,0100)",
        })?,
        bits_stored: bits_stored.unwrap_or(bits_allocated.unwrap_or(8)),
        samples_per_pixel: samples_per_pixel.unwrap_or(1),
        photometric_interpretation: photometric.unwrap_or_else(|| "MONOCHROME2".to_string()),
        payload_offset: payload_offset.ok_or(InvalidPayload::MissingTag {
            path: path.to_path_buf(),
            tag: "PixelData (7FE0,0010)",
        })?,
        jpeg_encoded,
    })
}

/// Skip one `(FFFE,E000)` item (used for the Basic Offset Table), returning
/// the offset just past it.
fn skip_item(bytes: &[u8], offset: usize) -> usize {
    let len = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
    offset + 8 + len
}

/// Offset to the payload of the first fragment item after a skipped Basic
/// Offset Table.
fn first_fragment_offset(_bytes: &[u8], offset: usize) -> usize {
    offset + 8
}

/// Scan a directory of DICOM files into [`StackDescriptor`]s, grouping by
/// shared geometry (`spec.md` section 4.2 point 1). Callers then probe
/// JPEG-encoded stacks with the JPEG decoder and drop the whole stack on any
/// invalid element.
pub fn scan_dicom_directory(dir: &Path) -> Result<Vec<StackDescriptor>, InvalidPayload> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| IoError::Read {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut groups: Vec<(DicomElementInfo, Vec<StackElement>)> = Vec::new();

    for path in entries {
        let bytes_head = match std::fs::read(&path) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if !is_dicom(&bytes_head) {
            continue;
        }
        let info = read_dicom_header(&path)?;

        let group = groups.iter_mut().find(|(existing, _)| {
            existing.rows == info.rows
                && existing.columns == info.columns
                && existing.bits_allocated == info.bits_allocated
                && existing.bits_stored == info.bits_stored
                && existing.samples_per_pixel == info.samples_per_pixel
                && existing.jpeg_encoded == info.jpeg_encoded
        });

        let element = StackElement::new(path, info.payload_offset);
        match group {
            Some((_, elements)) => elements.push(element),
            None => groups.push((info, vec![element])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(info, elements)| StackDescriptor {
            elements,
            kind: StackKind::Dicom,
            width: info.columns as u32,
            height: info.rows as u32,
            bits_allocated: info.bits_allocated as u32,
            bits_stored: info.bits_stored as u32,
            component_count: info.samples_per_pixel,
            big_endian: false,
            jpeg_encoded: info.jpeg_encoded,
            aspect: (1.0, 1.0, 1.0),
            description: info.photometric_interpretation,
            modality: "OT".to_string(),
        })
        .collect())
}

/// Synthesizes minimal DICOM-like files for tests, in the same explicit-VR
/// little-endian layout [`read_dicom_header`] reads.
///
/// Not `#[cfg(test)]`-gated: the `tests/` integration suite links against
/// this crate without the `test` cfg and needs these builders too.
pub mod fixtures {
    use super::*;
    use std::io::Write;

    fn push_element_us(buf: &mut Vec<u8>, group: u16, element: u16, value: u16) {
        buf.extend_from_slice(&group.to_le_bytes());
        buf.extend_from_slice(&element.to_le_bytes());
        buf.extend_from_slice(b"US");
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_element_cs(buf: &mut Vec<u8>, group: u16, element: u16, value: &str) {
        buf.extend_from_slice(&group.to_le_bytes());
        buf.extend_from_slice(&element.to_le_bytes());
        buf.extend_from_slice(b"CS");
        buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
    }

    /// Build a native (uncompressed) pixel-data DICOM file.
    pub fn write_native_dicom(
        path: &Path,
        rows: u16,
        columns: u16,
        bits_allocated: u16,
        samples_per_pixel: u16,
        pixel_data: &[u8],
    ) {
        let mut buf = vec![0u8; PREAMBLE_LEN];
        buf.extend_from_slice(MAGIC);
        push_element_us(&mut buf, 0x0028, 0x0010, rows);
        push_element_us(&mut buf, 0x0028, 0x0011, columns);
        push_element_us(&mut buf, 0x0028, 0x0100, bits_allocated);
        push_element_us(&mut buf, 0x0028, 0x0101, bits_allocated);
        push_element_us(&mut buf, 0x0028, 0x0002, samples_per_pixel);
        push_element_cs(&mut buf, 0x0028, 0x0004, if samples_per_pixel == 3 { "RGB" } else { "MONOCHROME2" });

        // PixelData, OW, defined length.
        buf.extend_from_slice(&0x7FE0u16.to_le_bytes());
        buf.extend_from_slice(&0x0010u16.to_le_bytes());
        buf.extend_from_slice(b"OW");
        buf.extend_from_slice(&0u16.to_le_bytes()); // reserved
        buf.extend_from_slice(&(pixel_data.len() as u32).to_le_bytes());
        buf.extend_from_slice(pixel_data);

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    /// Build an encapsulated (JPEG) pixel-data DICOM file with a single
    /// fragment.
    pub fn write_encapsulated_dicom(
        path: &Path,
        rows: u16,
        columns: u16,
        bits_allocated: u16,
        samples_per_pixel: u16,
        jpeg_bytes: &[u8],
    ) {
        let mut buf = vec![0u8; PREAMBLE_LEN];
        buf.extend_from_slice(MAGIC);
        push_element_us(&mut buf, 0x0028, 0x0010, rows);
        push_element_us(&mut buf, 0x0028, 0x0011, columns);
        push_element_us(&mut buf, 0x0028, 0x0100, bits_allocated);
        push_element_us(&mut buf, 0x0028, 0x0101, bits_allocated);
        push_element_us(&mut buf, 0x0028, 0x0002, samples_per_pixel);
        push_element_cs(&mut buf, 0x0028, 0x0004, "MONOCHROME2");

        buf.extend_from_slice(&0x7FE0u16.to_le_bytes());
        buf.extend_from_slice(&0x0010u16.to_le_bytes());
        buf.extend_from_slice(b"OB");
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes()); // undefined length

        // Basic Offset Table item (empty).
        buf.extend_from_slice(&0xFFFEu16.to_le_bytes());
        buf.extend_from_slice(&0xE000u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());

        // First fragment item.
        buf.extend_from_slice(&0xFFFEu16.to_le_bytes());
        buf.extend_from_slice(&0xE000u16.to_le_bytes());
        buf.extend_from_slice(&(jpeg_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(jpeg_bytes);

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_native_header_and_payload_offset() {
        let dir = std::env::temp_dir().join(format!("uvf-dicom-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("slice.dcm");
        fixtures::write_native_dicom(&path, 4, 4, 8, 1, &[9u8; 16]);

        let info = read_dicom_header(&path).unwrap();
        assert_eq!(info.rows, 4);
        assert_eq!(info.columns, 4);
        assert_eq!(info.bits_allocated, 8);
        assert!(!info.jpeg_encoded);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[info.payload_offset as usize..info.payload_offset as usize + 16], &[9u8; 16]);
    }

    #[test]
    fn reads_encapsulated_header_as_jpeg_encoded() {
        let dir = std::env::temp_dir().join(format!("uvf-dicom-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("slice.dcm");
        fixtures::write_encapsulated_dicom(&path, 4, 4, 8, 1, &[0xFF, 0xD8, 0xFF, 0xD9]);

        let info = read_dicom_header(&path).unwrap();
        assert!(info.jpeg_encoded);
    }

    #[test]
    fn rejects_non_dicom_file() {
        let dir = std::env::temp_dir().join(format!("uvf-dicom-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_dicom.bin");
        std::fs::write(&path, b"plain bytes").unwrap();
        assert!(read_dicom_header(&path).is_err());
    }
}
