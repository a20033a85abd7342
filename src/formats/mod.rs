//! Per-format leaf helpers (`spec.md` section 1): narrow, concrete readers
//! for the handful of source formats the pipeline needs to scan and decode.
//! None of these claim full format fidelity; each does just enough to feed
//! the conversion pipeline a [`crate::model::StackDescriptor`] or raw voxel
//! bytes.

pub mod dicom;
pub mod image_stack;
pub mod nrrd;

pub use nrrd::NrrdConverter;

use std::path::Path;

use crate::error::InvalidPayload;
use crate::model::StackDescriptor;

/// Scan a directory for both DICOM series and stacked image series that may
/// coexist side by side, returning one descriptor per distinct stack
/// (`spec.md` section 8 scenario 1: two DICOM series plus a TIFF stack in one
/// directory yields three descriptors).
pub fn scan_source_directory(dir: &Path) -> Result<Vec<StackDescriptor>, InvalidPayload> {
    let mut stacks = dicom::scan_dicom_directory(dir)?;
    stacks.extend(image_stack::scan_image_directory(dir)?);
    Ok(stacks)
}

/// Decode one stack element's raw sample bytes, dispatching on
/// [`crate::model::StackKind`]. DICOM elements with native pixel data are
/// read directly at their payload offset; JPEG-encapsulated and plain image
/// elements are decoded through the `image` crate.
pub fn decode_element_payload(
    descriptor: &StackDescriptor,
    element: &crate::model::StackElement,
) -> Result<Vec<u8>, InvalidPayload> {
    use crate::model::StackKind;

    match descriptor.kind {
        StackKind::Image => image_stack::decode_image_payload(&element.path),
        StackKind::Dicom if descriptor.jpeg_encoded => {
            let bytes = element.read_bytes()?;
            let jpeg_start = element.payload_offset as usize;
            let image = image::load_from_memory(&bytes[jpeg_start..]).map_err(|e| InvalidPayload::Jpeg {
                path: element.path.clone(),
                reason: e.to_string(),
            })?;
            Ok(image.to_luma8().into_raw())
        }
        StackKind::Dicom => {
            let bytes = element.read_bytes()?;
            let stride = (descriptor.bits_allocated as usize / 8) * descriptor.component_count as usize;
            let payload_len = descriptor.width as usize * descriptor.height as usize * stride;
            let start = element.payload_offset as usize;
            let end = (start + payload_len).min(bytes.len());
            Ok(bytes[start..end].to_vec())
        }
    }
}
