//! `StackAssembler` (`spec.md` section 4.2 point 2): stack descriptor -> one
//! contiguous raw byte stream in canonical layout.

use std::io::Write;
use std::path::Path;

use crate::error::PipelineError;
use crate::formats;
use crate::model::{StackDescriptor, VolumeMeta};
use crate::progress::{ProgressSink, Severity};

/// Assemble every element of `stack` into a single raw file at `raw_path`,
/// in slice-major order, applying (in this order) JPEG decode, endian
/// normalization, and 3->4 component padding. Returns the resulting
/// [`VolumeMeta`].
///
/// A DICOM allocated-width >= 32 is treated as signed, preserved from
/// [`StackDescriptor::is_signed_heuristic`] (`spec.md` section 9).
pub fn assemble_stack(
    stack: &StackDescriptor,
    raw_path: &Path,
    sink: &dyn ProgressSink,
) -> Result<VolumeMeta, PipelineError> {
    let pad_to_four = stack.component_count == 3;
    let effective_bits_allocated = if stack.jpeg_encoded { 8 } else { stack.bits_allocated };
    let effective_component_count = if stack.jpeg_encoded { 1 } else { stack.component_count };
    let component_bytes = (effective_bits_allocated / 8) as usize;
    let is_signed = stack.is_signed_heuristic();

    let mut file = std::fs::File::create(raw_path).map_err(|source| crate::error::IoError::Write {
        path: raw_path.to_path_buf(),
        source,
    })?;

    let total = stack.elements.len().max(1);
    for (i, element) in stack.elements.iter().enumerate() {
        let mut payload = formats::decode_element_payload(stack, element)?;

        if stack.big_endian && component_bytes > 1 {
            crate::byteorder::swap_components_in_place(&mut payload, component_bytes);
        }

        if pad_to_four {
            payload = pad_rgb_to_rgba(&payload);
        }

        file.write_all(&payload).map_err(|source| crate::error::IoError::Write {
            path: raw_path.to_path_buf(),
            source,
        })?;

        sink.progress(((i + 1) * 100 / total) as u8, "assembling stack");
    }

    if stack.component_count == 3 {
        sink.notify(Severity::Info, "rewrote 3-component payload to 4-component (opaque alpha)");
    }

    let component_count = if pad_to_four { 4 } else { effective_component_count };
    Ok(VolumeMeta::new(
        effective_bits_allocated,
        component_count,
        is_signed,
        false,
        false,
        stack.domain(),
        stack.aspect,
    ))
}

/// Append an opaque `0xFF` alpha after every RGB triplet.
fn pad_rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for triplet in rgb.chunks_exact(3) {
        out.extend_from_slice(triplet);
        out.push(255);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StackElement, StackKind};

    #[test]
    fn pads_rgb_stack_to_rgba_with_opaque_alpha() {
        let dir = std::env::temp_dir().join(format!("uvf-assembler-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        let pixel_data: Vec<u8> = std::iter::repeat([1u8, 2, 3]).take(16).flatten().collect();
        crate::formats::dicom::fixtures::write_native_dicom(&dir.join("slice.dcm"), 4, 4, 8, 3, &pixel_data);
        let info = crate::formats::dicom::read_dicom_header(&dir.join("slice.dcm")).unwrap();
        let stack = StackDescriptor {
            elements: vec![StackElement::new(dir.join("slice.dcm"), info.payload_offset)],
            kind: StackKind::Dicom,
            width: 4,
            height: 4,
            bits_allocated: 8,
            bits_stored: 8,
            component_count: 3,
            big_endian: false,
            jpeg_encoded: false,
            aspect: (1.0, 1.0, 1.0),
            description: "rgb test".into(),
            modality: "OT".into(),
        };

        let raw_path = dir.join("out.raw");
        let meta = assemble_stack(&stack, &raw_path, &crate::progress::NullProgressSink).unwrap();
        assert_eq!(meta.component_count, 4);

        let bytes = std::fs::read(&raw_path).unwrap();
        assert_eq!(bytes.len(), 64);
        for group in bytes.chunks_exact(4) {
            assert_eq!(group, [1, 2, 3, 255]);
        }
    }

    #[test]
    fn swaps_endianness_of_16_bit_stack() {
        let dir = std::env::temp_dir().join(format!("uvf-assembler-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        // Single voxel, 0x1234 stored big-endian.
        crate::formats::dicom::fixtures::write_native_dicom(&dir.join("slice.dcm"), 1, 1, 16, 1, &[0x12, 0x34]);
        let info = crate::formats::dicom::read_dicom_header(&dir.join("slice.dcm")).unwrap();
        let stack = StackDescriptor {
            elements: vec![StackElement::new(dir.join("slice.dcm"), info.payload_offset)],
            kind: StackKind::Dicom,
            width: 1,
            height: 1,
            bits_allocated: 16,
            bits_stored: 16,
            component_count: 1,
            big_endian: true,
            jpeg_encoded: false,
            aspect: (1.0, 1.0, 1.0),
            description: "endian test".into(),
            modality: "OT".into(),
        };

        let raw_path = dir.join("out.raw");
        assemble_stack(&stack, &raw_path, &crate::progress::NullProgressSink).unwrap();
        let bytes = std::fs::read(&raw_path).unwrap();
        assert_eq!(bytes, vec![0x34, 0x12]);
    }
}
