//! `scan_directory` (`spec.md` section 4.2 point 1).

use std::path::Path;

use crate::error::PipelineError;
use crate::formats;
use crate::model::{StackDescriptor, StackKind};
use crate::progress::{ProgressSink, Severity};

/// Scan `dir` for DICOM series and stacked image series, then drop any
/// JPEG-encoded DICOM stack containing an element that fails to decode.
/// `spec.md` section 4.2 point 1: "a stack with missing slices has no
/// meaningful geometry" -- an invalid element drops the whole stack, not
/// just that element.
pub fn scan_directory(dir: &Path, sink: &dyn ProgressSink) -> Result<Vec<StackDescriptor>, PipelineError> {
    let mut stacks = formats::scan_source_directory(dir)?;

    stacks.retain(|stack| {
        if stack.kind != StackKind::Dicom || !stack.jpeg_encoded {
            return true;
        }
        for element in &stack.elements {
            if let Err(e) = formats::decode_element_payload(stack, element) {
                sink.notify(
                    Severity::Warning,
                    &format!("dropping stack ({}): invalid JPEG element '{}': {e}", stack.description, element.path.display()),
                );
                return false;
            }
        }
        true
    });

    Ok(stacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::dicom::fixtures::write_native_dicom;
    use crate::progress::NullProgressSink;
    use image::{ImageBuffer, Luma};

    #[test]
    fn scans_mixed_dicom_and_image_directory_into_separate_stacks() {
        let dir = std::env::temp_dir().join(format!("uvf-scan-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        for i in 0..20 {
            write_native_dicom(&dir.join(format!("series_a_{i:02}.dcm")), 4, 4, 8, 1, &[i as u8; 16]);
        }
        for i in 0..30 {
            write_native_dicom(&dir.join(format!("series_b_{i:02}.dcm")), 8, 8, 16, 1, &[0u8; 128]);
        }
        for i in 0..15 {
            let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 4, Luma([i as u8]));
            img.save(dir.join(format!("tiff_{i:02}.png"))).unwrap();
        }

        let stacks = scan_directory(&dir, &NullProgressSink).unwrap();
        let mut counts: Vec<usize> = stacks.iter().map(|s| s.slice_count()).collect();
        counts.sort();
        assert_eq!(counts, vec![15, 20, 30]);
    }
}
