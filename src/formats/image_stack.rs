//! Generic stacked-2D-image scanning (TIFF/PNG/etc. slices of one logical
//! volume). Per-format image codec internals are out of scope (`spec.md`
//! section 1); decoding is delegated to the `image` crate.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};

use crate::error::InvalidPayload;
use crate::model::{StackDescriptor, StackElement, StackKind};

const IMAGE_EXTENSIONS: &[&str] = &["png", "tif", "tiff", "bmp", "jpg", "jpeg"];

struct ImageGeometry {
    width: u32,
    height: u32,
    bits_allocated: u32,
    component_count: u16,
}

fn geometry_of(image: &DynamicImage) -> ImageGeometry {
    let (width, height) = image.dimensions();
    let (bits_allocated, component_count) = match image {
        DynamicImage::ImageLuma8(_) => (8, 1),
        DynamicImage::ImageLumaA8(_) => (8, 2),
        DynamicImage::ImageRgb8(_) => (8, 3),
        DynamicImage::ImageRgba8(_) => (8, 4),
        DynamicImage::ImageLuma16(_) => (16, 1),
        DynamicImage::ImageRgb16(_) => (16, 3),
        DynamicImage::ImageRgba16(_) => (16, 4),
        _ => (8, 4),
    };
    ImageGeometry {
        width,
        height,
        bits_allocated,
        component_count,
    }
}

/// Raw, native-endian interleaved sample bytes for one decoded image, in the
/// component layout [`geometry_of`] reports.
fn raw_samples(image: &DynamicImage) -> Vec<u8> {
    match image {
        DynamicImage::ImageLuma8(buf) => buf.as_raw().clone(),
        DynamicImage::ImageLumaA8(buf) => buf.as_raw().clone(),
        DynamicImage::ImageRgb8(buf) => buf.as_raw().clone(),
        DynamicImage::ImageRgba8(buf) => buf.as_raw().clone(),
        DynamicImage::ImageLuma16(buf) => buf.as_raw().iter().flat_map(|v| v.to_ne_bytes()).collect(),
        DynamicImage::ImageRgb16(buf) => buf.as_raw().iter().flat_map(|v| v.to_ne_bytes()).collect(),
        DynamicImage::ImageRgba16(buf) => buf.as_raw().iter().flat_map(|v| v.to_ne_bytes()).collect(),
        other => other.to_rgba8().as_raw().clone(),
    }
}

/// Decode one image-stack element into its raw sample bytes.
pub fn decode_image_payload(path: &Path) -> Result<Vec<u8>, InvalidPayload> {
    let image = image::open(path).map_err(|e| InvalidPayload::Jpeg {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(raw_samples(&image))
}

/// Scan a directory of stacked 2D images into [`StackDescriptor`]s, grouped
/// by shared geometry, mirroring [`super::dicom::scan_dicom_directory`].
pub fn scan_image_directory(dir: &Path) -> Result<Vec<StackDescriptor>, InvalidPayload> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| crate::error::IoError::Read {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    let mut groups: Vec<(ImageGeometry, Vec<StackElement>)> = Vec::new();

    for path in entries {
        let image = match image::open(&path) {
            Ok(img) => img,
            Err(_) => continue,
        };
        let geometry = geometry_of(&image);

        let group = groups.iter_mut().find(|(existing, _)| {
            existing.width == geometry.width
                && existing.height == geometry.height
                && existing.bits_allocated == geometry.bits_allocated
                && existing.component_count == geometry.component_count
        });

        let element = StackElement::new(path, 0);
        match group {
            Some((_, elements)) => elements.push(element),
            None => groups.push((geometry, vec![element])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(geometry, elements)| StackDescriptor {
            elements,
            kind: StackKind::Image,
            width: geometry.width,
            height: geometry.height,
            bits_allocated: geometry.bits_allocated,
            bits_stored: geometry.bits_allocated,
            component_count: geometry.component_count,
            big_endian: false,
            jpeg_encoded: false,
            aspect: (1.0, 1.0, 1.0),
            description: "stacked image series".to_string(),
            modality: "OT".to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn scans_directory_of_same_sized_grayscale_images() {
        let dir = std::env::temp_dir().join(format!("uvf-image-stack-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        for i in 0..3 {
            let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_fn(4, 4, |x, y| Luma([(x + y + i) as u8]));
            img.save(dir.join(format!("slice_{i}.png"))).unwrap();
        }

        let stacks = scan_image_directory(&dir).unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].slice_count(), 3);
        assert_eq!(stacks[0].width, 4);
        assert_eq!(stacks[0].height, 4);
        assert_eq!(stacks[0].component_count, 1);
    }

    #[test]
    fn decodes_raw_samples_for_rgb() {
        let dir = std::env::temp_dir().join(format!("uvf-image-stack-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rgb.png");

        let img: ImageBuffer<image::Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        img.save(&path).unwrap();

        let samples = decode_image_payload(&path).unwrap();
        assert_eq!(samples.len(), 2 * 2 * 3);
        assert_eq!(&samples[0..3], &[1, 2, 3]);
    }
}
