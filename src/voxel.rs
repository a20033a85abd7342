//! The tagged voxel-type variant used everywhere the source system would
//! have used a template over scalar types (`spec.md` section 9).
//!
//! Dispatch is centralized through [`VoxelType::dispatch`] and the
//! [`dispatch_voxel_type!`] macro so that every type-generic algorithm in the
//! crate (min/max, histograms, merge, marching cubes, expression evaluation)
//! exhaustively handles the same ten cases and surfaces
//! `UnsupportedType` rather than silently miscomputing.

use std::fmt;

/// Tagged scalar voxel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoxelType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl VoxelType {
    /// Size of one component in bytes.
    pub const fn size_bytes(&self) -> usize {
        match self {
            VoxelType::I8 | VoxelType::U8 => 1,
            VoxelType::I16 | VoxelType::U16 => 2,
            VoxelType::I32 | VoxelType::U32 | VoxelType::F32 => 4,
            VoxelType::I64 | VoxelType::U64 | VoxelType::F64 => 8,
        }
    }

    /// Bit width of one component.
    pub const fn bits(&self) -> u32 {
        self.size_bytes() as u32 * 8
    }

    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            VoxelType::I8 | VoxelType::I16 | VoxelType::I32 | VoxelType::I64 | VoxelType::F32 | VoxelType::F64
        )
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, VoxelType::F32 | VoxelType::F64)
    }

    /// Construct from (bit width, signed, float), the fields carried on
    /// [`crate::model::VolumeMeta`]. Returns `None` for combinations with no
    /// representation (e.g. a signed-false float, or a 64-bit float with
    /// `is_signed = false`).
    pub fn from_meta(bits: u32, is_signed: bool, is_float: bool) -> Option<VoxelType> {
        Some(match (bits, is_signed, is_float) {
            (8, false, false) => VoxelType::U8,
            (8, true, false) => VoxelType::I8,
            (16, false, false) => VoxelType::U16,
            (16, true, false) => VoxelType::I16,
            (32, false, false) => VoxelType::U32,
            (32, true, false) => VoxelType::I32,
            (64, false, false) => VoxelType::U64,
            (64, true, false) => VoxelType::I64,
            (32, true, true) => VoxelType::F32,
            (64, true, true) => VoxelType::F64,
            _ => return None,
        })
    }

    /// Componentwise-widest type across a slice, per `spec.md` section 4.6
    /// point 3: max bit-width, OR'd float-ness, OR'd signedness.
    pub fn widest(types: &[VoxelType]) -> Option<VoxelType> {
        let mut iter = types.iter().copied();
        let first = iter.next()?;
        let (mut bits, mut is_signed, mut is_float) = (first.bits(), first.is_signed(), first.is_float());
        for t in iter {
            bits = bits.max(t.bits());
            is_signed |= t.is_signed();
            is_float |= t.is_float();
        }
        // Floats only exist at 32/64 bits; widening a float mix to 16 can't
        // happen because is_float forces bits to have come from a 32/64 type.
        VoxelType::from_meta(bits, is_signed, is_float)
    }
}

impl fmt::Display for VoxelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoxelType::I8 => "i8",
            VoxelType::U8 => "u8",
            VoxelType::I16 => "i16",
            VoxelType::U16 => "u16",
            VoxelType::I32 => "i32",
            VoxelType::U32 => "u32",
            VoxelType::I64 => "i64",
            VoxelType::U64 => "u64",
            VoxelType::F32 => "f32",
            VoxelType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Read one voxel component out of a little-endian-native byte slice as an
/// `f64`, widening every representation to a common comparable value. Used
/// by min/max and histogram code, which only need ordering and arithmetic,
/// not the original bit pattern.
pub fn read_component_as_f64(bytes: &[u8], ty: VoxelType) -> f64 {
    match ty {
        VoxelType::I8 => bytes[0] as i8 as f64,
        VoxelType::U8 => bytes[0] as f64,
        VoxelType::I16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
        VoxelType::U16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as f64,
        VoxelType::I32 => i32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as f64,
        VoxelType::U32 => u32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as f64,
        VoxelType::I64 => i64::from_ne_bytes(bytes[0..8].try_into().unwrap()) as f64,
        VoxelType::U64 => u64::from_ne_bytes(bytes[0..8].try_into().unwrap()) as f64,
        VoxelType::F32 => f32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as f64,
        VoxelType::F64 => f64::from_ne_bytes(bytes[0..8].try_into().unwrap()),
    }
}

/// Write an `f64` back into native-endian bytes of the given type, clamping
/// to the representable range of integer types (used when rescaling voxels
/// into a wider destination type, `spec.md` section 4.6 point 4).
pub fn write_component_from_f64(value: f64, ty: VoxelType, out: &mut [u8]) {
    match ty {
        VoxelType::I8 => out[0] = value.clamp(i8::MIN as f64, i8::MAX as f64) as i8 as u8,
        VoxelType::U8 => out[0] = value.clamp(0.0, u8::MAX as f64) as u8,
        VoxelType::I16 => out[0..2].copy_from_slice(&(value.clamp(i16::MIN as f64, i16::MAX as f64) as i16).to_ne_bytes()),
        VoxelType::U16 => out[0..2].copy_from_slice(&(value.clamp(0.0, u16::MAX as f64) as u16).to_ne_bytes()),
        VoxelType::I32 => out[0..4].copy_from_slice(&(value.clamp(i32::MIN as f64, i32::MAX as f64) as i32).to_ne_bytes()),
        VoxelType::U32 => out[0..4].copy_from_slice(&(value.clamp(0.0, u32::MAX as f64) as u32).to_ne_bytes()),
        VoxelType::I64 => out[0..8].copy_from_slice(&(value.clamp(i64::MIN as f64, i64::MAX as f64) as i64).to_ne_bytes()),
        VoxelType::U64 => out[0..8].copy_from_slice(&(value.clamp(0.0, u64::MAX as f64) as u64).to_ne_bytes()),
        VoxelType::F32 => out[0..4].copy_from_slice(&(value as f32).to_ne_bytes()),
        VoxelType::F64 => out[0..8].copy_from_slice(&value.to_ne_bytes()),
    }
}

/// The full representable range of a type, as `(min, max)` in `f64`. Used to
/// rescale a narrower input's dynamic range onto a wider destination type's
/// full range, per `spec.md` section 4.6 point 4.
pub fn full_range(ty: VoxelType) -> (f64, f64) {
    match ty {
        VoxelType::I8 => (i8::MIN as f64, i8::MAX as f64),
        VoxelType::U8 => (0.0, u8::MAX as f64),
        VoxelType::I16 => (i16::MIN as f64, i16::MAX as f64),
        VoxelType::U16 => (0.0, u16::MAX as f64),
        VoxelType::I32 => (i32::MIN as f64, i32::MAX as f64),
        VoxelType::U32 => (0.0, u32::MAX as f64),
        VoxelType::I64 => (i64::MIN as f64, i64::MAX as f64),
        VoxelType::U64 => (0.0, u64::MAX as f64),
        VoxelType::F32 => (f32::MIN as f64, f32::MAX as f64),
        VoxelType::F64 => (f64::MIN, f64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_meta_round_trips_common_types() {
        assert_eq!(VoxelType::from_meta(8, false, false), Some(VoxelType::U8));
        assert_eq!(VoxelType::from_meta(16, true, false), Some(VoxelType::I16));
        assert_eq!(VoxelType::from_meta(32, true, true), Some(VoxelType::F32));
        assert_eq!(VoxelType::from_meta(64, true, true), Some(VoxelType::F64));
    }

    #[test]
    fn from_meta_rejects_invalid_float_width() {
        assert_eq!(VoxelType::from_meta(16, true, true), None);
    }

    #[test]
    fn widest_takes_componentwise_max() {
        let widest = VoxelType::widest(&[VoxelType::U8, VoxelType::I16]).unwrap();
        assert_eq!(widest, VoxelType::I16);

        let widest = VoxelType::widest(&[VoxelType::U8, VoxelType::F32]).unwrap();
        assert_eq!(widest, VoxelType::F32);
    }

    #[test]
    fn component_round_trip() {
        let mut buf = [0u8; 8];
        write_component_from_f64(1234.5, VoxelType::F64, &mut buf);
        assert_eq!(read_component_as_f64(&buf, VoxelType::F64), 1234.5);
    }

    #[test]
    fn component_write_clamps_integers() {
        let mut buf = [0u8; 2];
        write_component_from_f64(-10.0, VoxelType::U16, &mut buf);
        assert_eq!(read_component_as_f64(&buf, VoxelType::U16), 0.0);

        write_component_from_f64(1e9, VoxelType::U16, &mut buf);
        assert_eq!(read_component_as_f64(&buf, VoxelType::U16), u16::MAX as f64);
    }
}
