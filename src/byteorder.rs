//! Endianness normalization for raw voxel streams.
//!
//! `spec.md` section 4.2: byte-swap a stack's payload when its endianness
//! differs from the host. Unlike a TIFF tag reader that pulls individual
//! scalar fields out of a byte order it already knows, this operates in
//! bulk over whole voxel component streams.

/// Swap every `component_bytes`-wide group in `data` in place. `data.len()`
/// must be a multiple of `component_bytes`; 1-byte components are a no-op.
pub fn swap_components_in_place(data: &mut [u8], component_bytes: usize) {
    if component_bytes <= 1 {
        return;
    }
    debug_assert_eq!(data.len() % component_bytes, 0);
    for chunk in data.chunks_exact_mut(component_bytes) {
        chunk.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_16_bit_components() {
        // 0x1234 big-endian -> 0x3412 on swap.
        let mut data = [0x12, 0x34];
        swap_components_in_place(&mut data, 2);
        assert_eq!(data, [0x34, 0x12]);
    }

    #[test]
    fn swaps_multiple_components_independently() {
        let mut data = [0x12, 0x34, 0xAB, 0xCD];
        swap_components_in_place(&mut data, 2);
        assert_eq!(data, [0x34, 0x12, 0xCD, 0xAB]);
    }

    #[test]
    fn single_byte_components_are_untouched() {
        let mut data = [1, 2, 3, 4];
        swap_components_in_place(&mut data, 1);
        assert_eq!(data, [1, 2, 3, 4]);
    }

    #[test]
    fn swaps_32_bit_components() {
        let mut data = [0x01, 0x02, 0x03, 0x04];
        swap_components_in_place(&mut data, 4);
        assert_eq!(data, [0x04, 0x03, 0x02, 0x01]);
    }
}
