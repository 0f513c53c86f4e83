//! Channel masks telling a fixture which channels hold a cell.

/// Pack per-channel presence flags into 32-bit words, channel 0 in bit 0.
///
/// A partial final word is kept, so 33 channels produce two words.
pub fn cell_mask(present: &[bool]) -> Vec<u32> {
    let mut mask = vec![0u32; present.len().div_ceil(32)];
    for (i, _) in present.iter().enumerate().filter(|(_, p)| **p) {
        mask[i / 32] |= 1 << (i % 32);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty() {
        assert!(cell_mask(&[]).is_empty());
    }

    #[test]
    fn test_bit_positions() {
        let mut present = vec![false; 64];
        present[0] = true;
        present[31] = true;
        present[33] = true;
        assert_eq!(cell_mask(&present), vec![0x8000_0001, 0x0000_0002]);
    }

    #[test]
    fn test_partial_word_kept() {
        let mut present = vec![true; 33];
        present[1] = false;
        assert_eq!(cell_mask(&present), vec![0xFFFF_FFFD, 0x1]);
    }

    proptest! {
        #[test]
        fn test_popcount_matches_present(
            present in proptest::collection::vec(any::<bool>(), 0..200)
        ) {
            let mask = cell_mask(&present);
            prop_assert_eq!(mask.len(), present.len().div_ceil(32));
            let bits: u32 = mask.iter().map(|w| w.count_ones()).sum();
            prop_assert_eq!(bits as usize, present.iter().filter(|p| **p).count());
        }
    }
}
