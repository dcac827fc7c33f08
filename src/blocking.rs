//! Module that implements the RFC 5052 §9.1 blocking structure: the
//! partition of a transport object into source blocks and encoding symbols.

use std::fmt;

use parking_lot::RwLock;

use crate::common::BlockingError;

/// The live partitioning quantities, replaced as one unit on every length
/// update so that readers always observe a coherent view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    /// Total object length in octets.
    transfer_len: u64,
    /// Number of source symbols in the object (T).
    t: u64,
    /// Number of source blocks (N).
    n: u32,
    /// Number of larger source blocks, indices `0..i` (I).
    i: u32,
    /// Source symbols per larger block (A).
    a: u32,
    /// Source symbols per smaller block (A').
    a_small: u32,
}

impl Geometry {
    /// Full recompute per RFC 5052 §9.1. The first `i` blocks get `a`
    /// source symbols, the rest `a_small`; with a one-octet symbol the
    /// scheme degenerates and both sizes are pinned to B.
    fn recompute(transfer_len: u64, es_len: u16, max_sb_len: u32) -> Geometry {
        let t = transfer_len.div_ceil(es_len as u64);
        let n = t.div_ceil(max_sb_len as u64) as u32;
        if es_len > 1 {
            let a_small = (t / n as u64) as u32;
            let i = (t % n as u64) as u32;
            let a = if i > 0 { a_small + 1 } else { a_small };
            Geometry { transfer_len, t, n, i, a, a_small }
        } else {
            Geometry { transfer_len, t, n, i: 0, a: max_sb_len, a_small: max_sb_len }
        }
    }

    /// Growing-object update: track the new length and block count, treat
    /// every block as large, keep the stored block sizes.
    fn stream_update(self, transfer_len: u64, es_len: u16, max_sb_len: u32) -> Geometry {
        let t = transfer_len.div_ceil(es_len as u64);
        let n = t.div_ceil(max_sb_len as u64) as u32;
        Geometry { transfer_len, t, n, i: n, ..self }
    }
}

/// Partitioning of a transport object into source blocks and encoding
/// symbols, per the RFC 5052 §9.1 asymmetric scheme.
///
/// The configuration (symbol length, block limits) is fixed at
/// construction. The derived geometry can be refreshed with
/// [`update_length`] while other threads keep computing offsets: each
/// arithmetic call reads one coherent snapshot of the live quantities.
///
/// [`update_length`]: BlockingStructure::update_length
#[derive(Debug)]
pub struct BlockingStructure {
    /// Encoding symbol length E in octets.
    es_len: u16,
    /// Maximum number of source symbols per source block (B).
    max_sb_len: u32,
    /// Encoding symbols per group (G). Validated here, consumed by
    /// downstream encoders; the partition arithmetic does not depend on it.
    num_es_per_group: u32,
    /// Maximum number of encoding symbols per block, source plus repair.
    max_num_es: u32,
    geometry: RwLock<Geometry>,
}

impl BlockingStructure {
    /// Creates a blocking structure for an object of `transfer_len` octets.
    ///
    /// # Arguments
    ///
    /// - `transfer_len` - Total object length in octets.
    /// - `max_sb_len` - Maximum source symbols per source block (B).
    /// - `es_len` - Encoding symbol length in octets (E).
    /// - `num_es_per_group` - Encoding symbols per group (G).
    /// - `stream` - When true the object is still growing: every block is
    ///   sized at B symbols and only the length and block count are derived.
    ///
    /// The per-block encoding-symbol budget defaults to B (no repair
    /// symbols); see [`with_max_num_es`](Self::with_max_num_es).
    pub fn new(
        transfer_len: u64,
        max_sb_len: u32,
        es_len: u16,
        num_es_per_group: u32,
        stream: bool,
    ) -> Result<Self, BlockingError> {
        if transfer_len == 0 {
            return Err(BlockingError::ZeroTransferLength);
        }
        if max_sb_len == 0 {
            return Err(BlockingError::ZeroSourceBlockLength);
        }
        if es_len == 0 {
            return Err(BlockingError::ZeroSymbolLength);
        }
        if num_es_per_group == 0 {
            return Err(BlockingError::ZeroSymbolsPerGroup);
        }
        if num_es_per_group > max_sb_len {
            return Err(BlockingError::GroupExceedsBlock { group: num_es_per_group, max_sb_len });
        }
        let geometry = if stream {
            let pinned = Geometry {
                transfer_len,
                t: 0,
                n: 0,
                i: 0,
                a: max_sb_len,
                a_small: max_sb_len,
            };
            pinned.stream_update(transfer_len, es_len, max_sb_len)
        } else {
            Geometry::recompute(transfer_len, es_len, max_sb_len)
        };
        Ok(Self {
            es_len,
            max_sb_len,
            num_es_per_group,
            max_num_es: max_sb_len,
            geometry: RwLock::new(geometry),
        })
    }

    /// Overrides the per-block encoding-symbol budget; the symbols beyond B
    /// form the block's repair area.
    pub fn with_max_num_es(mut self, max_num_es: u32) -> Result<Self, BlockingError> {
        if max_num_es < self.max_sb_len {
            return Err(BlockingError::MaxSymbolsBelowBlock {
                max_num_es,
                max_sb_len: self.max_sb_len,
            });
        }
        self.max_num_es = max_num_es;
        Ok(self)
    }

    /// Refreshes the geometry for a new object length. In stream mode only
    /// the length, symbol count, and block count are recomputed, with every
    /// block treated as large; otherwise the full partition is rederived.
    pub fn update_length(&self, transfer_len: u64, stream: bool) -> Result<(), BlockingError> {
        if transfer_len == 0 {
            return Err(BlockingError::ZeroTransferLength);
        }
        let mut geometry = self.geometry.write();
        *geometry = if stream {
            geometry.stream_update(transfer_len, self.es_len, self.max_sb_len)
        } else {
            Geometry::recompute(transfer_len, self.es_len, self.max_sb_len)
        };
        Ok(())
    }

    /// Runs the full recompute once the final length of a streamed object is
    /// known. Until then the last block of a streamed object is reported at
    /// the full B symbols.
    pub fn finalize(&self, transfer_len: u64) -> Result<(), BlockingError> {
        self.update_length(transfer_len, false)
    }

    fn snapshot(&self) -> Geometry {
        *self.geometry.read()
    }

    /// Number of source symbols in block `sbn`; the final block is clipped
    /// to the symbols the object actually fills. Zero for out-of-range
    /// blocks.
    pub fn num_src_sym(&self, sbn: u32) -> u32 {
        let g = self.snapshot();
        self.num_src_sym_in(&g, sbn)
    }

    fn num_src_sym_in(&self, g: &Geometry, sbn: u32) -> u32 {
        if sbn >= g.n {
            return 0;
        }
        let mut num = if sbn < g.i { g.a } else { g.a_small };
        if sbn == g.n - 1 {
            let offset = self.src_offset_in(g, sbn);
            let end = offset + self.es_len as u64 * num as u64;
            if end > g.transfer_len {
                num = (g.transfer_len - offset).div_ceil(self.es_len as u64) as u32;
            }
        }
        num
    }

    /// Byte offset of source block `sbn` within the object; saturates to the
    /// transfer length for out-of-range blocks.
    pub fn src_offset(&self, sbn: u32) -> u64 {
        let g = self.snapshot();
        self.src_offset_in(&g, sbn)
    }

    fn src_offset_in(&self, g: &Geometry, sbn: u32) -> u64 {
        let e = self.es_len as u64;
        if sbn >= g.n {
            g.transfer_len
        } else if sbn < g.i {
            e * g.a as u64 * sbn as u64
        } else {
            e * (g.i as u64 * g.a as u64 + (sbn - g.i) as u64 * g.a_small as u64)
        }
    }

    /// Byte size of source block `sbn`; the final block absorbs the tail of
    /// the object. Zero for out-of-range blocks.
    pub fn src_block_size(&self, sbn: u32) -> u64 {
        let g = self.snapshot();
        let e = self.es_len as u64;
        if g.n > 0 && sbn == g.n - 1 {
            g.transfer_len - self.src_offset_in(&g, sbn)
        } else if sbn < g.i {
            e * g.a as u64
        } else if sbn < g.n {
            e * g.a_small as u64
        } else {
            0
        }
    }

    /// Source block containing the given byte offset, clamped to the last
    /// block.
    pub fn source_sbn(&self, offset: u64) -> u32 {
        let g = self.snapshot();
        let mut sym = offset / self.es_len as u64;
        let large = g.a as u64 * g.i as u64;
        let sbn = if sym < large {
            sym / g.a as u64
        } else {
            sym -= large;
            g.i as u64 + sym / g.a_small as u64
        };
        if sbn < g.n as u64 {
            sbn as u32
        } else {
            g.n - 1
        }
    }

    /// Byte size of one block's repair symbols laid out contiguously.
    #[inline]
    pub fn rpr_block_size(&self) -> u64 {
        (self.max_num_es as u64 - self.max_sb_len as u64) * self.es_len as u64
    }

    /// Byte offset of block `sbn` within the repair area; block numbers
    /// beyond N are clamped.
    pub fn rpr_offset(&self, sbn: u32) -> u64 {
        let n = self.snapshot().n;
        self.rpr_block_size() * sbn.min(n) as u64
    }

    /// Block whose repair area contains the given byte offset. Zero when the
    /// structure carries no repair symbols.
    pub fn repair_sbn(&self, offset: u64) -> u32 {
        let size = self.rpr_block_size();
        if size == 0 {
            return 0;
        }
        (offset / size) as u32
    }

    /// Encoding symbol length E in octets.
    #[inline]
    pub fn es_len(&self) -> u16 {
        self.es_len
    }

    /// Maximum source symbols per source block (B).
    #[inline]
    pub fn max_sb_len(&self) -> u32 {
        self.max_sb_len
    }

    /// Encoding symbols per group (G).
    #[inline]
    pub fn num_es_per_group(&self) -> u32 {
        self.num_es_per_group
    }

    /// Maximum encoding symbols per block, source plus repair.
    #[inline]
    pub fn max_num_es(&self) -> u32 {
        self.max_num_es
    }

    /// Total object length in octets.
    pub fn transfer_len(&self) -> u64 {
        self.snapshot().transfer_len
    }

    /// Number of source symbols in the object (T).
    pub fn num_symbols(&self) -> u64 {
        self.snapshot().t
    }

    /// Number of source blocks (N).
    pub fn num_blocks(&self) -> u32 {
        self.snapshot().n
    }

    /// Number of larger source blocks (I).
    pub fn num_large_blocks(&self) -> u32 {
        self.snapshot().i
    }

    /// Source symbols per larger block (A).
    pub fn large_block_len(&self) -> u32 {
        self.snapshot().a
    }

    /// Source symbols per smaller block (A').
    pub fn small_block_len(&self) -> u32 {
        self.snapshot().a_small
    }
}

impl fmt::Display for BlockingStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.snapshot();
        write!(
            f,
            "len={},N={},esLen={},maxSb={}",
            g.transfer_len, g.n, self.es_len, self.max_sb_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derivation() {
        let bs = BlockingStructure::new(107_374_182, 10, 1430, 1, false)
            .unwrap()
            .with_max_num_es(12)
            .unwrap();
        assert_eq!(bs.num_symbols(), 75_087);
        assert_eq!(bs.num_blocks(), 7509);
        assert_eq!(bs.num_large_blocks(), 7506);
        assert_eq!(bs.large_block_len(), 10);
        assert_eq!(bs.small_block_len(), 9);
        assert_eq!(bs.to_string(), "len=107374182,N=7509,esLen=1430,maxSb=10");
    }

    #[test]
    fn validation() {
        assert_eq!(
            BlockingStructure::new(0, 10, 1430, 1, false).unwrap_err(),
            BlockingError::ZeroTransferLength
        );
        assert_eq!(
            BlockingStructure::new(1000, 0, 1430, 1, false).unwrap_err(),
            BlockingError::ZeroSourceBlockLength
        );
        assert_eq!(
            BlockingStructure::new(1000, 10, 0, 1, false).unwrap_err(),
            BlockingError::ZeroSymbolLength
        );
        assert_eq!(
            BlockingStructure::new(1000, 10, 1430, 0, false).unwrap_err(),
            BlockingError::ZeroSymbolsPerGroup
        );
        assert_eq!(
            BlockingStructure::new(1000, 10, 1430, 11, false).unwrap_err(),
            BlockingError::GroupExceedsBlock { group: 11, max_sb_len: 10 }
        );
        assert_eq!(
            BlockingStructure::new(1000, 10, 1430, 1, false)
                .unwrap()
                .with_max_num_es(9)
                .unwrap_err(),
            BlockingError::MaxSymbolsBelowBlock { max_num_es: 9, max_sb_len: 10 }
        );
    }

    #[test]
    fn single_octet_symbols_pin_block_sizes() {
        let bs = BlockingStructure::new(1000, 64, 1, 1, false).unwrap();
        assert_eq!(bs.num_symbols(), 1000);
        assert_eq!(bs.num_blocks(), 16);
        assert_eq!(bs.large_block_len(), 64);
        assert_eq!(bs.small_block_len(), 64);
    }

    #[test]
    fn offsets_cover_object() {
        let bs = BlockingStructure::new(107_374_182, 10, 1430, 1, false).unwrap();
        let n = bs.num_blocks();
        let mut total = 0;
        for sbn in 0..n {
            assert_eq!(bs.src_offset(sbn), total, "sbn {sbn}");
            assert_eq!(bs.source_sbn(bs.src_offset(sbn)), sbn, "sbn {sbn}");
            total += bs.src_block_size(sbn);
        }
        assert_eq!(total, bs.transfer_len());
        assert_eq!(bs.src_offset(n), bs.transfer_len());
        assert_eq!(bs.src_block_size(n), 0);
        assert_eq!(bs.num_src_sym(n), 0);
    }

    #[test]
    fn final_block_is_clipped() {
        // 13 symbols of 100 octets, last one short: 3 blocks of 5/4/4
        let bs = BlockingStructure::new(1250, 5, 100, 1, false).unwrap();
        assert_eq!(bs.num_symbols(), 13);
        assert_eq!(bs.num_blocks(), 3);
        assert_eq!(bs.num_large_blocks(), 1);
        assert_eq!(bs.num_src_sym(0), 5);
        assert_eq!(bs.num_src_sym(1), 4);
        assert_eq!(bs.num_src_sym(2), 4);
        assert_eq!(bs.src_block_size(2), 1250 - bs.src_offset(2));
    }

    #[test]
    fn repair_layout() {
        let bs = BlockingStructure::new(107_374_182, 10, 1430, 1, false)
            .unwrap()
            .with_max_num_es(12)
            .unwrap();
        assert_eq!(bs.rpr_block_size(), 2860);
        assert_eq!(bs.rpr_offset(0), 0);
        assert_eq!(bs.rpr_offset(3), 8580);
        assert_eq!(bs.repair_sbn(2859), 0);
        assert_eq!(bs.repair_sbn(2860), 1);
        // clamp beyond the block count
        assert_eq!(bs.rpr_offset(u32::MAX), 2860 * 7509);

        let plain = BlockingStructure::new(1000, 10, 100, 1, false).unwrap();
        assert_eq!(plain.rpr_block_size(), 0);
        assert_eq!(plain.repair_sbn(12345), 0);
    }

    #[test]
    fn stream_mode_and_finalize() {
        let bs = BlockingStructure::new(1_000_000, 10, 1430, 1, true).unwrap();
        assert_eq!(bs.num_blocks(), 70);
        assert_eq!(bs.num_large_blocks(), bs.num_blocks());
        assert_eq!(bs.large_block_len(), 10);
        assert_eq!(bs.small_block_len(), 10);

        bs.update_length(2_000_000, true).unwrap();
        assert_eq!(bs.transfer_len(), 2_000_000);
        assert_eq!(bs.num_blocks(), 140);
        assert_eq!(bs.num_large_blocks(), 140);
        assert_eq!(bs.small_block_len(), 10);

        bs.finalize(2_000_000).unwrap();
        let expected = Geometry::recompute(2_000_000, 1430, 10);
        assert_eq!(bs.num_blocks(), expected.n);
        assert_eq!(bs.num_large_blocks(), expected.i);
        assert_eq!(bs.large_block_len(), expected.a);
        assert_eq!(bs.small_block_len(), expected.a_small);

        assert_eq!(bs.update_length(0, true).unwrap_err(), BlockingError::ZeroTransferLength);
    }

    proptest! {
        #[test]
        fn partition_invariants(
            transfer_len in 1u64..100_000,
            es_len in 16u16..2048,
            max_sb_len in 4u32..64,
        ) {
            let bs = BlockingStructure::new(transfer_len, max_sb_len, es_len, 1, false).unwrap();
            let n = bs.num_blocks();
            prop_assert!(bs.large_block_len() - bs.small_block_len() <= 1);
            prop_assert!(bs.large_block_len() <= max_sb_len);

            let mut total = 0;
            for sbn in 0..n {
                prop_assert_eq!(bs.src_offset(sbn), total);
                prop_assert_eq!(bs.source_sbn(bs.src_offset(sbn)), sbn);
                let num = bs.num_src_sym(sbn);
                prop_assert!(num > 0);
                let size = bs.src_block_size(sbn);
                prop_assert!(size <= es_len as u64 * num as u64);
                prop_assert!(size > es_len as u64 * (num as u64 - 1));
                total += size;
            }
            prop_assert_eq!(total, transfer_len);
        }
    }
}
