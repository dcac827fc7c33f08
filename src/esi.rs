//! Module that implements per-block encoding-symbol ranges and their
//! projections to and from byte ranges of the object.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use crate::blocking::BlockingStructure;
use crate::common::{FecError, ParseError};
use crate::primitives::{Range, RangeList};

/// A sparse mapping from source block number to the encoding symbols of
/// interest within that block.
///
/// An entry with an empty range list stands for the whole block, every
/// source symbol of that SBN; absent keys mean nothing for that block.
/// Source symbols occupy indices `0..k`, repair symbols `k..` where `k` is
/// the block's source symbol count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ESIRange(BTreeMap<u32, RangeList>);

impl ESIRange {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Number of blocks with an entry.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no block has an entry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sets the ranges for one block; an empty list selects the whole
    /// block.
    pub fn insert(&mut self, sbn: u32, ranges: RangeList) -> Option<RangeList> {
        self.0.insert(sbn, ranges)
    }

    /// The ranges recorded for `sbn`, if any.
    pub fn get(&self, sbn: u32) -> Option<&RangeList> {
        self.0.get(&sbn)
    }

    /// Removes the entry for `sbn`.
    pub fn remove(&mut self, sbn: u32) -> Option<RangeList> {
        self.0.remove(&sbn)
    }

    /// Iterates over the entries in ascending block order.
    pub fn iter(&self) -> btree_map::Iter<'_, u32, RangeList> {
        self.0.iter()
    }

    /// Total number of symbols covered, expanding whole-block entries via
    /// the blocking structure.
    pub fn count(&self, bs: &BlockingStructure) -> i64 {
        self.0
            .iter()
            .map(|(&sbn, ranges)| {
                if ranges.is_empty() {
                    bs.num_src_sym(sbn) as i64
                } else {
                    ranges.count()
                }
            })
            .sum()
    }

    /// Projects a byte range list into per-block symbol ranges.
    ///
    /// With `source` the offsets address the source area of the object and
    /// the symbol of a partially covered leading byte is included; with
    /// `source` false the offsets address the per-block repair area and the
    /// resulting indices are shifted up by the block's source symbol count.
    /// A trailing partial symbol is included iff `inclusive`.
    pub fn from_range_list(
        bs: &BlockingStructure,
        ranges: &RangeList,
        source: bool,
        inclusive: bool,
    ) -> Result<ESIRange, FecError> {
        let e = bs.es_len() as i64;
        if !source && bs.rpr_block_size() == 0 {
            return Ok(ESIRange::new());
        }
        let mut blocks: BTreeMap<u32, Vec<Range>> = BTreeMap::new();
        for r in ranges {
            if r.start > r.end {
                return Err(FecError::UnsortedRangeList(ranges.to_string()));
            }
            let (sbn_start, sbn_end) = if source {
                (bs.source_sbn(r.start as u64), bs.source_sbn(r.end as u64))
            } else {
                (bs.repair_sbn(r.start as u64), bs.repair_sbn(r.end as u64))
            };
            for sbn in sbn_start..=sbn_end {
                let (block_start, block_end) = if source {
                    (bs.src_offset(sbn) as i64, bs.src_offset(sbn + 1) as i64 - 1)
                } else {
                    (bs.rpr_offset(sbn) as i64, bs.rpr_offset(sbn + 1) as i64 - 1)
                };
                let start_offset = r.start.max(block_start) - block_start;
                let mut esi_start = start_offset / e;
                let end_offset = r.end.min(block_end) - block_start;
                let len = end_offset - start_offset + 1;
                let mut esi_end = esi_start + len / e - 1;
                if len % e != 0 && inclusive {
                    esi_end += 1;
                }
                if esi_end < esi_start {
                    continue;
                }
                if !source {
                    let k = bs.num_src_sym(sbn) as i64;
                    esi_start += k;
                    esi_end += k;
                }
                blocks.entry(sbn).or_default().push(Range::new(esi_start, esi_end));
            }
        }
        Ok(ESIRange(
            blocks
                .into_iter()
                .map(|(sbn, entries)| (sbn, RangeList::canonical(entries)))
                .collect(),
        ))
    }

    /// Projects the slice of a byte range list that falls into block `sbn`
    /// onto that block's source symbol indices.
    ///
    /// A partially covered leading byte rounds up to the next symbol and a
    /// partially covered trailing byte rounds down, except for the very
    /// last byte of the transfer, whose (short) final symbol is included.
    pub fn es_range_list_for_sbn(
        bs: &BlockingStructure,
        sbn: u32,
        ranges: &RangeList,
    ) -> Result<RangeList, FecError> {
        let e = bs.es_len() as i64;
        let num_sym = bs.num_src_sym(sbn) as i64;
        let offset = bs.src_offset(sbn) as i64;
        let size = bs.src_block_size(sbn) as i64;
        if size == 0 || num_sym == 0 {
            return Ok(RangeList::new());
        }
        let span = RangeList::from(vec![Range::new(offset, offset + size - 1)]);
        let within = ranges.intersection(&span);
        let last_byte = bs.transfer_len() as i64 - 1;
        let mut out = RangeList::new();
        for r in &within {
            let rel_start = r.start - offset;
            let esi_start = rel_start / e + i64::from(rel_start % e != 0);
            let rel_end = r.end - offset;
            let mut esi_end = (rel_end + 1) / e - 1;
            if (rel_end + 1) % e != 0 && r.end == last_byte {
                esi_end += 1;
            }
            let esi_end = esi_end.min(num_sym - 1);
            if esi_end < esi_start {
                continue;
            }
            out.inplace_union(&RangeList::from(vec![Range::new(esi_start, esi_end)]));
        }
        Ok(out)
    }

    /// Expands the symbol ranges back into byte ranges of the object
    /// (`source`) or of the per-block repair area.
    ///
    /// Whole-block entries expand to the block's full byte span. In repair
    /// mode the indices shift down by the block's source symbol count;
    /// spans reaching below the repair area are clamped and spans entirely
    /// within the source symbols are dropped.
    pub fn to_range_list(&self, bs: &BlockingStructure, source: bool) -> RangeList {
        let e = bs.es_len() as i64;
        let mut out = Vec::with_capacity(self.0.len());
        for (&sbn, ranges) in &self.0 {
            let (offset, block_size) = if source {
                (bs.src_offset(sbn) as i64, bs.src_block_size(sbn) as i64)
            } else {
                (bs.rpr_offset(sbn) as i64, bs.rpr_block_size() as i64)
            };
            if ranges.is_empty() {
                out.push(Range::new(offset, offset + block_size - 1));
                continue;
            }
            let k = bs.num_src_sym(sbn) as i64;
            for r in ranges {
                let mut esi_start = r.start;
                let mut esi_end = r.end + 1;
                if !source {
                    esi_start -= k;
                    esi_end -= k;
                    if esi_end <= 0 {
                        continue;
                    }
                    if esi_start < 0 {
                        esi_start = 0;
                    }
                }
                out.push(Range::new(offset + esi_start * e, offset + esi_end * e - 1));
            }
        }
        RangeList::canonical(out)
    }

    /// Computes the symbols still needed to repair each block.
    ///
    /// With an MDS scheme, `m` missing source symbols of a block are
    /// recoverable from any `m` symbols of that block, so a block needs
    /// `m - r` more symbols given `r` repair symbols in hand: the whole
    /// block when nothing of it was received, the first `m - r` missing
    /// indices when the repair symbols fall short, nothing otherwise.
    pub fn missing_esis(
        src_missing: &ESIRange,
        rpr_has: &ESIRange,
        bs: &BlockingStructure,
    ) -> ESIRange {
        let mut result = ESIRange::new();
        for (&sbn, missing) in &src_missing.0 {
            let missing_count = missing.count();
            let repairable_count = rpr_has.get(sbn).map_or(0, RangeList::count);
            let sym_per_block = bs.num_src_sym(sbn) as i64;
            if missing_count == sym_per_block && repairable_count == 0 {
                result.insert(sbn, RangeList::from(vec![Range::new(0, sym_per_block - 1)]));
            } else if missing_count > repairable_count {
                let mut remaining = missing_count - repairable_count;
                let mut head = Vec::new();
                for r in missing {
                    let take = remaining.min(r.count());
                    head.push(Range::new(r.start, r.start + take - 1));
                    remaining -= take;
                    if remaining == 0 {
                        break;
                    }
                }
                result.insert(sbn, RangeList::canonical(head));
            }
        }
        result
    }

    /// Parses the 3GPP MBMS byte-range query form: percent-encoded or
    /// literal `SourceSBN=<sbn>[;ESI=<list>]` tuples joined by `&`. The
    /// block number may be a `start-end` run of whole blocks, and the list
    /// accepts the `a+n` count form meaning `[a, a+n]`.
    pub fn from_mbms_query(query: &str) -> Result<ESIRange, ParseError> {
        let decoded = percent_decode_str(query)
            .decode_utf8()
            .map_err(|_| ParseError::InvalidMbmsTuple(query.to_string()))?;
        let sbn_number =
            |t: &str| t.parse::<u32>().map_err(|_| ParseError::InvalidSbn(t.to_string()));
        let mut out = ESIRange::new();
        for tuple in decoded.split('&').filter(|t| !t.is_empty()) {
            let body = tuple
                .strip_prefix("SourceSBN=")
                .ok_or_else(|| ParseError::InvalidMbmsTuple(tuple.to_string()))?;
            match body.split_once(';') {
                None => {
                    if let Some((start, end)) = body.split_once('-') {
                        let (start, end) = (sbn_number(start)?, sbn_number(end)?);
                        for sbn in start..=end {
                            out.insert(sbn, RangeList::new());
                        }
                    } else {
                        out.insert(sbn_number(body)?, RangeList::new());
                    }
                }
                Some((sbn, list)) => {
                    let list = list
                        .strip_prefix("ESI=")
                        .or_else(|| list.strip_prefix("esi="))
                        .ok_or_else(|| ParseError::InvalidMbmsTuple(tuple.to_string()))?;
                    let sbn = sbn_number(sbn)?;
                    let mut entries = Vec::new();
                    for token in list.split(',') {
                        entries.push(parse_esi_token(token)?);
                    }
                    out.insert(sbn, RangeList::canonical(entries));
                }
            }
        }
        Ok(out)
    }

    /// Emits the raw MBMS query form: `SourceSBN=` tuples joined by
    /// `&SourceSBN=`, with the list separator written as `%3bESI=`.
    pub fn to_mbms_raw_query(&self) -> String {
        let text = self.to_string();
        if text.is_empty() {
            return text;
        }
        let text = text.replace(';', "&SourceSBN=").replace(':', "%3bESI=");
        format!("SourceSBN={text}")
    }
}

/// Parses one MBMS ESI list token: `a`, `a-b`, or the count form `a+n`.
fn parse_esi_token(token: &str) -> Result<Range, ParseError> {
    if let Some((start, count)) = token.split_once('+') {
        let number =
            |t: &str| t.parse::<i64>().map_err(|_| ParseError::InvalidRange(token.to_string()));
        let start = number(start)?;
        Ok(Range::new(start, start + number(count)?))
    } else {
        token.parse()
    }
}

impl From<BTreeMap<u32, RangeList>> for ESIRange {
    fn from(map: BTreeMap<u32, RangeList>) -> Self {
        Self(map)
    }
}

impl FromIterator<(u32, RangeList)> for ESIRange {
    fn from_iter<T: IntoIterator<Item = (u32, RangeList)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ESIRange {
    type Item = (&'a u32, &'a RangeList);
    type IntoIter = btree_map::Iter<'a, u32, RangeList>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ESIRange {
    /// Emits the internal grammar, collapsing contiguous whole-block keys
    /// into `start-end` runs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        let mut entries = self.0.iter().peekable();
        while let Some((&sbn, ranges)) = entries.next() {
            if ranges.is_empty() {
                let mut end = sbn;
                while let Some(&(&next, next_ranges)) = entries.peek() {
                    if next == end + 1 && next_ranges.is_empty() {
                        end = next;
                        entries.next();
                    } else {
                        break;
                    }
                }
                if end > sbn {
                    write!(f, "{sep}{sbn}-{end}")?;
                } else {
                    write!(f, "{sep}{sbn}")?;
                }
            } else {
                write!(f, "{sep}{sbn}:{ranges}")?;
            }
            sep = ";";
        }
        Ok(())
    }
}

impl FromStr for ESIRange {
    type Err = ParseError;

    /// Parses the internal grammar. Entries may arrive in any block order;
    /// `start-end` runs expand to one whole-block entry per SBN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = BTreeMap::new();
        if s.is_empty() {
            return Ok(ESIRange(out));
        }
        for entry in s.split(';') {
            if let Some((start, end)) = entry.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    for sbn in start..=end {
                        out.insert(sbn, RangeList::new());
                    }
                    continue;
                }
            }
            let (sbn, ranges) = match entry.split_once(':') {
                Some((sbn, ranges)) => (sbn, ranges),
                None => (entry, ""),
            };
            let sbn = sbn.parse::<u32>().map_err(|_| ParseError::InvalidSbn(sbn.to_string()))?;
            let ranges = if ranges.is_empty() { RangeList::new() } else { ranges.parse()? };
            out.insert(sbn, ranges);
        }
        Ok(ESIRange(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percent_encoding::percent_decode_str;

    fn rl(ranges: &[(i64, i64)]) -> RangeList {
        RangeList::from(ranges.iter().map(|&(s, e)| Range::new(s, e)).collect::<Vec<_>>())
    }

    fn er(entries: &[(u32, &[(i64, i64)])]) -> ESIRange {
        entries.iter().map(|&(sbn, ranges)| (sbn, rl(ranges))).collect()
    }

    #[test]
    fn text_parse_and_emit() {
        let parsed: ESIRange = "0;1:;2:3;4:5,6-9,11-11,12-14;5-6;7:0-1;8-10".parse().unwrap();
        let expected = er(&[
            (0, &[]),
            (1, &[]),
            (2, &[(3, 3)]),
            (4, &[(5, 9), (11, 14)]),
            (5, &[]),
            (6, &[]),
            (7, &[(0, 1)]),
            (8, &[]),
            (9, &[]),
            (10, &[]),
        ]);
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), "0-1;2:3;4:5-9,11-14;5-6;7:0-1;8-10");

        let text = "12-19;28:23-59;30:101";
        let parsed: ESIRange = text.parse().unwrap();
        let expected = er(&[
            (12, &[]),
            (13, &[]),
            (14, &[]),
            (15, &[]),
            (16, &[]),
            (17, &[]),
            (18, &[]),
            (19, &[]),
            (28, &[(23, 59)]),
            (30, &[(101, 101)]),
        ]);
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), text);

        assert_eq!("".parse::<ESIRange>().unwrap(), ESIRange::new());
        assert_eq!(ESIRange::new().to_string(), "");
        assert!("a:1".parse::<ESIRange>().is_err());

        // non-contiguous whole blocks never collapse into a run
        assert_eq!(er(&[(3, &[]), (5, &[])]).to_string(), "3;5");
    }

    #[test]
    fn mbms_queries() {
        let cases = [
            ("&SourceSBN=12;ESI=23", "12:23"),
            ("&SourceSBN=12;ESI=23-28", "12:23-28"),
            ("&SourceSBN=12;ESI=23,26,28", "12:23,26,28"),
            ("&SourceSBN=12", "12"),
            ("&SourceSBN=12-19", "12-19"),
            ("&SourceSBN=12;ESI=34&SourceSBN=20;ESI=23", "12:34;20:23"),
            (
                "&SourceSBN=12-19&SourceSBN=28%3BESI=23-59&SourceSBN=30;ESI=101",
                "12-19;28:23-59;30:101",
            ),
            ("&SourceSBN=12%3bESI=120+10", "12:120-130"),
        ];
        for (input, internal) in cases {
            let parsed = ESIRange::from_mbms_query(input).unwrap();
            assert_eq!(parsed.to_string(), internal, "input: {input}");
            // the count form rewrites to `a-b`, so it cannot round-trip
            if !input.contains('+') {
                let emitted = parsed.to_mbms_raw_query();
                let emitted = percent_decode_str(&emitted).decode_utf8().unwrap();
                let unescaped = percent_decode_str(input).decode_utf8().unwrap();
                assert_eq!(format!("&{emitted}"), unescaped, "input: {input}");
            }
        }

        let lower = ESIRange::from_mbms_query("&SourceSBN=12;esi=23").unwrap();
        assert_eq!(lower.to_string(), "12:23");
        assert!(ESIRange::from_mbms_query("&Sbn=12").is_err());
        assert!(ESIRange::from_mbms_query("&SourceSBN=12;X=1").is_err());
    }

    #[test]
    fn per_sbn_projection() {
        // 3 blocks of 10 symbols, 100 octets each, object ends short
        let bs = BlockingStructure::new(2950, 10, 100, 1, false).unwrap();
        assert_eq!(bs.num_blocks(), 3);

        // exact symbol span
        let ranges = rl(&[(1000, 1999)]);
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 1, &ranges).unwrap(),
            rl(&[(0, 9)])
        );
        // partial leading byte rounds up, partial trailing byte rounds down
        let ranges = rl(&[(1050, 1849)]);
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 1, &ranges).unwrap(),
            rl(&[(1, 7)])
        );
        // sub-symbol slivers project to nothing
        let ranges = rl(&[(1050, 1060)]);
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 1, &ranges).unwrap(),
            RangeList::new()
        );
        // the last byte of the transfer pulls in the short final symbol
        let ranges = rl(&[(2900, 2949)]);
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 2, &ranges).unwrap(),
            rl(&[(9, 9)])
        );
        // other blocks' bytes are ignored
        let ranges = rl(&[(0, 2949)]);
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 0, &ranges).unwrap(),
            rl(&[(0, 9)])
        );
        assert_eq!(
            ESIRange::es_range_list_for_sbn(&bs, 7, &ranges).unwrap(),
            RangeList::new()
        );
    }

    #[test]
    fn whole_block_expansion() {
        let bs = BlockingStructure::new(2950, 10, 100, 1, false)
            .unwrap()
            .with_max_num_es(12)
            .unwrap();
        let whole = er(&[(1, &[])]);
        assert_eq!(whole.to_range_list(&bs, true), rl(&[(1000, 1999)]));
        assert_eq!(whole.to_range_list(&bs, false), rl(&[(200, 399)]));
        assert_eq!(whole.count(&bs), 10);

        // repair indices below k are clamped away
        let repair = er(&[(1, &[(8, 11)])]);
        assert_eq!(repair.to_range_list(&bs, false), rl(&[(200, 399)]));
        let source_only = er(&[(1, &[(2, 5)])]);
        assert_eq!(source_only.to_range_list(&bs, false), RangeList::new());
    }

    #[test]
    fn missing_esis_cases() {
        let bs = BlockingStructure::new(2950, 10, 100, 1, false)
            .unwrap()
            .with_max_num_es(12)
            .unwrap();

        // whole block lost, nothing repairable: request the full block
        let src_missing = er(&[(0, &[(0, 9)])]);
        let need = ESIRange::missing_esis(&src_missing, &ESIRange::new(), &bs);
        assert_eq!(need, er(&[(0, &[(0, 9)])]));

        // repair symbols cover part of the loss
        let src_missing = er(&[(0, &[(1, 3), (6, 8)])]);
        let rpr_has = er(&[(0, &[(10, 11)])]);
        let need = ESIRange::missing_esis(&src_missing, &rpr_has, &bs);
        assert_eq!(need, er(&[(0, &[(1, 3), (6, 6)])]));

        // enough repair symbols: no request
        let src_missing = er(&[(0, &[(1, 2)])]);
        let rpr_has = er(&[(0, &[(10, 11)])]);
        assert!(ESIRange::missing_esis(&src_missing, &rpr_has, &bs).is_empty());
    }
}
