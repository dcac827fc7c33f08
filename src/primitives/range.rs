//! Module that implements the closed-interval primitive used for byte and
//! symbol ranges.

use std::fmt;
use std::str::FromStr;

use crate::common::ParseError;

/// End marker for an open-ended suffix range (`"S-"`) in parsed input.
///
/// The suffix form only carries meaning until the total object length is
/// known; [`Range::resolve`] turns it into a closed interval.
pub const SUFFIX_END: i64 = -1;

/// A closed interval `[start, end]` of signed 64-bit integers.
///
/// Both bounds are inclusive. An interval with `end < start` is empty and
/// may appear transiently inside computations, but operations never emit
/// one into a canonical [`RangeList`](super::RangeList).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    /// First offset covered by the interval.
    pub start: i64,
    /// Last offset covered by the interval, inclusive.
    pub end: i64,
}

impl Range {
    /// Creates a new closed interval.
    #[inline]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of integers covered by the interval.
    #[inline]
    pub const fn count(&self) -> i64 {
        self.end - self.start + 1
    }

    /// Returns true if `other` lies entirely within `self`.
    #[inline]
    pub const fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns true if `self` starts at or before `other` and reaches at
    /// least the position directly in front of it. Adjacency counts, so two
    /// ranges overlapping here always merge into one contiguous interval.
    #[inline]
    pub const fn overlaps_front(&self, other: &Range) -> bool {
        self.start <= other.start && self.end + 1 >= other.start
    }

    /// Smallest interval covering both `self` and `other`. The caller must
    /// ensure the two overlap or are adjacent beforehand.
    #[inline]
    pub fn union(&self, other: &Range) -> Range {
        Range::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Common sub-interval of `self` and `other`, if any.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then(|| Range::new(start, end))
    }

    /// Returns true if this is a parsed suffix range (`"S-"`).
    #[inline]
    pub const fn is_suffix(&self) -> bool {
        self.end == SUFFIX_END
    }

    /// Resolves a suffix range against the total object length, turning
    /// `"S-"` into `[S, len - 1]`. Closed intervals are returned unchanged.
    pub fn resolve(&self, len: u64) -> Range {
        if self.is_suffix() {
            Range::new(self.start, len as i64 - 1)
        } else {
            *self
        }
    }

    /// HTTP byte-range form: always `S-E` (or `S-` for a suffix), never the
    /// bare single-integer form.
    pub fn http_form(&self) -> String {
        if self.is_suffix() {
            format!("{}-", self.start)
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else if self.is_suffix() {
            write!(f, "{}-", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for Range {
    type Err = ParseError;

    /// Parses `"N"`, `"S-E"`, or the suffix form `"S-"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number =
            |t: &str| t.parse::<i64>().map_err(|_| ParseError::InvalidRange(s.to_string()));
        match s.split_once('-') {
            Some((start, "")) => Ok(Range::new(number(start)?, SUFFIX_END)),
            Some((start, end)) => Ok(Range::new(number(start)?, number(end)?)),
            None => {
                let start = number(s)?;
                Ok(Range::new(start, start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn text_forms() {
        assert_eq!(Range::new(5, 5).to_string(), "5");
        assert_eq!(Range::new(5, 9).to_string(), "5-9");
        assert_eq!(Range::new(5, SUFFIX_END).to_string(), "5-");
        assert_eq!(Range::new(5, 5).http_form(), "5-5");
        assert_eq!(Range::new(5, SUFFIX_END).http_form(), "5-");

        assert_eq!("7".parse::<Range>().unwrap(), Range::new(7, 7));
        assert_eq!("7-11".parse::<Range>().unwrap(), Range::new(7, 11));
        assert_eq!("213-".parse::<Range>().unwrap(), Range::new(213, SUFFIX_END));
        assert!("x-3".parse::<Range>().is_err());
        assert!("".parse::<Range>().is_err());
    }

    #[test]
    fn suffix_resolution() {
        assert_eq!(Range::new(213, SUFFIX_END).resolve(1000), Range::new(213, 999));
        assert_eq!(Range::new(0, 9).resolve(1000), Range::new(0, 9));
    }

    #[test]
    fn predicates() {
        let outer = Range::new(10, 20);
        assert!(outer.contains(&Range::new(10, 20)));
        assert!(outer.contains(&Range::new(12, 18)));
        assert!(!outer.contains(&Range::new(9, 18)));

        assert!(Range::new(0, 4).overlaps_front(&Range::new(5, 9)));
        assert!(!Range::new(0, 3).overlaps_front(&Range::new(5, 9)));
        assert!(!Range::new(5, 9).overlaps_front(&Range::new(0, 4)));

        assert_eq!(Range::new(0, 4).intersection(&Range::new(5, 9)), None);
        assert_eq!(
            Range::new(0, 5).intersection(&Range::new(5, 9)),
            Some(Range::new(5, 5))
        );
    }

    fn arb_range() -> impl Strategy<Value = Range> {
        (0i64..10_000, 0i64..1_000).prop_map(|(start, len)| Range::new(start, start + len))
    }

    proptest! {
        #[test]
        fn intersection_commutes(a in arb_range(), b in arb_range()) {
            prop_assert_eq!(a.intersection(&b), b.intersection(&a));
        }

        #[test]
        fn intersection_within_both(a in arb_range(), b in arb_range()) {
            if let Some(i) = a.intersection(&b) {
                prop_assert!(a.contains(&i));
                prop_assert!(b.contains(&i));
            }
        }

        #[test]
        fn union_covers_both(a in arb_range(), b in arb_range()) {
            let u = a.union(&b);
            prop_assert!(u.contains(&a));
            prop_assert!(u.contains(&b));
        }

        #[test]
        fn text_round_trip(a in arb_range()) {
            let parsed: Range = a.to_string().parse().unwrap();
            prop_assert_eq!(parsed, a);
        }
    }
}
