//! Range primitives: closed intervals and ordered lists of them.

pub mod range;

use std::fmt;
use std::str::FromStr;

use crate::common::ParseError;

pub use range::{Range, SUFFIX_END};

/// An ordered sequence of closed intervals over byte or symbol offsets.
///
/// Canonical form is sorted ascending by start with entries disjoint and
/// non-adjacent; every operation re-establishes it on output and tolerates
/// adjacent entries on input. Literal construction through
/// `From<Vec<Range>>` keeps the caller's segmentation as given, so a
/// freshly parsed `Content-Range` value keeps its original entries; use
/// [`RangeList::canonical`] to merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RangeList(Vec<Range>);

impl RangeList {
    /// Creates an empty list.
    #[inline]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list in canonical form, sorting the entries and merging any
    /// overlapping or adjacent pair.
    pub fn canonical(ranges: Vec<Range>) -> Self {
        Self(flatten(ranges))
    }

    /// Number of entries in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the list holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The entries in list order.
    #[inline]
    pub fn as_slice(&self) -> &[Range] {
        &self.0
    }

    /// Iterates over the entries in list order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.0.iter()
    }

    /// Total number of integers covered by the list.
    pub fn count(&self) -> i64 {
        self.0.iter().map(Range::count).sum()
    }

    /// Returns the canonical union of `self` and `other` as a new list.
    ///
    /// Single two-pointer sweep over both inputs; the output never holds
    /// more entries than the inputs combined.
    pub fn union(&self, other: &RangeList) -> RangeList {
        let (a, b) = (&self.0, &other.0);
        let mut out: Vec<Range> = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            let next = if j == b.len() || (i < a.len() && a[i].start <= b[j].start) {
                i += 1;
                a[i - 1]
            } else {
                j += 1;
                b[j - 1]
            };
            match out.last_mut() {
                Some(last) if last.overlaps_front(&next) => last.end = last.end.max(next.end),
                _ => out.push(next),
            }
        }
        RangeList(out)
    }

    /// Merges `other` into `self`, leaving `self` canonical. Returns the
    /// number of entries of `other` that went in as new entries rather than
    /// widening an existing one.
    pub fn inplace_union(&mut self, other: &RangeList) -> usize {
        if other.is_empty() {
            return 0;
        }
        if self.is_empty() {
            self.0 = other.0.clone();
            return self.0.len();
        }
        let mut out: Vec<Range> = Vec::with_capacity(self.0.len() + other.len());
        let (mut i, mut j) = (0, 0);
        let mut inserted = 0;
        while i < self.0.len() || j < other.0.len() {
            let from_other =
                i == self.0.len() || (j < other.0.len() && other.0[j].start < self.0[i].start);
            let next = if from_other {
                j += 1;
                other.0[j - 1]
            } else {
                i += 1;
                self.0[i - 1]
            };
            match out.last_mut() {
                Some(last) if last.overlaps_front(&next) => last.end = last.end.max(next.end),
                _ => {
                    if from_other {
                        inserted += 1;
                    }
                    out.push(next);
                }
            }
        }
        self.0 = out;
        inserted
    }

    /// Returns the canonical intersection of `self` and `other`.
    ///
    /// Two-pointer sweep; when one entry consumes the other, only the
    /// consumed side advances.
    pub fn intersection(&self, other: &RangeList) -> RangeList {
        let (a, b) = (&self.0, &other.0);
        let mut out: Vec<Range> = Vec::with_capacity(a.len().min(b.len()));
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i].contains(&b[j]) {
                out.push(b[j]);
                j += 1;
            } else if b[j].contains(&a[i]) {
                out.push(a[i]);
                i += 1;
            } else if a[i].overlaps_front(&b[j]) {
                if let Some(r) = a[i].intersection(&b[j]) {
                    out.push(r);
                }
                i += 1;
            } else if b[j].overlaps_front(&a[i]) {
                if let Some(r) = a[i].intersection(&b[j]) {
                    out.push(r);
                }
                j += 1;
            } else if a[i].end < b[j].start {
                i += 1;
            } else {
                j += 1;
            }
        }
        RangeList(flatten(out))
    }

    /// Returns the integers of `self` not covered by `other`, canonical.
    pub fn subtract(&self, other: &RangeList) -> RangeList {
        if other.is_empty() {
            return RangeList(flatten(self.0.clone()));
        }
        let mut out: Vec<Range> = Vec::with_capacity(self.0.len());
        let mut j = 0;
        for &r in &self.0 {
            let mut cur = r;
            while j < other.0.len() && other.0[j].end < cur.start {
                j += 1;
            }
            let mut alive = true;
            while alive && j < other.0.len() && other.0[j].start <= cur.end {
                if other.0[j].start > cur.start {
                    out.push(Range::new(cur.start, other.0[j].start - 1));
                }
                if other.0[j].end >= cur.end {
                    // the subtractor may also clip the next entry, keep it
                    alive = false;
                } else {
                    cur.start = other.0[j].end + 1;
                    j += 1;
                }
            }
            if alive {
                out.push(cur);
            }
        }
        RangeList(flatten(out))
    }

    /// Returns true if every entry of `other` lies within some entry of
    /// `self`.
    pub fn contains(&self, other: &RangeList) -> bool {
        let mut i = 0;
        for o in &other.0 {
            while i < self.0.len() && self.0[i].end < o.start {
                i += 1;
            }
            if i == self.0.len() || !self.0[i].contains(o) {
                return false;
            }
        }
        true
    }

    /// Returns the sub-intervals of `[start, end]` not covered by `self`.
    /// Empty when `end < start` or `end < 0`.
    pub fn missing(&self, start: i64, end: i64) -> RangeList {
        let mut out = Vec::new();
        let mut cur = start;
        if cur > end || end < 0 {
            return RangeList::new();
        }
        for has in &self.0 {
            if has.start > end {
                break;
            }
            if cur > has.end {
                continue;
            }
            if cur < has.start {
                out.push(Range::new(cur, has.start - 1));
            }
            cur = has.end + 1;
            if cur > end {
                break;
            }
        }
        if cur <= end {
            out.push(Range::new(cur, end));
        }
        RangeList(out)
    }

    /// HTTP byte-range emission: every entry in the `S-E` form, joined by
    /// commas.
    pub fn to_http_string(&self) -> String {
        let forms: Vec<String> = self.0.iter().map(Range::http_form).collect();
        forms.join(",")
    }

    /// Parses an HTTP `Content-Range`-style value into a range list and the
    /// total length (`-1` when unknown).
    ///
    /// Accepts comma-separated `start-end`, `start-`, and `*` entries, each
    /// optionally followed by `/length` or `/*`; an optional `bytes=` or
    /// `bytes ` prefix is skipped. `*` entries contribute no range but may
    /// carry the length, and the first explicit length wins. Entries that
    /// are not strictly ascending are dropped. The returned list keeps the
    /// original segmentation.
    pub fn from_content_range(value: &str) -> Result<(RangeList, i64), ParseError> {
        let invalid = || ParseError::InvalidContentRange(value.to_string());
        let mut length: i64 = -1;
        let mut out: Vec<Range> = Vec::new();
        for entry in value.split(',') {
            let lead = entry
                .as_bytes()
                .iter()
                .position(|b| b.is_ascii_digit() || *b == b'*')
                .ok_or_else(invalid)?;
            let mut rest = &entry[lead..];
            let (mut start, mut end): (i64, i64) = (0, SUFFIX_END);
            if let Some(stripped) = rest.strip_prefix('*') {
                rest = stripped;
            } else {
                let (digits, after) = split_digits(rest);
                rest = after;
                start = digits.parse().map_err(|_| invalid())?;
                end = start;
                if let Some(stripped) = rest.strip_prefix('-') {
                    let (digits, after) = split_digits(stripped);
                    rest = after;
                    end = if digits.is_empty() {
                        SUFFIX_END
                    } else {
                        digits.parse().map_err(|_| invalid())?
                    };
                }
            }
            if let Some(stripped) = rest.strip_prefix('/') {
                let (digits, _) = split_digits(stripped);
                if length == -1 && !digits.is_empty() {
                    length = digits.parse().map_err(|_| invalid())?;
                }
            }
            if (start > 0 || end > 0)
                && out
                    .last()
                    .map_or(true, |last| last.end < start && last.end != SUFFIX_END)
            {
                out.push(Range::new(start, end));
            }
        }
        Ok((RangeList(out), length))
    }
}

/// Splits `s` at the end of its leading run of ASCII digits.
fn split_digits(s: &str) -> (&str, &str) {
    let end = s
        .as_bytes()
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}

/// Sorts by start and merges every overlapping or adjacent pair, right to
/// left, keeping the larger end.
fn flatten(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by_key(|r| r.start);
    let mut i = ranges.len();
    while i > 1 {
        i -= 1;
        if ranges[i].start <= ranges[i - 1].end + 1 {
            ranges[i - 1].end = ranges[i - 1].end.max(ranges[i].end);
            ranges.remove(i);
        }
    }
    ranges
}

impl From<Vec<Range>> for RangeList {
    /// Keeps the entries exactly as given; use [`RangeList::canonical`] to
    /// establish canonical form.
    fn from(ranges: Vec<Range>) -> Self {
        Self(ranges)
    }
}

impl std::ops::Index<usize> for RangeList {
    type Output = Range;

    fn index(&self, index: usize) -> &Range {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a RangeList {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Range> for RangeList {
    fn from_iter<T: IntoIterator<Item = Range>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for r in &self.0 {
            write!(f, "{sep}{r}")?;
            sep = ",";
        }
        Ok(())
    }
}

impl FromStr for RangeList {
    type Err = ParseError;

    /// Parses the comma-separated internal grammar and flattens the result.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(RangeList::new());
        }
        let mut out = Vec::new();
        for token in s.split(',') {
            out.push(token.parse::<Range>()?);
        }
        Ok(RangeList(flatten(out)))
    }
}
