//! Error types shared across the crate.

use std::error::Error as StdError;

use thiserror::Error;

use crate::blocking::BlockingStructure;
use crate::esi::ESIRange;
use crate::primitives::RangeList;

/// Errors raised while validating blocking-structure parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingError {
    /// The transfer length is zero.
    #[error("transfer length must be greater than zero")]
    ZeroTransferLength,
    /// The encoding symbol length is zero.
    #[error("encoding symbol length must be greater than zero")]
    ZeroSymbolLength,
    /// The maximum source block length is zero.
    #[error("max source block length must be greater than zero")]
    ZeroSourceBlockLength,
    /// The symbols-per-group count is zero.
    #[error("symbols per group must be greater than zero")]
    ZeroSymbolsPerGroup,
    /// More symbols per group than fit in one source block.
    #[error("symbols per group {group} must be less than or equal to max source block length {max_sb_len}")]
    GroupExceedsBlock {
        /// Requested symbols per group.
        group: u32,
        /// Maximum source symbols per block.
        max_sb_len: u32,
    },
    /// Fewer total encoding symbols per block than source symbols.
    #[error("max encoding symbols {max_num_es} must be at least max source block length {max_sb_len}")]
    MaxSymbolsBelowBlock {
        /// Requested encoding-symbol budget per block.
        max_num_es: u32,
        /// Maximum source symbols per block.
        max_sb_len: u32,
    },
}

/// Errors raised while parsing the text grammars. Every variant carries the
/// offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A range token was not `N`, `S-E`, or `S-`.
    #[error("invalid range `{0}`")]
    InvalidRange(String),
    /// A `Content-Range` value did not match the grammar.
    #[error("invalid content range `{0}`")]
    InvalidContentRange(String),
    /// A source block number was not an unsigned integer.
    #[error("sbn `{0}` is not an unsigned int")]
    InvalidSbn(String),
    /// An MBMS query tuple was not `SourceSBN=<sbn>[;ESI=<list>]`.
    #[error("invalid MBMS query tuple `{0}`")]
    InvalidMbmsTuple(String),
}

/// Top-level error type covering every fallible operation in the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FecError {
    /// Invalid blocking-structure parameters.
    #[error(transparent)]
    Blocking(#[from] BlockingError),
    /// Malformed text input.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A byte range list handed to a projection was not in ascending order.
    #[error("range list not sorted: {0}")]
    UnsortedRangeList(String),
}

/// Failure to read one source block.
///
/// Carries the cause alongside the block's position within the object,
/// resolved from the blocking structure when the error is built, plus the
/// byte ranges that were unavailable. Callers match the category by
/// downcasting to this type.
#[derive(Error, Debug)]
#[error("err={source}, sbn={sbn}/{num_blocks}, offset={offset} missing {missing}")]
pub struct BlockReadError {
    /// Underlying cause.
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
    /// Source block the read targeted.
    pub sbn: u32,
    /// Total number of source blocks at the time of the failure.
    pub num_blocks: u32,
    /// Byte offset of the block within the object.
    pub offset: u64,
    /// Byte ranges of the block that were unavailable.
    pub missing: RangeList,
}

impl BlockReadError {
    /// Builds a block read error, resolving the block count and byte offset
    /// from `bs`.
    pub fn new(
        bs: &BlockingStructure,
        sbn: u32,
        missing: RangeList,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            source: source.into(),
            sbn,
            num_blocks: bs.num_blocks(),
            offset: bs.src_offset(sbn),
            missing,
        }
    }
}

/// Failure to read a set of blocks, parameterized by the per-block symbol
/// ranges that were unavailable rather than a single block number.
#[derive(Error, Debug)]
#[error("err={source}, missing {missing}")]
pub struct BlockRangeReadError {
    /// Underlying cause.
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
    /// Per-block symbol ranges that were unavailable.
    pub missing: ESIRange,
}

impl BlockRangeReadError {
    /// Builds a block range read error from the missing symbol set.
    pub fn new(missing: ESIRange, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
            missing,
        }
    }
}
