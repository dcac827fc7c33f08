//! # mcast-fec - blocking structure and symbol-range algebra
//!
//! Core arithmetic for multicast object delivery (FLUTE/ROUTE): how a
//! transport object of known length is partitioned into source blocks and
//! encoding symbols per RFC 5052 §9.1 (asymmetric scheme), and the range
//! algebra a repair client needs to turn "which bytes am I missing" into
//! "which encoding symbols do I request".
//!
//! - [`Range`] and [`RangeList`] - ordered sets of disjoint closed
//!   intervals, with set algebra and the HTTP `Content-Range` grammar.
//! - [`BlockingStructure`] - block and symbol offsets, sizes, and inverse
//!   mappings, updatable while the object is still growing.
//! - [`ESIRange`] - per-block symbol ranges, byte projections in both
//!   directions, the repair-set computation, and the MBMS query grammar.
//!
//! The crate computes blocking *structure* only; FEC codewords, network
//! I/O, and persistence belong to the caller.
//!
//! # References
//!
//! | Document | Title |
//! | ------------- | ------------- |
//! | RFC 5052 | Forward Error Correction (FEC) Building Block |
//! | RFC 7233 | Hypertext Transfer Protocol: Range Requests |
//! | 3GPP TS 26.346 | Multimedia Broadcast/Multicast Service: Protocols and codecs |
//!
//! # Computing a repair request
//!
//!```rust
//! use mcast_fec::{BlockingStructure, ESIRange, RangeList};
//!
//! // 10 symbols of 1430 octets per block, 2 repair symbols each
//! let bs = BlockingStructure::new(107_374_182, 10, 1430, 1, false)
//!     .unwrap()
//!     .with_max_num_es(12)
//!     .unwrap();
//!
//! // bytes never received, and repair bytes already in hand
//! let (missing, _) = RangeList::from_content_range("bytes=0-5719").unwrap();
//! let repair_held =
//!     ESIRange::from_range_list(&bs, &"0-2859".parse().unwrap(), false, false).unwrap();
//!
//! // project, compute the shortfall, and emit an MBMS query for it
//! let src_missing = ESIRange::from_range_list(&bs, &missing, true, true).unwrap();
//! let need = ESIRange::missing_esis(&src_missing, &repair_held, &bs);
//! assert_eq!(need.to_mbms_raw_query(), "SourceSBN=0%3bESI=0-1");
//!```

pub mod blocking;
mod common;
pub mod esi;
pub mod primitives;

pub use crate::blocking::BlockingStructure;
pub use crate::common::{BlockRangeReadError, BlockReadError, BlockingError, FecError, ParseError};
pub use crate::esi::ESIRange;
pub use crate::primitives::{Range, RangeList};
