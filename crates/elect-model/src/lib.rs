//! Data shapes for the live election results feed.
//!
//! The results feed is a set of JSON files published into dated
//! directories. A small pointer file (`latest.json`) names the directory
//! that is currently authoritative, and carries a control block that can
//! hold the results back ("the curtain") or announce a counting status.
//!
//! # Files
//!
//! | Logical path | Type |
//! |--------------|------|
//! | `/SummaryJSON.json` | [`SummaryJson`] |
//! | `/PerProvinceJSON/{provinceId}.json` | [`PerProvinceJson`] |
//! | `/PerPartyJSON/{partyId}.json` | [`PerPartyJson`] |
//!
//! Per-zone data has no file of its own; it is a single entry of the
//! owning province's `zoneInformationMap`.
//!
//! All shapes keep fields they do not model in an `extra` map so that new
//! fields in the feed never break parsing.

pub mod paths;
pub mod pointer;
pub mod results;

pub use paths::{DataFile, SUMMARY_FILE, data_file_path};
pub use pointer::{Control, LatestFile, Pointer, PointerList, PointerTimestamp, normalize_status};
pub use results::{
    Candidate, EntityId, PerPartyJson, PerProvinceJson, SummaryJson, ZoneInformation, ZoneStats,
};
