//! Result files published in each snapshot directory.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier that the feed writes either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric id.
    Number(u64),
    /// String id.
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Leading candidate of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Party the candidate runs for.
    pub party_id: EntityId,
    /// Votes received.
    #[serde(default)]
    pub score: f64,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Candidate {
    /// Whether the candidate beats the "vote no" option in `stats`.
    #[must_use]
    pub fn beats_no_vote(&self, stats: &ZoneStats) -> bool {
        self.score > stats.no_votes
    }

    /// Share of the leading option (candidate or "vote no") among counted votes.
    ///
    /// Returns 0 when nothing has been counted yet.
    #[must_use]
    pub fn leading_share(&self, stats: &ZoneStats) -> f64 {
        let total = stats.good_votes + stats.no_votes;
        if total > 0.0 {
            self.score.max(stats.no_votes) / total
        } else {
            0.0
        }
    }
}

/// Counting statistics of a zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStats {
    /// Counting progress in percent.
    #[serde(default)]
    pub progress: f64,
    /// Valid votes.
    #[serde(default)]
    pub good_votes: f64,
    /// "Vote no" ballots.
    #[serde(default)]
    pub no_votes: f64,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ZoneStats {
    /// Whether counting has started, i.e. zone data is worth showing.
    #[must_use]
    pub fn should_display(&self) -> bool {
        self.progress > 0.0
    }

    /// Whether counting is complete.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress >= 100.0
    }
}

/// Nationwide summary (`/SummaryJSON.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryJson {
    /// `provinceId -> zoneNo -> leading candidate`.
    #[serde(default)]
    pub zone_winning_candidate_map: BTreeMap<String, BTreeMap<String, Candidate>>,
    /// `provinceId -> zoneNo -> counting stats`.
    #[serde(default)]
    pub zone_stats_map: BTreeMap<String, BTreeMap<String, ZoneStats>>,
    /// `partyId -> nationwide party stats`, kept as published.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub party_stats_map: Map<String, Value>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SummaryJson {
    /// Leading candidate of a zone, regardless of counting progress.
    #[must_use]
    pub fn winning_candidate(&self, province_id: u32, zone_no: u32) -> Option<&Candidate> {
        self.zone_winning_candidate_map
            .get(&province_id.to_string())?
            .get(&zone_no.to_string())
    }

    /// Counting statistics of a zone.
    #[must_use]
    pub fn zone_stats(&self, province_id: u32, zone_no: u32) -> Option<&ZoneStats> {
        self.zone_stats_map
            .get(&province_id.to_string())?
            .get(&zone_no.to_string())
    }

    /// Nationwide stats of a party.
    #[must_use]
    pub fn party_stats(&self, party_id: &EntityId) -> Option<&Value> {
        self.party_stats_map.get(&party_id.to_string())
    }

    /// Candidate to display as the zone winner.
    ///
    /// A zone has a displayable winner once counting has started and the
    /// leading candidate beats the "vote no" option.
    #[must_use]
    pub fn displayed_winner(&self, province_id: u32, zone_no: u32) -> Option<&Candidate> {
        let stats = self.zone_stats(province_id, zone_no)?;
        let candidate = self.winning_candidate(province_id, zone_no)?;
        (stats.should_display() && candidate.beats_no_vote(stats)).then_some(candidate)
    }
}

/// Per-zone information as published inside a province file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneInformation {
    /// All fields of the zone entry.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ZoneInformation {
    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Results of one province (`/PerProvinceJSON/{provinceId}.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerProvinceJson {
    /// `zoneNo -> zone information`.
    #[serde(default)]
    pub zone_information_map: BTreeMap<String, ZoneInformation>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PerProvinceJson {
    /// Information of one zone of this province.
    #[must_use]
    pub fn zone(&self, zone_no: u32) -> Option<&ZoneInformation> {
        self.zone_information_map.get(&zone_no.to_string())
    }
}

/// Results of one party (`/PerPartyJSON/{partyId}.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerPartyJson {
    /// All fields of the party file.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PerPartyJson {
    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn summary() -> SummaryJson {
        serde_json::from_value(json!({
            "zoneWinningCandidateMap": {
                "10": {
                    "1": { "partyId": 3, "score": 500 },
                    "2": { "partyId": "7", "score": 100 }
                }
            },
            "zoneStatsMap": {
                "10": {
                    "1": { "progress": 100, "goodVotes": 900, "noVotes": 50 },
                    "2": { "progress": 40, "goodVotes": 300, "noVotes": 200 }
                }
            },
            "updatedAt": "2019-03-24T20:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_lookup() {
        let summary = summary();
        let winner = summary.winning_candidate(10, 1).unwrap();
        assert_eq!(winner.party_id, EntityId::Number(3));
        assert!(summary.zone_stats(10, 1).unwrap().is_finished());
        assert!(summary.winning_candidate(11, 1).is_none());
        assert!(summary.extra.contains_key("updatedAt"));
    }

    #[test]
    fn test_party_stats_are_typed_not_extra() {
        let summary: SummaryJson = serde_json::from_value(json!({
            "partyStatsMap": {"7": {"seats": 3}},
            "updatedAt": "20:00"
        }))
        .unwrap();
        assert_eq!(
            summary.party_stats(&EntityId::Number(7)),
            Some(&json!({"seats": 3}))
        );
        assert!(summary.party_stats(&EntityId::Text("8".to_string())).is_none());
        assert!(!summary.extra.contains_key("partyStatsMap"));
        assert!(summary.extra.contains_key("updatedAt"));
    }

    #[test]
    fn test_displayed_winner_respects_no_vote() {
        let summary = summary();
        assert!(summary.displayed_winner(10, 1).is_some());
        // 100 votes against 200 "vote no" ballots
        assert!(summary.displayed_winner(10, 2).is_none());
    }

    #[test]
    fn test_leading_share() {
        let summary = summary();
        let stats = summary.zone_stats(10, 2).unwrap();
        let candidate = summary.winning_candidate(10, 2).unwrap();
        assert!((candidate.leading_share(stats) - 0.4).abs() < 1e-9);
        assert_eq!(candidate.leading_share(&ZoneStats::default()), 0.0);
    }

    #[test]
    fn test_province_zone_lookup() {
        let province: PerProvinceJson = serde_json::from_value(json!({
            "zoneInformationMap": {
                "3": { "candidates": [] }
            }
        }))
        .unwrap();
        assert!(province.zone(3).unwrap().get("candidates").is_some());
        assert!(province.zone(4).is_none());
    }
}
