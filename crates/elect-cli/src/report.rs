//! Terminal rendering of live data states.

use std::sync::Arc;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use elect_live::FetchState;
use elect_model::{LatestFile, SummaryJson, ZoneInformation};

/// One line describing a fetch state.
pub fn describe_state<T>(state: &FetchState<T>, describe: impl FnOnce(&T) -> String) -> String {
    let mut line = match &state.data {
        Some(data) => describe(data),
        None if state.failed => String::new(),
        None => "waiting for data".to_string(),
    };
    if let Some(error) = state.error.as_ref().filter(|_| state.failed) {
        if !line.is_empty() {
            line.push_str("; ");
        }
        line.push_str(error.user_message());
    }
    if state.loading && state.data.is_some() {
        line.push_str(" (refreshing)");
    }
    line
}

/// Counting progress over all zones of a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    /// Zones listed in the summary.
    pub zones: usize,
    /// Zones where counting has started.
    pub counting: usize,
    /// Zones fully counted.
    pub finished: usize,
    /// Zones with a displayable winner.
    pub decided: usize,
}

impl SummaryCounts {
    /// Tally `summary`.
    pub fn from_summary(summary: &SummaryJson) -> Self {
        let mut counts = Self::default();
        for (province, zones) in &summary.zone_stats_map {
            for (zone, stats) in zones {
                counts.zones += 1;
                if stats.should_display() {
                    counts.counting += 1;
                }
                if stats.is_finished() {
                    counts.finished += 1;
                }
                let winner = summary
                    .zone_winning_candidate_map
                    .get(province)
                    .and_then(|candidates| candidates.get(zone));
                if winner.is_some_and(|c| stats.should_display() && c.beats_no_vote(stats)) {
                    counts.decided += 1;
                }
            }
        }
        counts
    }
}

/// One line describing the summary state.
pub fn describe_summary(state: &FetchState<Arc<SummaryJson>>) -> String {
    describe_state(state, |summary| {
        let counts = SummaryCounts::from_summary(summary);
        format!(
            "{} zones, {} counting, {} finished, {} with a winner",
            counts.zones, counts.counting, counts.finished, counts.decided
        )
    })
}

/// One line describing the directory state.
pub fn describe_directory(state: &FetchState<String>) -> String {
    describe_state(state, |directory| format!("directory {directory}"))
}

/// Curtain and status lines of the pointer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLines {
    /// `yes`, `no` or `unknown`.
    pub locked: String,
    /// Normalized status, `-` when unset or `unknown`.
    pub status: String,
}

/// Describe the control block, or `unknown` while the pointer file has not
/// been read.
pub fn describe_control(latest: &FetchState<Arc<LatestFile>>) -> ControlLines {
    match latest.data.as_deref() {
        Some(file) => ControlLines {
            locked: if file.is_locked() { "yes" } else { "no" }.to_string(),
            status: file.status().unwrap_or("-").to_string(),
        },
        None => ControlLines {
            locked: "unknown".to_string(),
            status: "unknown".to_string(),
        },
    }
}

/// Table of every zone of a summary, ordered by province and zone number.
pub fn summary_table(summary: &SummaryJson) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Province"),
        header_cell("Zone"),
        header_cell("Progress"),
        header_cell("Leading party"),
        header_cell("Score"),
        header_cell("Share"),
        header_cell("Result"),
    ]);
    apply_table_style(&mut table);
    for index in [1, 2, 4, 5] {
        align_column(&mut table, index, CellAlignment::Right);
    }

    let mut rows: Vec<(u64, u64, &str, &str)> = Vec::new();
    for (province, zones) in &summary.zone_stats_map {
        for zone in zones.keys() {
            rows.push((sort_key(province), sort_key(zone), province.as_str(), zone.as_str()));
        }
    }
    rows.sort();

    for (_, _, province, zone) in rows {
        let Some(stats) = summary.zone_stats_map.get(province).and_then(|z| z.get(zone)) else {
            continue;
        };
        let candidate = summary
            .zone_winning_candidate_map
            .get(province)
            .and_then(|candidates| candidates.get(zone));
        let (party, score, share) = match candidate {
            Some(c) => (
                Cell::new(&c.party_id),
                Cell::new(format!("{:.0}", c.score)),
                Cell::new(format!("{:.1}%", c.leading_share(stats) * 100.0)),
            ),
            None => (dim_cell("-"), dim_cell("-"), dim_cell("-")),
        };
        let result = if !stats.should_display() {
            dim_cell("not started")
        } else if candidate.is_some_and(|c| c.beats_no_vote(stats)) {
            if stats.is_finished() {
                Cell::new("elected")
                    .fg(Color::Green)
                    .add_attribute(Attribute::Bold)
            } else {
                Cell::new("leading").fg(Color::Cyan)
            }
        } else {
            Cell::new("vote no").fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(province),
            Cell::new(zone),
            Cell::new(format!("{:.1}%", stats.progress)),
            party,
            score,
            share,
            result,
        ]);
    }
    table
}

/// Key/value table of one zone's information.
pub fn zone_table(zone: &ZoneInformation) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Field"), header_cell("Value")]);
    apply_table_style(&mut table);
    for (key, value) in &zone.fields {
        let value = value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string);
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

/// Numeric ids sort numerically, anything else after them.
fn sort_key(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

/// House style of every table the client prints.
pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label).add_attribute(Attribute::Bold)
}

fn dim_cell(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).add_attribute(Attribute::Dim)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
