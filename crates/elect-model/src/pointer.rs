//! The pointer file (`latest.json`).
//!
//! The pointer file lists every published snapshot directory together with
//! its publication timestamp, and a control block set by the operators.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of `control.locked` that holds the results back.
pub const LOCKED_VALUE: &str = "TRUE";

/// Publication timestamp of a pointer.
///
/// The feed has used both epoch numbers and sortable strings over time.
/// Values of any other JSON type are kept so that one bad cell does not
/// make the whole pointer file unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointerTimestamp {
    /// Numeric timestamp.
    Number(f64),
    /// String timestamp.
    Text(String),
    /// Anything else; never selects a pointer.
    Other(Value),
}

impl PointerTimestamp {
    /// Whether this timestamp can take part in selecting the active pointer.
    ///
    /// Spreadsheet placeholders (`"null"`, `"."`, blank) cannot.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Text(text) => {
                let text = text.trim();
                !text.is_empty() && normalize_status(text).is_some()
            }
            Self::Other(_) => false,
        }
    }

    /// Whether `self` is strictly later than `other`.
    ///
    /// Two numbers compare numerically and two strings lexicographically.
    /// A string compared with a number counts only if it reads as a number;
    /// otherwise neither side is later.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a > b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Other(_) => None,
        }
    }
}

impl From<f64> for PointerTimestamp {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PointerTimestamp {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A timestamped reference to a snapshot directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    /// When the snapshot was published; `null` or absent when unknown.
    #[serde(default)]
    pub timestamp: Option<PointerTimestamp>,
    /// Directory holding the snapshot's files.
    pub directory: String,
}

impl Pointer {
    /// Create a pointer.
    pub fn new(timestamp: impl Into<PointerTimestamp>, directory: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            directory: directory.into(),
        }
    }

    fn usable_timestamp(&self) -> Option<&PointerTimestamp> {
        self.timestamp.as_ref().filter(|t| t.is_usable())
    }
}

/// The pointers of a pointer file, either as a list or keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointerList {
    /// `[{timestamp, directory}, ...]`
    List(Vec<Pointer>),
    /// `{"name": {timestamp, directory}, ...}`, in document order.
    Map(IndexMap<String, Pointer>),
}

impl Default for PointerList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl PointerList {
    /// Iterate the pointers in document order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Pointer> + '_> {
        match self {
            Self::List(list) => Box::new(list.iter()),
            Self::Map(map) => Box::new(map.values()),
        }
    }

    /// Number of pointers.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::List(list) => list.len(),
            Self::Map(map) => map.len(),
        }
    }

    /// Whether there are no pointers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pointer with the greatest timestamp.
    ///
    /// Pointers without a usable timestamp are skipped. A later pointer
    /// replaces the current pick only when it is strictly after it, so the
    /// first one in document order wins ties.
    #[must_use]
    pub fn latest(&self) -> Option<&Pointer> {
        let mut best: Option<(&Pointer, &PointerTimestamp)> = None;
        for pointer in self.iter() {
            let Some(timestamp) = pointer.usable_timestamp() else {
                continue;
            };
            match best {
                Some((_, current)) if !timestamp.is_after(current) => {}
                _ => best = Some((pointer, timestamp)),
            }
        }
        best.map(|(pointer, _)| pointer)
    }
}

/// Operator control block of the pointer file.
///
/// Both fields are read leniently: the operators edit this block by hand,
/// so a mistyped value must not make the whole pointer file unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// `"TRUE"` withholds results from the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<Value>,
    /// Free-form counting status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl Control {
    /// Whether the curtain is down.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.as_ref().and_then(Value::as_str) == Some(LOCKED_VALUE)
    }

    /// Normalized status string, if any.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(Value::as_str)
            .and_then(normalize_status)
    }
}

/// Map placeholder status values to `None`.
///
/// The spreadsheet the operators publish from writes `"null"` or `"."`
/// into empty cells.
#[must_use]
pub fn normalize_status(raw: &str) -> Option<&str> {
    match raw {
        "null" | "." => None,
        other => Some(other),
    }
}

/// Contents of the pointer file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestFile {
    /// Published snapshots.
    #[serde(default)]
    pub pointers: Option<PointerList>,
    /// Operator controls.
    #[serde(default)]
    pub control: Option<Control>,
}

impl LatestFile {
    /// Create a pointer file from a list of pointers.
    #[must_use]
    pub fn with_pointers(pointers: Vec<Pointer>) -> Self {
        Self {
            pointers: Some(PointerList::List(pointers)),
            control: None,
        }
    }

    /// Set the control block.
    #[must_use]
    pub fn with_control(mut self, control: Control) -> Self {
        self.control = Some(control);
        self
    }

    /// The active pointer, i.e. the one with the greatest timestamp.
    #[must_use]
    pub fn active_pointer(&self) -> Option<&Pointer> {
        self.pointers.as_ref().and_then(PointerList::latest)
    }

    /// Whether the operators have locked the results.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.control.as_ref().is_some_and(Control::is_locked)
    }

    /// Normalized counting status.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.control.as_ref().and_then(Control::status)
    }
}
