use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Start/end recorded for fragments that are not anchored in time.
pub const UNTIMED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Sequence,
    Face,
    Topic,
    Entity,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Sequence => "sequence",
            FragmentKind::Face => "face",
            FragmentKind::Topic => "topic",
            FragmentKind::Entity => "entity",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fragment kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for FragmentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence" => Ok(FragmentKind::Sequence),
            "face" => Ok(FragmentKind::Face),
            "topic" => Ok(FragmentKind::Topic),
            "entity" => Ok(FragmentKind::Entity),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// An annotation extracted from MICO, before it is attached to a stored part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fragment {
    /// A temporal video segment (shot).
    Sequence { start: i64, end: i64 },
    /// A face bounding box within a temporal segment.
    Face {
        start: i64,
        end: i64,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
    Topic {
        label: String,
        reference: String,
        confidence: f64,
    },
    Entity {
        label: String,
        reference: String,
        #[serde(rename = "type")]
        entity_type: String,
        confidence: f64,
    },
}

impl Fragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            Fragment::Sequence { .. } => FragmentKind::Sequence,
            Fragment::Face { .. } => FragmentKind::Face,
            Fragment::Topic { .. } => FragmentKind::Topic,
            Fragment::Entity { .. } => FragmentKind::Entity,
        }
    }

    pub fn start(&self) -> i64 {
        match self {
            Fragment::Sequence { start, .. } | Fragment::Face { start, .. } => *start,
            Fragment::Topic { .. } | Fragment::Entity { .. } => UNTIMED,
        }
    }

    pub fn end(&self) -> i64 {
        match self {
            Fragment::Sequence { end, .. } | Fragment::Face { end, .. } => *end,
            Fragment::Topic { .. } | Fragment::Entity { .. } => UNTIMED,
        }
    }
}
