//! Database models

use crate::time::Seconds;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            is_staff: row.try_get("is_staff")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSet {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub data_set_id: i64,
    /// Ground-truth sound other sounds are compared against
    pub reference_sound_id: Option<i64>,
    pub reference_pitch_sound: Option<String>,
}

impl Exercise {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            data_set_id: row.try_get("data_set_id")?,
            reference_sound_id: row.try_get("reference_sound_id")?,
            reference_pitch_sound: row.try_get("reference_pitch_sound")?,
        })
    }
}

/// A named annotation track within an exercise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier {
    pub id: i64,
    pub name: String,
    pub exercise_id: i64,
    /// Hierarchical ("sync") parent
    pub parent_tier_id: Option<i64>,
    /// One-directional ("special") parent
    pub special_parent_tier_id: Option<i64>,
    /// Annotations are instants rather than intervals
    pub point_annotations: bool,
    pub entire_sound: bool,
    /// Named dimensions allowed in similarity payloads
    pub similarity_keys: Vec<String>,
}

impl Tier {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let keys: Option<String> = row.try_get("similarity_keys")?;
        let similarity_keys = match keys.as_deref() {
            None | Some("") => Vec::new(),
            Some(text) => serde_json::from_str(text)?,
        };

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            exercise_id: row.try_get("exercise_id")?,
            parent_tier_id: row.try_get("parent_tier_id")?,
            special_parent_tier_id: row.try_get("special_parent_tier_id")?,
            point_annotations: row.try_get("point_annotations")?,
            entire_sound: row.try_get("entire_sound")?,
            similarity_keys,
        })
    }
}

/// Derived completion status of a sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationState {
    #[default]
    Empty,
    Incomplete,
    Complete,
}

impl AnnotationState {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationState::Empty => "empty",
            AnnotationState::Incomplete => "incomplete",
            AnnotationState::Complete => "complete",
        }
    }
}

impl fmt::Display for AnnotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "empty" => Ok(AnnotationState::Empty),
            "incomplete" => Ok(AnnotationState::Incomplete),
            "complete" => Ok(AnnotationState::Complete),
            other => Err(Error::Internal(format!("unknown annotation state: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sound {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub exercise_id: i64,
    pub is_discarded: bool,
    /// Written by two paths with different scopes: a task submission stores
    /// the state of the submitted tier only, while a data set refresh stores
    /// the state across every tier of the exercise. The last writer wins; use
    /// [`crate::completion::tier_state`] for a specific tier.
    pub annotation_state: AnnotationState,
}

impl Sound {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let state: String = row.try_get("annotation_state")?;
        Ok(Self {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            original_filename: row.try_get("original_filename")?,
            exercise_id: row.try_get("exercise_id")?,
            is_discarded: row.try_get("is_discarded")?,
            annotation_state: state.parse()?,
        })
    }
}

/// One time-aligned segment on a (sound, tier) pair
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub name: String,
    pub start: Seconds,
    pub end: Seconds,
    pub sound_id: i64,
    pub tier_id: i64,
    pub user_id: i64,
}

impl Annotation {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            start: Seconds::from_millis(row.try_get("start_ms")?),
            end: Seconds::from_millis(row.try_get("end_ms")?),
            sound_id: row.try_get("sound_id")?,
            tier_id: row.try_get("tier_id")?,
            user_id: row.try_get("user_id")?,
        })
    }

    pub fn bounds(&self) -> (Seconds, Seconds) {
        (self.start, self.end)
    }
}

/// A user's judgment linking a reference annotation to a similar one
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnnotationSimilarity {
    pub id: i64,
    pub reference_id: i64,
    pub similar_id: i64,
    pub user_id: i64,
    pub values: Map<String, Value>,
}

impl AnnotationSimilarity {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let text: String = row.try_get("similarity")?;
        let values = match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        Ok(Self {
            id: row.try_get("id")?,
            reference_id: row.try_get("reference_id")?,
            similar_id: row.try_get("similar_id")?,
            user_id: row.try_get("user_id")?,
            values,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}
