//! Read-side views over stored annotations
//!
//! Pure queries: nothing here writes or propagates.

use crate::db::models::{Annotation, AnnotationSimilarity, Sound, User};
use crate::db::{annotations, exercises, similarities, sounds, tiers};
use crate::time::Seconds;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

/// One record of `annotations_as_dict`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SoundAnnotation {
    /// Annotation judged against a reference annotation
    Linked {
        start_time: Seconds,
        end_time: Seconds,
        ref_start_time: Seconds,
        ref_end_time: Seconds,
        value: Value,
    },
    Bare {
        start_time: Seconds,
        end_time: Seconds,
        name: String,
    },
}

/// Collapse a `{"value": v}` payload to `v`; keep richer payloads whole
fn payload_value(values: &Map<String, Value>) -> Value {
    match values.get("value") {
        Some(value) if values.len() == 1 => value.clone(),
        _ => Value::Object(values.clone()),
    }
}

/// A sound's annotations grouped by tier name
///
/// Every tier of the exercise gets a key, even when it holds nothing.
pub async fn annotations_as_dict(
    conn: &mut SqliteConnection,
    sound: &Sound,
) -> Result<BTreeMap<String, Vec<SoundAnnotation>>> {
    let mut result = BTreeMap::new();
    for tier in tiers::list_tiers_for_exercise(conn, sound.exercise_id).await? {
        let mut records = Vec::new();
        for annotation in annotations::list_annotations(conn, sound.id, tier.id).await? {
            records.push(sound_annotation(conn, &annotation).await?);
        }
        result.insert(tier.name, records);
    }
    Ok(result)
}

async fn sound_annotation(conn: &mut SqliteConnection, annotation: &Annotation) -> Result<SoundAnnotation> {
    let links = similarities::list_similarities_for(conn, annotation.id).await?;
    if let Some(link) = links.first() {
        if let Some(reference) = annotations::get_annotation(conn, link.reference_id).await? {
            return Ok(SoundAnnotation::Linked {
                start_time: annotation.start,
                end_time: annotation.end,
                ref_start_time: reference.start,
                ref_end_time: reference.end,
                value: payload_value(&link.values),
            });
        }
    }

    Ok(SoundAnnotation::Bare {
        start_time: annotation.start,
        end_time: annotation.end,
        name: annotation.name.clone(),
    })
}

/// One segment of a task view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSegment {
    pub id: i64,
    pub start: Seconds,
    pub end: Seconds,
    pub annotation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,
    #[serde(rename = "manyValues", skip_serializing_if = "Option::is_none")]
    pub many_values: Option<Vec<Value>>,
}

/// Segments of a (sound, tier) pair as seen by `viewer`
///
/// Staff see the first recorded judgment, other users their own. All
/// judgments are listed in `manyValues` when there is more than one.
pub async fn annotations_for_tier(
    conn: &mut SqliteConnection,
    sound_id: i64,
    tier_id: i64,
    viewer: Option<&User>,
) -> Result<Vec<TaskSegment>> {
    let mut segments = Vec::new();
    for annotation in annotations::list_annotations(conn, sound_id, tier_id).await? {
        let links = similarities::list_similarities_for(conn, annotation.id).await?;
        let shown: Option<&AnnotationSimilarity> = match viewer {
            Some(user) if user.is_staff => links.first(),
            Some(user) => links.iter().find(|link| link.user_id == user.id),
            None => None,
        };
        let many_values = match viewer {
            Some(_) if links.len() > 1 => Some(links.iter().map(|l| payload_value(&l.values)).collect()),
            _ => None,
        };

        segments.push(TaskSegment {
            id: annotation.id,
            start: annotation.start,
            end: annotation.end,
            annotation: annotation.name,
            similarity: shown.map(|link| payload_value(&link.values)),
            reference: shown.map(|link| link.reference_id),
            many_values,
        });
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedSimilarity {
    pub reference_annotation: i64,
    pub similarity_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedAnnotation {
    pub start_time: Seconds,
    pub end_time: Seconds,
    pub similarity: Option<ExportedSimilarity>,
}

/// sound filename → tier name → annotation id → annotation
pub type ExerciseAnnotations = BTreeMap<String, BTreeMap<String, BTreeMap<i64, ExportedAnnotation>>>;

/// Every annotation of every sound in an exercise
pub async fn exercise_annotations(conn: &mut SqliteConnection, exercise_id: i64) -> Result<ExerciseAnnotations> {
    if exercises::get_exercise(conn, exercise_id).await?.is_none() {
        return Err(Error::NotFound(format!("exercise {}", exercise_id)));
    }
    let exercise_tiers = tiers::list_tiers_for_exercise(conn, exercise_id).await?;

    let mut result = ExerciseAnnotations::new();
    for sound in sounds::list_sounds_for_exercise(conn, exercise_id).await? {
        let mut by_tier = BTreeMap::new();
        for tier in &exercise_tiers {
            let mut by_id = BTreeMap::new();
            for annotation in annotations::list_annotations(conn, sound.id, tier.id).await? {
                let links = similarities::list_similarities_for(conn, annotation.id).await?;
                let similarity = links.first().map(|link| ExportedSimilarity {
                    reference_annotation: link.reference_id,
                    similarity_value: payload_value(&link.values),
                });
                by_id.insert(
                    annotation.id,
                    ExportedAnnotation {
                        start_time: annotation.start,
                        end_time: annotation.end,
                        similarity,
                    },
                );
            }
            by_tier.insert(tier.name.clone(), by_id);
        }
        result.insert(sound.filename, by_tier);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::annotations::NewAnnotation;
    use crate::db::tiers::NewTier;
    use crate::db::{init_in_memory, users};
    use serde_json::json;

    #[test]
    fn test_payload_value_collapses_single_value() {
        let mut single = Map::new();
        single.insert("value".to_string(), json!(3));
        assert_eq!(payload_value(&single), json!(3));

        let mut keyed = Map::new();
        keyed.insert("pitch".to_string(), json!(1));
        keyed.insert("rhythm".to_string(), json!(2));
        assert_eq!(payload_value(&keyed), json!({"pitch": 1, "rhythm": 2}));
    }

    #[tokio::test]
    async fn test_task_view_depends_on_viewer() {
        let pool = init_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let data_set = exercises::create_data_set(&mut conn, "ds").await.unwrap();
        let exercise = exercises::create_exercise(&mut conn, data_set.id, "ex").await.unwrap();
        let tier = tiers::create_tier(&mut conn, &NewTier::new(exercise.id, "note")).await.unwrap();
        let sound = sounds::create_sound(&mut conn, exercise.id, "a.wav", "a.wav").await.unwrap();
        let staff = users::create_user(&mut conn, "staff", true).await.unwrap();
        let alice = users::create_user(&mut conn, "alice", false).await.unwrap();
        let bob = users::create_user(&mut conn, "bob", false).await.unwrap();

        let new = |user_id| NewAnnotation {
            sound_id: sound.id,
            tier_id: tier.id,
            start: Seconds::from_millis(1000),
            end: Seconds::from_millis(2000),
            name: "n",
            user_id,
        };
        let reference = annotations::insert_annotation(&mut conn, &new(staff.id)).await.unwrap();
        let annotated = annotations::insert_annotation(&mut conn, &new(alice.id)).await.unwrap();

        for (user, value) in [(&bob, 1), (&alice, 2)] {
            let mut values = Map::new();
            values.insert("value".to_string(), json!(value));
            similarities::insert_similarity(&mut conn, reference.id, annotated.id, user.id, &values)
                .await
                .unwrap();
        }

        let as_staff = annotations_for_tier(&mut conn, sound.id, tier.id, Some(&staff)).await.unwrap();
        assert_eq!(as_staff[1].similarity, Some(json!(1)));
        assert_eq!(as_staff[1].many_values, Some(vec![json!(1), json!(2)]));

        let as_alice = annotations_for_tier(&mut conn, sound.id, tier.id, Some(&alice)).await.unwrap();
        assert_eq!(as_alice[1].similarity, Some(json!(2)));
        assert_eq!(as_alice[1].reference, Some(reference.id));
        assert!(as_alice[0].similarity.is_none());

        let anonymous = annotations_for_tier(&mut conn, sound.id, tier.id, None).await.unwrap();
        assert!(anonymous.iter().all(|s| s.similarity.is_none() && s.many_values.is_none()));

        let dict = annotations_as_dict(&mut conn, &sound).await.unwrap();
        let records = &dict["note"];
        assert!(matches!(records[0], SoundAnnotation::Bare { .. }));
        assert_eq!(
            serde_json::to_value(&records[1]).unwrap(),
            json!({"start_time": 1.0, "end_time": 2.0, "ref_start_time": 1.0, "ref_end_time": 2.0, "value": 1})
        );
    }
}
