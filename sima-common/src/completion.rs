//! Sound completion state
//!
//! A (sound, tier) pair is compared against the exercise's reference sound on
//! the same tier:
//!
//! | added | vs. reference | similarities | state      |
//! |-------|---------------|--------------|------------|
//! | 0     | any           | any          | empty      |
//! | n     | == n          | > 0          | complete   |
//! | n     | == n          | 0            | incomplete |
//! | n     | != n          | any          | incomplete |
//!
//! Across all tiers of an exercise a sound is complete only when every tier
//! that has reference annotations is complete.

use crate::db::models::{AnnotationState, Sound, Tier};
use crate::db::{annotations, exercises, similarities, sounds, tiers};
use crate::{Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Classify one (sound, tier) pair from its counts
pub fn derive_state(added: i64, reference: i64, similarities: i64) -> AnnotationState {
    if added == 0 {
        AnnotationState::Empty
    } else if added == reference && similarities > 0 {
        AnnotationState::Complete
    } else {
        AnnotationState::Incomplete
    }
}

/// Annotation counts for one (sound, tier) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCounts {
    pub added: i64,
    pub reference: i64,
    pub similarities: i64,
}

impl TierCounts {
    pub fn state(&self) -> AnnotationState {
        derive_state(self.added, self.reference, self.similarities)
    }
}

pub async fn tier_counts(conn: &mut SqliteConnection, sound: &Sound, tier_id: i64) -> Result<TierCounts> {
    let exercise = exercises::get_exercise(conn, sound.exercise_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("exercise {}", sound.exercise_id)))?;

    let reference = match exercise.reference_sound_id {
        Some(reference_id) => annotations::count_annotations(conn, reference_id, tier_id).await?,
        None => 0,
    };

    Ok(TierCounts {
        added: annotations::count_annotations(conn, sound.id, tier_id).await?,
        reference,
        similarities: similarities::count_similarities(conn, sound.id, tier_id).await?,
    })
}

/// State of one (sound, tier) pair
pub async fn tier_state(conn: &mut SqliteConnection, sound: &Sound, tier_id: i64) -> Result<AnnotationState> {
    Ok(tier_counts(conn, sound, tier_id).await?.state())
}

/// Fold per-tier counts into the state of the whole sound
pub fn aggregate_state(counts: &[TierCounts]) -> AnnotationState {
    if counts.iter().all(|c| c.added == 0) {
        return AnnotationState::Empty;
    }

    let mut referenced = counts.iter().filter(|c| c.reference > 0).peekable();
    if referenced.peek().is_none() {
        return AnnotationState::Incomplete;
    }
    if referenced.all(|c| c.state() == AnnotationState::Complete) {
        AnnotationState::Complete
    } else {
        AnnotationState::Incomplete
    }
}

/// Recompute and store the state of a sound across the given tiers
pub async fn refresh_sound(conn: &mut SqliteConnection, sound: &Sound, tiers: &[Tier]) -> Result<AnnotationState> {
    let mut counts = Vec::with_capacity(tiers.len());
    for tier in tiers {
        counts.push(tier_counts(conn, sound, tier.id).await?);
    }

    let state = aggregate_state(&counts);
    if state != sound.annotation_state {
        sounds::set_annotation_state(conn, sound.id, state).await?;
        debug!("Sound {} state {} -> {}", sound.id, sound.annotation_state, state);
    }
    Ok(state)
}

/// Tally of a data set refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub empty: usize,
    pub incomplete: usize,
    pub complete: usize,
    pub discarded: usize,
}

impl CompletionSummary {
    fn record(&mut self, state: AnnotationState) {
        match state {
            AnnotationState::Empty => self.empty += 1,
            AnnotationState::Incomplete => self.incomplete += 1,
            AnnotationState::Complete => self.complete += 1,
        }
    }
}

/// Recompute the state of every sound in a data set
///
/// Reference and discarded sounds keep whatever state they had.
pub async fn refresh_data_set(pool: &SqlitePool, data_set_name: &str) -> Result<CompletionSummary> {
    let mut conn = pool.acquire().await?;
    let data_set = exercises::get_data_set_by_name(&mut conn, data_set_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("data set {:?}", data_set_name)))?;

    let mut summary = CompletionSummary::default();
    for exercise in exercises::list_exercises_for_data_set(&mut conn, data_set.id).await? {
        let exercise_tiers = tiers::list_tiers_for_exercise(&mut conn, exercise.id).await?;
        for sound in sounds::list_sounds_for_exercise(&mut conn, exercise.id).await? {
            if exercise.reference_sound_id == Some(sound.id) {
                continue;
            }
            if sound.is_discarded {
                summary.discarded += 1;
                continue;
            }
            let state = refresh_sound(&mut conn, &sound, &exercise_tiers).await?;
            summary.record(state);
        }
    }

    info!(
        "Data set {:?} refreshed: {} complete, {} incomplete, {} empty, {} discarded",
        data_set_name, summary.complete, summary.incomplete, summary.empty, summary.discarded
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(added: i64, reference: i64, similarities: i64) -> TierCounts {
        TierCounts {
            added,
            reference,
            similarities,
        }
    }

    #[test]
    fn test_derive_state() {
        assert_eq!(derive_state(0, 0, 0), AnnotationState::Empty);
        assert_eq!(derive_state(0, 3, 0), AnnotationState::Empty);
        assert_eq!(derive_state(3, 3, 1), AnnotationState::Complete);
        assert_eq!(derive_state(3, 3, 0), AnnotationState::Incomplete);
        assert_eq!(derive_state(2, 3, 2), AnnotationState::Incomplete);
        assert_eq!(derive_state(4, 3, 4), AnnotationState::Incomplete);
    }

    #[test]
    fn test_aggregate_requires_every_referenced_tier() {
        assert_eq!(aggregate_state(&[]), AnnotationState::Empty);
        assert_eq!(aggregate_state(&[counts(0, 2, 0), counts(0, 0, 0)]), AnnotationState::Empty);

        let done = counts(2, 2, 1);
        let partial = counts(1, 2, 0);
        let unreferenced = counts(5, 0, 0);

        assert_eq!(aggregate_state(&[done, unreferenced]), AnnotationState::Complete);
        assert_eq!(aggregate_state(&[done, partial]), AnnotationState::Incomplete);
        assert_eq!(aggregate_state(&[unreferenced]), AnnotationState::Incomplete);
    }
}
