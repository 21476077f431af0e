//! Working with the chain of translation records of a whole sequence.

use crate::{estimator::Translation, sequence::TranslationRecord};
use nalgebra::Vector2;

/// Position of every frame relative to the first one.
///
/// Walks the records in order, so each record is expected to continue where
/// the previous one ended.
pub fn positions(records: &[TranslationRecord]) -> Vec<(String, Translation)> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let mut position = Translation::ZERO;
    let mut positions = Vec::with_capacity(records.len() + 1);
    positions.push((first.frame.clone(), position));
    for record in records {
        position += record.translation;
        positions.push((record.reference.clone(), position));
    }

    positions
}

/// Replaces every translation by the mean over a centered window.
///
/// The window holds `window / 2` records on each side and is clipped at both
/// ends of the chain. Fallback records take part with their zero translation.
pub fn smooth(records: &[TranslationRecord], window: usize) -> Vec<TranslationRecord> {
    let half = window / 2;
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let neighbours = &records[i.saturating_sub(half)..(i + half + 1).min(records.len())];
            let mean = neighbours
                .iter()
                .map(|r| r.translation.to_vector())
                .sum::<Vector2<f64>>()
                / neighbours.len() as f64;

            TranslationRecord {
                translation: Translation::from_rounded(mean),
                ..record.clone()
            }
        })
        .collect()
}
