//! Stateless feature engineering
//!
//! Computes age from birth and observation dates and remaps breed ids
//! outside the known vocabulary to the fallback breed, so that the encoded
//! width never depends on which breeds appear in a request.

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{FeatureRow, RawRecord, FALLBACK_BREED};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Closed set of breed ids known to a fitted preprocessor.
///
/// The fallback breed is always a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    breeds: BTreeSet<i64>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Vocabulary {
    pub fn new(breeds: impl IntoIterator<Item = i64>) -> Self {
        let mut breeds: BTreeSet<i64> = breeds.into_iter().collect();
        breeds.insert(FALLBACK_BREED);
        Self { breeds }
    }

    /// Breeds observed in `records`, plus the fallback
    pub fn from_records(records: &[RawRecord]) -> Self {
        Self::new(records.iter().map(|r| r.pet_breed_id))
    }

    pub fn contains(&self, breed: i64) -> bool {
        self.breeds.contains(&breed)
    }

    /// Map an unknown breed to the fallback, never rejecting it
    pub fn remap(&self, breed: i64) -> i64 {
        if self.contains(breed) {
            breed
        } else {
            FALLBACK_BREED
        }
    }

    pub fn len(&self) -> usize {
        self.breeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breeds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.breeds.iter().copied()
    }
}

/// Age in whole days between birth and observation; negative ages are rejected
pub fn calculate_age_days(birth: NaiveDate, observed: NaiveDateTime) -> LifecycleResult<i64> {
    let days = (observed.date() - birth).num_days();
    if days < 0 {
        return Err(LifecycleError::InvalidAge {
            birth: birth.to_string(),
            observed: observed.to_string(),
        });
    }
    Ok(days)
}

/// Feature engineering independent of any fitted numeric state
pub fn preprocess(records: &[RawRecord], vocabulary: &Vocabulary) -> LifecycleResult<Vec<FeatureRow>> {
    records
        .iter()
        .map(|r| {
            Ok(FeatureRow {
                pet_breed_id: vocabulary.remap(r.pet_breed_id),
                gender: r.gender.clone(),
                neuter_yn: r.neuter_yn.clone(),
                age_days: calculate_age_days(r.birth, r.created_at)?,
                weight_kg: r.weight_kg,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(breed: i64, birth: &str, observed: &str) -> RawRecord {
        RawRecord {
            pet_breed_id: breed,
            birth: birth.parse().unwrap(),
            gender: Some("M".into()),
            neuter_yn: Some("y".into()),
            weight_kg: Some(5.0),
            claim_price: None,
            created_at: format!("{}T00:00:00", observed).parse().unwrap(),
            disease_name: None,
        }
    }

    #[test]
    fn test_age_in_days() {
        let birth = "2020-01-01".parse().unwrap();
        let observed = "2020-01-31T12:30:00".parse().unwrap();
        assert_eq!(calculate_age_days(birth, observed).unwrap(), 30);
    }

    #[test]
    fn test_same_day_is_zero() {
        let birth = "2021-06-01".parse().unwrap();
        let observed = "2021-06-01T23:59:59".parse().unwrap();
        assert_eq!(calculate_age_days(birth, observed).unwrap(), 0);
    }

    #[test]
    fn test_negative_age_rejected() {
        let birth = "2020-02-01".parse().unwrap();
        let observed = "2020-01-31T00:00:00".parse().unwrap();
        assert!(matches!(
            calculate_age_days(birth, observed),
            Err(LifecycleError::InvalidAge { .. })
        ));
    }

    #[test]
    fn test_vocabulary_always_has_fallback() {
        let vocab = Vocabulary::new(vec![1144, 1121]);
        assert!(vocab.contains(FALLBACK_BREED));
        assert_eq!(vocab.len(), 3);
        assert!(Vocabulary::default().contains(FALLBACK_BREED));
    }

    #[test]
    fn test_unknown_breed_remapped() {
        let vocab = Vocabulary::new(vec![1144]);
        let rows = preprocess(
            &[record(1144, "2020-01-01", "2021-01-01"), record(9999, "2020-01-01", "2021-01-01")],
            &vocab,
        )
        .unwrap();
        assert_eq!(rows[0].pet_breed_id, 1144);
        assert_eq!(rows[1].pet_breed_id, FALLBACK_BREED);
        assert_eq!(rows[0].age_days, 366);
    }

    #[test]
    fn test_preprocess_fails_on_invalid_age() {
        let vocab = Vocabulary::default();
        let result = preprocess(&[record(1, "2022-01-01", "2021-01-01")], &vocab);
        assert!(result.is_err());
    }
}
