//! Historical claim statistics per breed and age

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{age_in_years, RawRecord};
use crate::preprocess::calculate_age_days;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeGroupStats {
    pub age: i64,
    pub claims: usize,
    /// None when no row in the group carries a claim price
    pub mean_claim_price: Option<f64>,
    /// Ties resolve to the alphabetically first diagnosis
    pub most_common_disease: Option<String>,
}

#[derive(Default)]
struct Accumulator {
    claims: usize,
    price_sum: f64,
    priced: usize,
    diseases: BTreeMap<String, usize>,
}

pub struct BreedStatistics;

impl BreedStatistics {
    /// Per-age statistics for `breed`, ordered by age
    pub fn aggregate(records: &[RawRecord], breed: i64) -> LifecycleResult<Vec<AgeGroupStats>> {
        let mut groups: BTreeMap<i64, Accumulator> = BTreeMap::new();
        for record in records.iter().filter(|r| r.pet_breed_id == breed) {
            let age = age_in_years(calculate_age_days(record.birth, record.created_at)?);
            let acc = groups.entry(age).or_default();
            acc.claims += 1;
            if let Some(price) = record.claim_price {
                acc.price_sum += price;
                acc.priced += 1;
            }
            if let Some(disease) = &record.disease_name {
                *acc.diseases.entry(disease.clone()).or_default() += 1;
            }
        }

        if groups.is_empty() {
            return Err(LifecycleError::UnknownGroup(format!("pet_breed_id={}", breed)));
        }

        Ok(groups
            .into_iter()
            .map(|(age, acc)| AgeGroupStats {
                age,
                claims: acc.claims,
                mean_claim_price: (acc.priced > 0).then(|| acc.price_sum / acc.priced as f64),
                most_common_disease: mode(&acc.diseases),
            })
            .collect())
    }

    /// Statistics for one (breed, age in years) group
    pub fn lookup(records: &[RawRecord], breed: i64, age: i64) -> LifecycleResult<AgeGroupStats> {
        Self::aggregate(records, breed)?
            .into_iter()
            .find(|g| g.age == age)
            .ok_or_else(|| LifecycleError::UnknownGroup(format!("pet_breed_id={}, age={}", breed, age)))
    }
}

fn mode(counts: &BTreeMap<String, usize>) -> Option<String> {
    // BTreeMap iterates alphabetically; keep the first maximum.
    let mut best: Option<(&String, usize)> = None;
    for (name, &count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.clone())
}
