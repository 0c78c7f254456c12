//! Core data models for claim cost prediction

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Breed id every unknown breed is remapped to
pub const FALLBACK_BREED: i64 = 0;

/// Column names of a raw record, in file order
pub const RAW_COLUMNS: &[&str] = &[
    "pet_breed_id",
    "birth",
    "gender",
    "neuter_yn",
    "weight_kg",
    "claim_price",
    "created_at",
    "disease_name",
];

/// Columns that must be present in every retrieved dataset
pub const REQUIRED_COLUMNS: &[&str] = &["pet_breed_id", "birth", "created_at"];

/// One insurance claim row as retrieved from the data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub pet_breed_id: i64,
    pub birth: NaiveDate,
    pub gender: Option<String>,
    pub neuter_yn: Option<String>,
    pub weight_kg: Option<f64>,
    /// Training target; absent on inference requests
    pub claim_price: Option<f64>,
    #[serde(with = "observed_at")]
    pub created_at: NaiveDateTime,
    pub disease_name: Option<String>,
}

/// A record after feature engineering: age computed, breed remapped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub pet_breed_id: i64,
    pub gender: Option<String>,
    pub neuter_yn: Option<String>,
    pub age_days: i64,
    pub weight_kg: Option<f64>,
}

impl FeatureRow {
    /// Categorical value of a named column, as the encoder sees it
    pub fn categorical(&self, column: &str) -> Option<Option<String>> {
        match column {
            "pet_breed_id" => Some(Some(self.pet_breed_id.to_string())),
            "gender" => Some(self.gender.clone()),
            "neuter_yn" => Some(self.neuter_yn.clone()),
            _ => None,
        }
    }

    /// Numeric value of a named column, as the encoder sees it
    pub fn numeric(&self, column: &str) -> Option<Option<f64>> {
        match column {
            "age" => Some(Some(self.age_days as f64)),
            "weight_kg" => Some(self.weight_kg),
            _ => None,
        }
    }
}

/// Fixed-width encoded representation fed to the regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Prediction returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub pet_breed_id: i64,
    pub age: i64,
    pub gender: Option<String>,
    pub neuter_yn: Option<String>,
    pub weight_kg: Option<f64>,
    pub predicted_claim_price: f64,
    pub model_tag: String,
}

/// Whole years as reported to clients (30-day months, 12-month years)
pub fn age_in_years(age_days: i64) -> i64 {
    age_days / 30 / 12
}

/// Serde adapter accepting `2024-01-31 10:00:00` as written by the claims
/// database export, and ISO `T`-separated timestamps.
pub mod observed_at {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| raw.parse::<NaiveDateTime>())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_in_years() {
        assert_eq!(age_in_years(359), 0);
        assert_eq!(age_in_years(360), 1);
        assert_eq!(age_in_years(800), 2);
    }

    #[test]
    fn test_observed_at_accepts_both_formats() {
        let json = r#"{"pet_breed_id":1,"birth":"2020-01-01","gender":null,"neuter_yn":null,
            "weight_kg":null,"claim_price":null,"created_at":"2020-01-31 00:00:00","disease_name":null}"#;
        let rec: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.created_at.to_string(), "2020-01-31 00:00:00");

        let iso = json.replace("2020-01-31 00:00:00", "2020-01-31T00:00:00");
        let rec2: RawRecord = serde_json::from_str(&iso).unwrap();
        assert_eq!(rec, rec2);
    }

    #[test]
    fn test_feature_row_column_lookup() {
        let row = FeatureRow {
            pet_breed_id: 1144,
            gender: Some("F".into()),
            neuter_yn: None,
            age_days: 30,
            weight_kg: Some(4.2),
        };
        assert_eq!(row.categorical("pet_breed_id"), Some(Some("1144".to_string())));
        assert_eq!(row.categorical("neuter_yn"), Some(None));
        assert_eq!(row.numeric("age"), Some(Some(30.0)));
        assert!(row.numeric("height").is_none());
    }
}
