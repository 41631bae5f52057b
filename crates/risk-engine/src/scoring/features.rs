use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicantRecord, FeatureVector, RawValue};

/// Encoding rule for one raw field, captured at training time and shipped
/// inside the model artifact. Request-time encoding must never diverge from
/// this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureEncoding {
    Numeric {
        /// Training-time imputation value for missing fields. Absent means
        /// the field is required.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impute: Option<f64>,
    },
    Categorical {
        /// Training-time category-to-code mapping.
        levels: BTreeMap<String, f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impute: Option<f64>,
    },
}

/// One column of the trained feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub encoding: FeatureEncoding,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>, impute: Option<f64>) -> Self {
        Self {
            name: name.into(),
            encoding: FeatureEncoding::Numeric { impute },
        }
    }

    pub fn categorical(
        name: impl Into<String>,
        levels: BTreeMap<String, f64>,
        impute: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            encoding: FeatureEncoding::Categorical { levels, impute },
        }
    }
}

/// Ordered feature schema the classifier was trained against. Length and
/// order never vary across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|spec| spec.name.as_str())
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.features.get(index).map(|spec| spec.name.as_str())
    }

    /// Encodes a raw record into the fixed-order numeric vector the
    /// classifier expects. Deterministic and side-effect free.
    pub fn build_features(&self, record: &ApplicantRecord) -> Result<FeatureVector, SchemaError> {
        let mut values = Vec::with_capacity(self.features.len());
        for spec in &self.features {
            values.push(encode_field(spec, record.get(&spec.name))?);
        }
        Ok(FeatureVector(values))
    }
}

fn encode_field(spec: &FeatureSpec, raw: Option<&RawValue>) -> Result<f64, SchemaError> {
    match &spec.encoding {
        FeatureEncoding::Numeric { impute } => match raw {
            None | Some(RawValue::Null) => {
                impute.ok_or_else(|| SchemaError::MissingField(spec.name.clone()))
            }
            Some(RawValue::Number(value)) => require_finite(&spec.name, *value),
            Some(RawValue::Boolean(flag)) => Ok(if *flag { 1.0 } else { 0.0 }),
            Some(RawValue::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| SchemaError::InvalidType {
                    field: spec.name.clone(),
                    expected: "number",
                })
                .and_then(|value| require_finite(&spec.name, value)),
        },
        FeatureEncoding::Categorical { levels, impute } => match raw {
            None | Some(RawValue::Null) => {
                impute.ok_or_else(|| SchemaError::MissingField(spec.name.clone()))
            }
            Some(RawValue::Text(text)) => {
                levels
                    .get(text.trim())
                    .copied()
                    .ok_or_else(|| SchemaError::UnknownCategory {
                        field: spec.name.clone(),
                        value: text.clone(),
                    })
            }
            Some(RawValue::Number(_)) | Some(RawValue::Boolean(_)) => {
                Err(SchemaError::InvalidType {
                    field: spec.name.clone(),
                    expected: "category label",
                })
            }
        },
    }
}

fn require_finite(field: &str, value: f64) -> Result<f64, SchemaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SchemaError::NonFinite {
            field: field.to_string(),
        })
    }
}

/// Malformed or incomplete applicant input. Recoverable: surfaces to the
/// caller as a 4xx response, never a crash.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("required field '{0}' is missing")]
    MissingField(String),
    #[error("field '{field}' has an invalid type: expected {expected}")]
    InvalidType { field: String, expected: &'static str },
    #[error("field '{field}' has unknown category '{value}'")]
    UnknownCategory { field: String, value: String },
    #[error("field '{field}' is not a finite number")]
    NonFinite { field: String },
    #[error("feature vector length {actual} does not match the trained schema length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        let mut levels = BTreeMap::new();
        levels.insert("Higher education".to_string(), 1.0);
        levels.insert("Secondary".to_string(), 0.0);

        FeatureSchema::new(vec![
            FeatureSpec::numeric("EXT_SOURCE_2", Some(0.5)),
            FeatureSpec::numeric("AMT_CREDIT", None),
            FeatureSpec::categorical("NAME_EDUCATION_TYPE", levels, None),
            FeatureSpec::numeric("FLAG_OWN_CAR", Some(0.0)),
        ])
    }

    fn record() -> ApplicantRecord {
        ApplicantRecord::from_pairs([
            ("EXT_SOURCE_2", RawValue::Number(0.71)),
            ("AMT_CREDIT", RawValue::Number(350000.0)),
            (
                "NAME_EDUCATION_TYPE",
                RawValue::Text("Higher education".to_string()),
            ),
            ("FLAG_OWN_CAR", RawValue::Boolean(true)),
        ])
    }

    #[test]
    fn build_features_is_deterministic_and_ordered() {
        let schema = schema();
        let record = record();

        let first = schema.build_features(&record).expect("features build");
        let second = schema.build_features(&record).expect("features build");

        assert_eq!(first, second);
        assert_eq!(first.values(), &[0.71, 350000.0, 1.0, 1.0]);
        assert_eq!(first.len(), schema.len());
    }

    #[test]
    fn missing_optional_field_uses_training_imputation() {
        let schema = schema();
        let mut record = record();
        record.fields.remove("EXT_SOURCE_2");

        let features = schema.build_features(&record).expect("features build");
        assert_eq!(features.values()[0], 0.5);
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let schema = schema();
        let mut record = record();
        record.fields.remove("AMT_CREDIT");

        match schema.build_features(&record) {
            Err(SchemaError::MissingField(field)) => assert_eq!(field, "AMT_CREDIT"),
            other => panic!("expected missing field error, got {other:?}"),
        }
    }

    #[test]
    fn null_required_field_is_not_silently_imputed() {
        let schema = schema();
        let mut record = record();
        record.insert("AMT_CREDIT", RawValue::Null);

        assert!(matches!(
            schema.build_features(&record),
            Err(SchemaError::MissingField(_))
        ));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let schema = schema();
        let mut record = record();
        record.insert("AMT_CREDIT", RawValue::Text(" 125000 ".to_string()));

        let features = schema.build_features(&record).expect("features build");
        assert_eq!(features.values()[1], 125000.0);
    }

    #[test]
    fn non_numeric_text_fails_coercion() {
        let schema = schema();
        let mut record = record();
        record.insert("AMT_CREDIT", RawValue::Text("a lot".to_string()));

        assert!(matches!(
            schema.build_features(&record),
            Err(SchemaError::InvalidType { .. })
        ));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let schema = schema();
        let mut record = record();
        record.insert(
            "NAME_EDUCATION_TYPE",
            RawValue::Text("Correspondence".to_string()),
        );

        match schema.build_features(&record) {
            Err(SchemaError::UnknownCategory { field, value }) => {
                assert_eq!(field, "NAME_EDUCATION_TYPE");
                assert_eq!(value, "Correspondence");
            }
            other => panic!("expected unknown category error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let schema = schema();
        let mut record = record();
        record.insert("AMT_CREDIT", RawValue::Number(f64::NAN));

        assert!(matches!(
            schema.build_features(&record),
            Err(SchemaError::NonFinite { .. })
        ));
    }
}
