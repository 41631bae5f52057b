use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ApplicantRecord, Decision, RawValue};
use super::drift::{DriftVerdict, FeatureDrift};
use super::explain::FeatureContribution;
use super::service::ScoringContext;

/// Router builder exposing the scoring and drift-check endpoints.
pub fn scoring_router(context: Arc<ScoringContext>) -> Router {
    Router::new()
        .route("/api/v1/score", post(score_handler))
        .route("/api/v1/drift-check", post(drift_check_handler))
        .with_state(context)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRequest {
    pub(crate) record: ApplicantRecord,
    #[serde(default)]
    pub(crate) explain: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreResponse {
    pub(crate) probability: f64,
    pub(crate) decision: Decision,
    pub(crate) threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) explanation: Option<ExplanationView>,
}

/// Explanation payload trimmed to the strongest contributors, the shape the
/// dashboard renders.
#[derive(Debug, Serialize)]
pub(crate) struct ExplanationView {
    pub(crate) base_value: f64,
    pub(crate) top_features: Vec<FeatureContribution>,
}

pub(crate) async fn score_handler(
    State(context): State<Arc<ScoringContext>>,
    axum::Json(request): axum::Json<ScoreRequest>,
) -> Response {
    if !request.explain {
        return match context.score_record(&request.record) {
            Ok(score) => (
                StatusCode::OK,
                axum::Json(ScoreResponse {
                    probability: score.probability,
                    decision: score.decision,
                    threshold: score.threshold,
                    explanation: None,
                }),
            )
                .into_response(),
            Err(error) => schema_error_response(error),
        };
    }

    match context.score_record_explained(&request.record) {
        Ok(scored) => {
            let explanation = scored.explanation.map(|explanation| ExplanationView {
                base_value: explanation.base_value,
                top_features: explanation.ranked(context.explain_top()),
            });
            (
                StatusCode::OK,
                axum::Json(ScoreResponse {
                    probability: scored.score.probability,
                    decision: scored.score.decision,
                    threshold: scored.score.threshold,
                    explanation,
                }),
            )
                .into_response()
        }
        Err(error) => schema_error_response(error),
    }
}

fn schema_error_response(error: super::features::SchemaError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct DriftCheckRequest {
    #[serde(default)]
    pub(crate) records: Vec<ApplicantRecord>,
    /// Alternative batch encoding: a CSV export with one header row of field
    /// names.
    #[serde(default)]
    pub(crate) csv: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DriftCheckResponse {
    pub(crate) verdict: DriftVerdict,
    pub(crate) sample_count: usize,
    pub(crate) min_samples: usize,
    pub(crate) flagged: usize,
    pub(crate) skipped_records: usize,
    pub(crate) features: Vec<FeatureDrift>,
    pub(crate) generated_at: DateTime<Utc>,
}

pub(crate) async fn drift_check_handler(
    State(context): State<Arc<ScoringContext>>,
    axum::Json(request): axum::Json<DriftCheckRequest>,
) -> Response {
    let mut records = request.records;
    if let Some(csv) = request.csv {
        let reader = Cursor::new(csv.into_bytes());
        match parse_record_csv(reader) {
            Ok(mut parsed) => records.append(&mut parsed),
            Err(error) => {
                let payload = json!({
                    "error": format!("invalid csv batch: {error}"),
                });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        }
    }

    let outcome = context.drift_check(&records);
    let response = DriftCheckResponse {
        verdict: outcome.report.verdict,
        sample_count: outcome.report.sample_count,
        min_samples: outcome.report.min_samples,
        flagged: outcome.report.flagged,
        skipped_records: outcome.skipped_records,
        features: outcome.report.features,
        generated_at: Utc::now(),
    };

    (StatusCode::OK, axum::Json(response)).into_response()
}

/// Parses a CSV export into raw applicant records. Empty cells become nulls
/// so the pipeline's imputation rules decide what happens to them.
pub fn parse_record_csv<R: std::io::Read>(reader: R) -> Result<Vec<ApplicantRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let mut record = ApplicantRecord::default();
        for (header, cell) in headers.iter().zip(row.iter()) {
            let value = if cell.is_empty() {
                RawValue::Null
            } else if let Ok(number) = cell.parse::<f64>() {
                RawValue::Number(number)
            } else {
                RawValue::Text(cell.to_string())
            };
            record.insert(header, value);
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells_parse_into_typed_raw_values() {
        let csv = "EXT_SOURCE_2,NAME_EDUCATION_TYPE,AMT_CREDIT\n0.71,Higher education,\n";
        let records = parse_record_csv(Cursor::new(csv.as_bytes())).expect("csv parses");

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("EXT_SOURCE_2"),
            Some(&RawValue::Number(0.71))
        );
        assert_eq!(
            records[0].get("NAME_EDUCATION_TYPE"),
            Some(&RawValue::Text("Higher education".to_string()))
        );
        assert_eq!(records[0].get("AMT_CREDIT"), Some(&RawValue::Null));
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let csv = "a,b\n1,2,3,4,5\n";
        assert!(parse_record_csv(Cursor::new(csv.as_bytes())).is_err());
    }
}
