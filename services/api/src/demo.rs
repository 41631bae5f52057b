use crate::infra::{demo_model_artifact, demo_reference_distribution, demo_settings};
use clap::Args;
use risk_engine::config::AppConfig;
use risk_engine::error::AppError;
use risk_engine::scoring::{
    parse_record_csv, ApplicantRecord, DriftCheckOutcome, Explanation, RawValue, ScoringContext,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Path to a JSON file holding one applicant record (field -> value map)
    pub(crate) record: PathBuf,
    /// Attach a per-feature explanation to the output
    #[arg(long)]
    pub(crate) explain: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DriftReportArgs {
    /// Path to a CSV batch of applicant records with one header row of field names
    pub(crate) batch: PathBuf,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the drift-monitoring portion of the demo
    #[arg(long)]
    pub(crate) skip_drift: bool,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let context = ScoringContext::load(&config.scoring)?;

    let raw = fs::read_to_string(&args.record)?;
    let record: ApplicantRecord = serde_json::from_str(&raw)
        .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;

    if args.explain {
        match context.score_record_explained(&record) {
            Ok(scored) => {
                render_score(&scored.score);
                match scored.explanation {
                    Some(explanation) => {
                        render_explanation(&explanation, context.explain_top())
                    }
                    None => println!("Explanation unavailable for this record"),
                }
            }
            Err(err) => println!("Record rejected: {err}"),
        }
    } else {
        match context.score_record(&record) {
            Ok(score) => render_score(&score),
            Err(err) => println!("Record rejected: {err}"),
        }
    }

    Ok(())
}

pub(crate) fn run_drift_report(args: DriftReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let context = ScoringContext::load(&config.scoring)?;

    let file = fs::File::open(&args.batch)?;
    let records = parse_record_csv(file)
        .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;

    let outcome = context.drift_check(&records);
    render_drift(&outcome);

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let context = Arc::new(
        ScoringContext::from_parts(
            demo_model_artifact(),
            demo_reference_distribution(),
            &demo_settings(),
        )
        .map_err(AppError::from)?,
    );

    println!("Credit risk scoring demo (built-in artifacts)");
    let metadata = context.metadata();
    println!(
        "Model: {} | {} features | {} trees | threshold {:.2}",
        metadata.model_kind, metadata.feature_count, metadata.tree_count, metadata.threshold
    );

    println!("\nGlobal feature importances");
    for entry in context.global_importance() {
        println!("- {}: {:.3}", entry.feature, entry.importance);
    }

    for (label, record) in [
        ("Low-risk applicant", low_risk_applicant()),
        ("High-risk applicant", high_risk_applicant()),
    ] {
        println!("\n{label}");
        match context.score_record_explained(&record) {
            Ok(scored) => {
                render_score(&scored.score);
                if let Some(explanation) = scored.explanation {
                    render_explanation(&explanation, context.explain_top());
                }
                match serde_json::to_string_pretty(&scored.score) {
                    Ok(json) => println!("  Response payload:\n{json}"),
                    Err(err) => println!("  Response payload unavailable: {err}"),
                }
            }
            Err(err) => println!("  Record rejected: {err}"),
        }
    }

    if args.skip_drift {
        return Ok(());
    }

    println!("\nDrift check: batch drawn from the training distribution");
    render_drift(&context.drift_check(&stable_batch()));

    println!("\nDrift check: same batch with payment rates shifted upward");
    render_drift(&context.drift_check(&shifted_batch()));

    Ok(())
}

fn render_score(score: &risk_engine::scoring::ScoreResult) {
    println!(
        "- default probability {:.4} vs threshold {:.2} -> {}",
        score.probability,
        score.threshold,
        score.decision.label()
    );
}

fn render_explanation(explanation: &Explanation, limit: usize) {
    println!(
        "  Key factors (base value {:.4}):",
        explanation.base_value
    );
    for contribution in explanation.ranked(limit) {
        let direction = match contribution.contribution > 0.0 {
            true => "raises risk",
            false => "lowers risk",
        };
        println!(
            "    - {} = {:.2}: {:+.4} ({direction})",
            contribution.feature, contribution.value, contribution.contribution
        );
    }
}

fn render_drift(outcome: &DriftCheckOutcome) {
    let report = &outcome.report;
    println!(
        "- verdict: {} ({} samples, {} skipped, {} flagged)",
        report.verdict.label(),
        report.sample_count,
        outcome.skipped_records,
        report.flagged
    );
    for feature in &report.features {
        let marker = if feature.drifted { " [drifted]" } else { "" };
        println!(
            "    - {}: PSI {:.4} (threshold {:.2}){marker}",
            feature.feature, feature.psi, feature.threshold
        );
    }
}

fn low_risk_applicant() -> ApplicantRecord {
    ApplicantRecord::from_pairs([
        ("EXT_SOURCE_2", RawValue::Number(0.78)),
        ("EXT_SOURCE_3", RawValue::Number(0.688)),
        ("PAYMENT_RATE", RawValue::Number(0.05)),
        ("AMT_ANNUITY", RawValue::Number(12000.0)),
        ("DAYS_EMPLOYED", RawValue::Number(-3000.0)),
        (
            "NAME_EDUCATION_TYPE",
            RawValue::Text("Higher education".to_string()),
        ),
    ])
}

fn high_risk_applicant() -> ApplicantRecord {
    ApplicantRecord::from_pairs([
        ("EXT_SOURCE_2", RawValue::Number(0.21)),
        ("EXT_SOURCE_3", RawValue::Number(0.30)),
        ("PAYMENT_RATE", RawValue::Number(0.11)),
        ("AMT_ANNUITY", RawValue::Number(41000.0)),
        ("DAYS_EMPLOYED", RawValue::Number(-200.0)),
        (
            "NAME_EDUCATION_TYPE",
            RawValue::Text("Secondary".to_string()),
        ),
    ])
}

/// Forty records whose per-feature bucket counts reproduce the built-in
/// reference proportions exactly.
fn stable_batch() -> Vec<ApplicantRecord> {
    let ext_source_2 = pool(&[(0.2, 8), (0.4, 12), (0.6, 12), (0.8, 8)]);
    let ext_source_3 = pool(&[(0.25, 10), (0.45, 12), (0.65, 10), (0.8, 8)]);
    let payment_rate = pool(&[(0.02, 12), (0.05, 14), (0.08, 10), (0.15, 4)]);
    let annuity = pool(&[(12000.0, 12), (22000.0, 16), (38000.0, 8), (52000.0, 4)]);
    let days_employed = pool(&[(-4000.0, 14), (-2000.0, 14), (-500.0, 10), (100.0, 2)]);
    let education = text_pool(&[
        ("Secondary", 24),
        ("Incomplete higher", 6),
        ("Higher education", 10),
    ]);

    (0..40)
        .map(|index| {
            ApplicantRecord::from_pairs([
                ("EXT_SOURCE_2", RawValue::Number(ext_source_2[index])),
                ("EXT_SOURCE_3", RawValue::Number(ext_source_3[index])),
                ("PAYMENT_RATE", RawValue::Number(payment_rate[index])),
                ("AMT_ANNUITY", RawValue::Number(annuity[index])),
                ("DAYS_EMPLOYED", RawValue::Number(days_employed[index])),
                (
                    "NAME_EDUCATION_TYPE",
                    RawValue::Text(education[index].to_string()),
                ),
            ])
        })
        .collect()
}

fn shifted_batch() -> Vec<ApplicantRecord> {
    let mut batch = stable_batch();
    for record in &mut batch {
        record.insert("PAYMENT_RATE", RawValue::Number(0.2));
    }
    batch
}

fn pool(groups: &[(f64, usize)]) -> Vec<f64> {
    groups
        .iter()
        .flat_map(|(value, count)| std::iter::repeat(*value).take(*count))
        .collect()
}

fn text_pool<'a>(groups: &[(&'a str, usize)]) -> Vec<&'a str> {
    groups
        .iter()
        .flat_map(|(value, count)| std::iter::repeat(*value).take(*count))
        .collect()
}
