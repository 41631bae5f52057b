use super::reference::FeatureBaseline;

/// Floor applied to both distributions before the log-ratio so empty buckets
/// keep the statistic finite.
pub(crate) const PSI_EPSILON: f64 = 1e-6;

/// Buckets a batch of live values with the baseline's fixed edges and
/// returns empirical proportions.
pub(crate) fn bucket_proportions<I>(baseline: &FeatureBaseline, values: I, count: usize) -> Vec<f64>
where
    I: Iterator<Item = f64>,
{
    let mut counts = vec![0usize; baseline.bucket_count()];
    for value in values {
        counts[baseline.bucket_index(value)] += 1;
    }
    counts
        .into_iter()
        .map(|bucket| {
            if count == 0 {
                0.0
            } else {
                bucket as f64 / count as f64
            }
        })
        .collect()
}

/// Population Stability Index between the expected (training) and observed
/// (live) bucket proportions over identical buckets.
///
/// Zero when the distributions agree; grows monotonically with their
/// separation. Conventional reading: < 0.1 stable, 0.1-0.2 moderate shift,
/// > 0.2 significant shift.
pub(crate) fn population_stability_index(expected: &[f64], observed: &[f64]) -> f64 {
    expected
        .iter()
        .zip(observed)
        .map(|(expected, observed)| {
            let expected = expected.max(PSI_EPSILON);
            let observed = observed.max(PSI_EPSILON);
            (observed - expected) * (observed / expected).ln()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> FeatureBaseline {
        FeatureBaseline {
            name: "x".to_string(),
            edges: vec![0.0, 1.0],
            proportions: vec![0.25, 0.5, 0.25],
        }
    }

    #[test]
    fn identical_distributions_have_zero_psi() {
        let expected = [0.25, 0.5, 0.25];
        assert_eq!(population_stability_index(&expected, &expected), 0.0);
    }

    #[test]
    fn psi_grows_with_separation() {
        let expected = [0.25, 0.5, 0.25];
        let mild = [0.3, 0.45, 0.25];
        let severe = [0.0, 0.1, 0.9];
        let mild_psi = population_stability_index(&expected, &mild);
        let severe_psi = population_stability_index(&expected, &severe);
        assert!(mild_psi > 0.0);
        assert!(severe_psi > mild_psi);
        assert!(severe_psi > 0.2);
    }

    #[test]
    fn empty_buckets_stay_finite() {
        let expected = [0.25, 0.5, 0.25];
        let observed = [1.0, 0.0, 0.0];
        let psi = population_stability_index(&expected, &observed);
        assert!(psi.is_finite());
        assert!(psi > 0.2);
    }

    #[test]
    fn bucket_proportions_match_hand_count() {
        let baseline = baseline();
        let values = [-1.0, -0.5, 0.5, 0.7, 1.0, 2.0];
        let proportions = bucket_proportions(&baseline, values.iter().copied(), values.len());
        assert_eq!(proportions, vec![2.0 / 6.0, 3.0 / 6.0, 1.0 / 6.0]);
    }
}
