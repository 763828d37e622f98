//! Per-SKU aggregation and process capability.
//!
//! All functions here are pure: they group a measurement dataset by SKU
//! and reduce each group to a scalar. Nothing is cached between calls.

use crate::models::{MeasurementRecord, SkippedSku, SkipReason, SkuMetrics, SkuScalarMap, SpecLimitMap};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Group measurement values by SKU, keeping input order within each group.
pub fn group_by_sku(dataset: &[MeasurementRecord]) -> HashMap<&str, Vec<f64>> {
    let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();

    for record in dataset {
        grouped
            .entry(record.sku.as_str())
            .or_default()
            .push(record.value);
    }

    grouped
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with Bessel's correction. NaN for fewer than two values.
fn sample_variance_of(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }

    let mean = mean_of(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    sum_sq / (values.len() - 1) as f64
}

fn reduce_groups(dataset: &[MeasurementRecord], reduce: impl Fn(&[f64]) -> f64) -> SkuScalarMap {
    group_by_sku(dataset)
        .into_iter()
        .map(|(sku, values)| (sku.to_string(), reduce(&values)))
        .collect()
}

/// Arithmetic mean of the values of each SKU.
pub fn compute_mean(dataset: &[MeasurementRecord]) -> SkuScalarMap {
    reduce_groups(dataset, mean_of)
}

/// Sample variance (N - 1 denominator) of each SKU.
///
/// A SKU with a single sample is kept with a NaN value.
pub fn compute_variance(dataset: &[MeasurementRecord]) -> SkuScalarMap {
    reduce_groups(dataset, sample_variance_of)
}

/// Sample standard deviation of each SKU, always `sqrt` of the sample variance.
pub fn compute_std_dev(dataset: &[MeasurementRecord]) -> SkuScalarMap {
    std_dev_from_variance(&compute_variance(dataset))
}

fn std_dev_from_variance(variance: &SkuScalarMap) -> SkuScalarMap {
    variance
        .iter()
        .map(|(sku, var)| (sku.clone(), var.sqrt()))
        .collect()
}

/// Sigma levels plus the SKUs that were left out.
#[derive(Debug, Clone, Default)]
pub struct SigmaEvaluation {
    pub sigma: SkuScalarMap,
    pub skipped: Vec<SkippedSku>,
}

/// Sigma level of one SKU: the tighter of the two tail margins over std-dev.
pub fn sigma_level(mean: f64, std_dev: f64, lsl: f64, usl: f64) -> f64 {
    let upper = usl - mean;
    let lower = mean - lsl;
    upper.min(lower) / std_dev
}

/// Evaluate sigma levels from precomputed mean and std-dev maps.
///
/// SKUs without both limits are skipped silently. A std-dev that is exactly
/// zero or NaN skips the SKU with a warning.
pub fn evaluate_sigma_from(
    mean: &SkuScalarMap,
    std_dev: &SkuScalarMap,
    lsl: &SpecLimitMap,
    usl: &SpecLimitMap,
) -> SigmaEvaluation {
    let mut evaluation = SigmaEvaluation::default();

    for (sku, &mu) in mean {
        let (Some(&lower), Some(&upper), Some(&std)) = (lsl.get(sku), usl.get(sku), std_dev.get(sku))
        else {
            debug!("No specification limits for {}, skipping sigma", sku);
            evaluation.skipped.push(SkippedSku {
                sku: sku.clone(),
                reason: SkipReason::MissingLimit,
            });
            continue;
        };

        if std == 0.0 {
            warn!("Standard deviation for {} is 0, skipping sigma calculation", sku);
            evaluation.skipped.push(SkippedSku {
                sku: sku.clone(),
                reason: SkipReason::ZeroStdDev,
            });
            continue;
        }

        if std.is_nan() {
            warn!(
                "Standard deviation for {} is undefined (fewer than two samples or a NaN value), skipping sigma calculation",
                sku
            );
            evaluation.skipped.push(SkippedSku {
                sku: sku.clone(),
                reason: SkipReason::UndefinedStdDev,
            });
            continue;
        }

        evaluation
            .sigma
            .insert(sku.clone(), sigma_level(mu, std, lower, upper));
    }

    evaluation.skipped.sort_by(|a, b| a.sku.cmp(&b.sku));
    evaluation
}

/// Sigma levels with the list of skipped SKUs.
pub fn evaluate_sigma(
    dataset: &[MeasurementRecord],
    lsl: &SpecLimitMap,
    usl: &SpecLimitMap,
) -> SigmaEvaluation {
    let mean = compute_mean(dataset);
    let std_dev = compute_std_dev(dataset);
    evaluate_sigma_from(&mean, &std_dev, lsl, usl)
}

/// Sigma level of each SKU that has both limits and a usable std-dev.
#[allow(dead_code)]
pub fn compute_sigma(
    dataset: &[MeasurementRecord],
    lsl: &SpecLimitMap,
    usl: &SpecLimitMap,
) -> SkuScalarMap {
    evaluate_sigma(dataset, lsl, usl).sigma
}

/// Compute all four metric maps for one run.
pub fn analyze(dataset: &[MeasurementRecord], lsl: &SpecLimitMap, usl: &SpecLimitMap) -> SkuMetrics {
    let groups = group_by_sku(dataset);
    let mut mean = SkuScalarMap::with_capacity(groups.len());
    let mut variance = SkuScalarMap::with_capacity(groups.len());
    for (sku, values) in &groups {
        mean.insert(sku.to_string(), mean_of(values));
        variance.insert(sku.to_string(), sample_variance_of(values));
    }

    let std_dev = std_dev_from_variance(&variance);
    let SigmaEvaluation { sigma, skipped } = evaluate_sigma_from(&mean, &std_dev, lsl, usl);

    SkuMetrics {
        mean,
        variance,
        std_dev,
        sigma,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[(&str, f64)]) -> Vec<MeasurementRecord> {
        rows.iter()
            .map(|(sku, value)| MeasurementRecord::new(*sku, *value))
            .collect()
    }

    fn limits(rows: &[(&str, f64)]) -> SpecLimitMap {
        rows.iter().map(|(sku, v)| (sku.to_string(), *v)).collect()
    }

    #[test]
    fn test_mean_groups_by_sku() {
        let ds = dataset(&[("A", 10.0), ("A", 20.0), ("B", 5.0)]);
        let mean = compute_mean(&ds);

        assert_eq!(mean.len(), 2);
        assert_eq!(mean["A"], 15.0);
        assert_eq!(mean["B"], 5.0);
    }

    #[test]
    fn test_sample_variance_uses_n_minus_one() {
        let ds = dataset(&[("A", 65.0), ("A", 67.0), ("A", 63.0)]);
        let variance = compute_variance(&ds);
        let std_dev = compute_std_dev(&ds);

        assert!((variance["A"] - 4.0).abs() < 1e-12);
        assert!((std_dev["A"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_std_dev_is_sqrt_of_variance() {
        let ds = dataset(&[
            ("A", 64.1),
            ("A", 65.7),
            ("A", 66.3),
            ("A", 63.9),
            ("B", 119.2),
            ("B", 121.8),
            ("C", 0.1),
            ("C", 0.3),
            ("C", 0.2),
        ]);
        let variance = compute_variance(&ds);
        let std_dev = compute_std_dev(&ds);

        assert_eq!(variance.len(), std_dev.len());
        for (sku, var) in &variance {
            let expected = var.sqrt();
            let actual = std_dev[sku];
            assert!(
                (actual - expected).abs() <= 1e-9 * expected.abs(),
                "{}: {} != {}",
                sku,
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_single_sample_is_nan() {
        let ds = dataset(&[("A", 65.0), ("B", 1.0), ("B", 3.0)]);
        let variance = compute_variance(&ds);
        let std_dev = compute_std_dev(&ds);

        assert!(variance["A"].is_nan());
        assert!(std_dev["A"].is_nan());
        assert_eq!(variance["B"], 2.0);
    }

    #[test]
    fn test_known_sigma() {
        let ds = dataset(&[("A", 65.0), ("A", 67.0), ("A", 63.0)]);
        let sigma = compute_sigma(&ds, &limits(&[("A", 60.0)]), &limits(&[("A", 70.0)]));

        assert!((sigma["A"] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_std_dev_is_skipped() {
        let ds = dataset(&[("A", 65.0), ("A", 65.0)]);
        let evaluation = evaluate_sigma(&ds, &limits(&[("A", 60.0)]), &limits(&[("A", 70.0)]));

        assert!(evaluation.sigma.is_empty());
        assert_eq!(
            evaluation.skipped,
            vec![SkippedSku {
                sku: "A".to_string(),
                reason: SkipReason::ZeroStdDev,
            }]
        );
    }

    #[test]
    fn test_single_sample_sigma_is_skipped() {
        let ds = dataset(&[("A", 65.0)]);
        let evaluation = evaluate_sigma(&ds, &limits(&[("A", 60.0)]), &limits(&[("A", 70.0)]));

        assert!(evaluation.sigma.is_empty());
        assert_eq!(evaluation.skipped[0].reason, SkipReason::UndefinedStdDev);
    }

    #[test]
    fn test_missing_limits_are_skipped() {
        let ds = dataset(&[("A", 65.0), ("A", 67.0), ("C", 1.0), ("C", 2.0), ("D", 3.0), ("D", 4.0)]);
        let lsl = limits(&[("A", 60.0), ("D", 0.0)]);
        let usl = limits(&[("A", 70.0)]);
        let evaluation = evaluate_sigma(&ds, &lsl, &usl);

        assert!(evaluation.sigma.contains_key("A"));
        assert!(!evaluation.sigma.contains_key("C"));
        assert!(!evaluation.sigma.contains_key("D"));
        let skipped: Vec<&str> = evaluation.skipped.iter().map(|s| s.sku.as_str()).collect();
        assert_eq!(skipped, vec!["C", "D"]);
        assert!(evaluation
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::MissingLimit));
    }

    #[test]
    fn test_limits_for_unknown_skus_are_ignored() {
        let ds = dataset(&[("A", 65.0), ("A", 67.0)]);
        let lsl = limits(&[("A", 60.0), ("Z", 1.0)]);
        let usl = limits(&[("A", 70.0), ("Z", 2.0)]);

        let sigma = compute_sigma(&ds, &lsl, &usl);
        assert_eq!(sigma.len(), 1);
    }

    #[test]
    fn test_empty_dataset() {
        let ds: Vec<MeasurementRecord> = Vec::new();
        let lsl = limits(&[("A", 60.0)]);
        let usl = limits(&[("A", 70.0)]);

        assert!(compute_mean(&ds).is_empty());
        assert!(compute_variance(&ds).is_empty());
        assert!(compute_std_dev(&ds).is_empty());
        assert!(compute_sigma(&ds, &lsl, &usl).is_empty());
    }

    #[test]
    fn test_mean_is_deterministic() {
        let ds = dataset(&[("A", 0.1), ("A", 0.2), ("A", 0.7), ("B", 1e-3), ("B", 3.3)]);
        let first = compute_mean(&ds);
        let second = compute_mean(&ds);

        assert_eq!(first.len(), second.len());
        for (sku, value) in &first {
            assert_eq!(value.to_bits(), second[sku].to_bits());
        }
    }

    #[test]
    fn test_tail_asymmetry_uses_tighter_margin() {
        // mean = 65, std = 2
        let ds = dataset(&[("A", 65.0), ("A", 67.0), ("A", 63.0)]);

        let lower_tight = compute_sigma(&ds, &limits(&[("A", 60.0)]), &limits(&[("A", 80.0)]));
        assert!((lower_tight["A"] - 2.5).abs() < 1e-12);

        let upper_tight = compute_sigma(&ds, &limits(&[("A", 50.0)]), &limits(&[("A", 68.0)]));
        assert!((upper_tight["A"] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_mean_outside_limits_gives_negative_sigma() {
        assert!((sigma_level(72.0, 2.0, 60.0, 70.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_values_propagate() {
        let ds = dataset(&[("A", f64::NAN), ("A", 1.0)]);
        let mean = compute_mean(&ds);
        let variance = compute_variance(&ds);

        assert!(mean["A"].is_nan());
        assert!(variance["A"].is_nan());
    }

    #[test]
    fn test_nan_value_skips_sigma_as_undefined() {
        let ds = dataset(&[("A", f64::NAN), ("A", 1.0), ("A", 2.0)]);
        let lsl = limits(&[("A", 0.0)]);
        let usl = limits(&[("A", 10.0)]);

        let evaluation = evaluate_sigma(&ds, &lsl, &usl);

        assert!(evaluation.sigma.is_empty());
        assert_eq!(
            evaluation.skipped,
            vec![SkippedSku {
                sku: "A".to_string(),
                reason: SkipReason::UndefinedStdDev,
            }]
        );
    }

    #[test]
    fn test_analyze_matches_individual_operations() {
        let ds = dataset(&[("A", 65.0), ("A", 67.0), ("A", 63.0), ("B", 5.0), ("B", 5.0)]);
        let lsl = limits(&[("A", 60.0), ("B", 1.0)]);
        let usl = limits(&[("A", 70.0), ("B", 9.0)]);

        let metrics = analyze(&ds, &lsl, &usl);

        assert_eq!(metrics.mean, compute_mean(&ds));
        assert_eq!(metrics.variance, compute_variance(&ds));
        assert_eq!(metrics.std_dev, compute_std_dev(&ds));
        assert_eq!(metrics.sigma, compute_sigma(&ds, &lsl, &usl));
        assert_eq!(metrics.skipped.len(), 1);
        assert_eq!(metrics.skipped[0].sku, "B");
    }
}
