#[cfg(test)]
mod stats_tests {
    use crate::process::{ExonError, Region};
    use crate::stats::*;

    fn region() -> Region {
        Region::new(3, 0, 100).unwrap()
    }

    #[test]
    fn test_kolmogorov_cdf_single_observation() {
        // D_1 = max(U, 1 - U), so P(D_1 < d) = 2d - 1 on [0.5, 1]
        assert!((kolmogorov_cdf(1, 0.75) - 0.5).abs() < 1e-12);
        assert!((kolmogorov_cdf(1, 0.6) - 0.2).abs() < 1e-12);
        assert_eq!(kolmogorov_cdf(1, 1.0), 1.0);
        assert_eq!(kolmogorov_cdf(5, 0.0), 0.0);
    }

    #[test]
    fn test_kolmogorov_cdf_is_monotone() {
        for n in [3, 10, 50, 200] {
            let mut last = 0.0;
            for step in 1..40 {
                let d = step as f64 / 40.0;
                let p = kolmogorov_cdf(n, d);
                assert!((0.0..=1.0).contains(&p));
                assert!(p + 1e-9 >= last, "n={} d={} p={} < {}", n, d, p, last);
                last = p;
            }
        }
    }

    #[test]
    fn test_ks_statistic_against_fitted_normal() {
        let test = ks_normality_test(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(test.n, 3);
        assert!((test.mean - 2.0).abs() < 1e-12);
        assert!((test.std_dev - 1.0).abs() < 1e-12);
        // 1/3 - Phi(-1)
        assert!((test.statistic - 0.174678).abs() < 1e-5, "D = {}", test.statistic);
        assert!(test.p_value > 0.05);
        assert!(test.is_normal());
        assert_eq!(test.message(), "Data may be normally distributed (fail to reject H0).");
    }

    #[test]
    fn test_ks_rejects_strongly_bimodal_data() {
        let mut values = vec![0.0; 30];
        values.extend(vec![1.0; 30]);
        values.push(0.5);
        let test = ks_normality_test(&values).unwrap();
        assert!(test.p_value < 0.05, "p = {}", test.p_value);
        assert!(!test.is_normal());
        assert_eq!(test.message(), "Data is NOT normally distributed (reject H0).");
    }

    #[test]
    fn test_ks_needs_three_varying_values() {
        assert!(matches!(ks_normality_test(&[]), Err(ExonError::InsufficientData(_))));
        assert!(matches!(ks_normality_test(&[0.1, 0.2]), Err(ExonError::InsufficientData(_))));
        assert!(matches!(
            ks_normality_test(&[0.3, 0.3, 0.3]),
            Err(ExonError::InsufficientData(_))
        ));
        assert!(matches!(
            ks_normality_test(&[0.1, f64::NAN, 0.3]),
            Err(ExonError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_mann_whitney_single_observations() {
        let result = mann_whitney_u(&[0.25], &[0.5]).unwrap();
        assert_eq!(result.u_statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.method, UTestMethod::Exact);
    }

    #[test]
    fn test_mann_whitney_exact_separated_samples() {
        let result = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(result.u_statistic, 0.0);
        // 2 / C(6, 3)
        assert!((result.p_value - 0.1).abs() < 1e-12);

        let result = mann_whitney_u(&[4.0, 5.0, 6.0, 7.0], &[1.0, 2.0, 3.0, 0.5]).unwrap();
        assert_eq!(result.u_statistic, 16.0);
        // 2 / C(8, 4)
        assert!((result.p_value - 2.0 / 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_mann_whitney_ties_use_normal_approximation() {
        let result = mann_whitney_u(&[1.0, 1.0, 2.0], &[2.0, 3.0, 3.0]).unwrap();
        assert_eq!(result.method, UTestMethod::Asymptotic);
        assert_eq!(result.u_statistic, 0.5);
        assert!(result.p_value > 0.0 && result.p_value < 1.0);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        let result = mann_whitney_u(&[0.2, 0.2], &[0.2, 0.2, 0.2]).unwrap();
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.u_statistic, 3.0);
    }

    #[test]
    fn test_mann_whitney_large_samples() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64 + 100.0).collect();
        let result = mann_whitney_u(&x, &y).unwrap();
        assert_eq!(result.method, UTestMethod::Asymptotic);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn test_mann_whitney_exact_with_one_large_sample() {
        let x: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let y = [100.5, 200.5, 300.5];
        let forward = mann_whitney_u(&x, &y).unwrap();
        let swapped = mann_whitney_u(&y, &x).unwrap();
        assert_eq!(forward.method, UTestMethod::Exact);
        assert_eq!(swapped.method, UTestMethod::Exact);
        assert_eq!(forward.u_statistic + swapped.u_statistic, 1200.0);
        assert!((forward.p_value - swapped.p_value).abs() < 1e-12);

        // Every x below every y: only one ordering reaches the extreme U
        let below = mann_whitney_u(&x, &[500.0, 501.0, 502.0]).unwrap();
        assert_eq!(below.u_statistic, 0.0);
        let expected = 12.0 / (403.0 * 402.0 * 401.0);
        assert!((below.p_value - expected).abs() < 1e-15, "p = {}", below.p_value);
    }

    #[test]
    fn test_mann_whitney_needs_both_samples() {
        assert!(matches!(mann_whitney_u(&[], &[1.0]), Err(ExonError::InsufficientData(_))));
    }

    #[test]
    fn test_compare_region_messages() {
        match compare_region(region(), "High", &[0.25], "Low", &[0.5]) {
            ComparisonOutcome::Tested(c) => {
                assert!(!c.is_significant());
                assert_eq!(c.message(), "Exon3: No significant difference between High and Low groups.");
                assert_eq!((c.first_n, c.second_n), (1, 1));
            }
            other => panic!("expected a test, got {:?}", other),
        }

        let high: Vec<f64> = (0..10).map(|i| 0.5 + i as f64 * 0.01).collect();
        let low: Vec<f64> = (0..10).map(|i| i as f64 * 0.01).collect();
        match compare_region(region(), "High", &high, "Low", &low) {
            ComparisonOutcome::Tested(c) => {
                assert!(c.is_significant());
                assert_eq!(c.message(), "Exon3: Significant difference between High and Low groups.");
            }
            other => panic!("expected a test, got {:?}", other),
        }
    }

    #[test]
    fn test_compare_region_skips_missing_group() {
        let outcome = compare_region(region(), "High", &[0.25], "Low", &[]);
        assert_eq!(outcome.region(), region());
        match outcome {
            ComparisonOutcome::Skipped { reason, .. } => assert_eq!(reason, "no observations for Low"),
            other => panic!("expected a skip, got {:?}", other),
        }
    }
}
