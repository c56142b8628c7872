use super::*;

fn policy(window_size: usize) -> BaselinePolicy {
    BaselinePolicy {
        window_size,
        regression_threshold_pct: 10.0,
    }
}

fn lcp(value: f64) -> MetricVector {
    MetricVector::new().with(Metric::Lcp, value)
}

#[test]
fn first_pulse_seeds_baseline_and_is_neutral() {
    let metrics = MetricVector::new()
        .with(Metric::Lcp, 2000.0)
        .with(Metric::Performance, 92.0);

    let fin = fold_baseline(None, 1, &metrics, &policy(5)).expect("finalization");

    assert!(fin.seeded);
    assert_eq!(fin.comparison.overall, Classification::Neutral);
    assert!(fin
        .comparison
        .metrics
        .values()
        .all(|m| m.classification == Classification::Neutral && m.reference.is_none()));
    assert_eq!(fin.window.entries.len(), 1);
    assert_eq!(fin.window.reference, metrics);
    assert_eq!(fin.window.last_pulse_id, Some(1));
}

#[test]
fn twenty_percent_slower_lcp_is_a_regression() {
    let seeded = fold_baseline(None, 1, &lcp(2000.0), &policy(5))
        .expect("seed")
        .window;

    let fin = fold_baseline(Some(&seeded), 2, &lcp(2400.0), &policy(5)).expect("fold");

    let cmp = &fin.comparison.metrics[&Metric::Lcp];
    assert_eq!(cmp.classification, Classification::Regression);
    assert_eq!(cmp.reference, Some(2000.0));
    assert_eq!(cmp.delta, Some(400.0));
    assert!((cmp.pct_change.expect("pct") - 20.0).abs() < 1e-9);
    assert_eq!(fin.comparison.overall, Classification::Regression);

    // Reference now reflects both pulses in the window.
    assert_eq!(fin.window.entries.len(), 2);
    assert_eq!(fin.window.reference.get(Metric::Lcp), Some(2200.0));
    assert_eq!(fin.window.last_pulse_id, Some(2));
}

#[test]
fn small_change_within_band_is_neutral() {
    let seeded = fold_baseline(None, 1, &lcp(2000.0), &policy(5))
        .expect("seed")
        .window;
    let fin = fold_baseline(Some(&seeded), 2, &lcp(2100.0), &policy(5)).expect("fold");
    assert_eq!(fin.comparison.overall, Classification::Neutral);
}

#[test]
fn band_crossing_regresses_even_under_threshold() {
    // 2450 -> 2550 is ~4% but crosses from good into needs-improvement.
    let cmp = classify_metric(Metric::Lcp, 2550.0, Some(2450.0), 10.0);
    assert_eq!(cmp.classification, Classification::Regression);
}

#[test]
fn faster_lcp_beyond_threshold_is_an_improvement() {
    let cmp = classify_metric(Metric::Lcp, 1500.0, Some(2000.0), 10.0);
    assert_eq!(cmp.classification, Classification::Improvement);
}

#[test]
fn score_drop_is_a_regression_for_higher_is_better_metrics() {
    let cmp = classify_metric(Metric::Performance, 70.0, Some(95.0), 10.0);
    assert_eq!(cmp.classification, Classification::Regression);

    let cmp = classify_metric(Metric::Performance, 99.0, Some(85.0), 10.0);
    assert_eq!(cmp.classification, Classification::Improvement);
}

#[test]
fn zero_reference_has_no_percentage_and_falls_back_to_bands() {
    let cmp = classify_metric(Metric::Cls, 0.3, Some(0.0), 10.0);
    assert_eq!(cmp.pct_change, None);
    assert_eq!(cmp.classification, Classification::Regression);

    let cmp = classify_metric(Metric::Cls, 0.05, Some(0.0), 10.0);
    assert_eq!(cmp.classification, Classification::Neutral);
}

#[test]
fn improvement_and_regression_together_report_regression_overall() {
    let seeded = fold_baseline(
        None,
        1,
        &MetricVector::new()
            .with(Metric::Lcp, 2000.0)
            .with(Metric::Cls, 0.05),
        &policy(5),
    )
    .expect("seed")
    .window;

    let fin = fold_baseline(
        Some(&seeded),
        2,
        &MetricVector::new()
            .with(Metric::Lcp, 1000.0)
            .with(Metric::Cls, 0.2),
        &policy(5),
    )
    .expect("fold");

    assert_eq!(
        fin.comparison.metrics[&Metric::Lcp].classification,
        Classification::Improvement
    );
    assert_eq!(
        fin.comparison.metrics[&Metric::Cls].classification,
        Classification::Regression
    );
    assert_eq!(fin.comparison.overall, Classification::Regression);
}

#[test]
fn window_drops_oldest_entries_beyond_bound() {
    let mut window = fold_baseline(None, 1, &lcp(1000.0), &policy(3))
        .expect("seed")
        .window;
    for (pulse_id, value) in [(2, 1100.0), (3, 1200.0), (4, 1300.0), (5, 1400.0)] {
        window = fold_baseline(Some(&window), pulse_id, &lcp(value), &policy(3))
            .expect("fold")
            .window;
        assert!(window.entries.len() <= 3);
    }

    let ids: Vec<i64> = window.entries.iter().map(|e| e.pulse_id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
    assert_eq!(window.reference.get(Metric::Lcp), Some(1300.0));
}

#[test]
fn folding_the_same_pulse_twice_is_a_no_op() {
    let window = fold_baseline(None, 7, &lcp(1000.0), &policy(5))
        .expect("seed")
        .window;
    assert!(fold_baseline(Some(&window), 7, &lcp(1000.0), &policy(5)).is_none());
}

#[test]
fn shrinking_window_policy_trims_on_next_fold() {
    let mut window = fold_baseline(None, 1, &lcp(1000.0), &policy(5))
        .expect("seed")
        .window;
    for pulse_id in 2..=5 {
        window = fold_baseline(Some(&window), pulse_id, &lcp(1000.0), &policy(5))
            .expect("fold")
            .window;
    }
    assert_eq!(window.entries.len(), 5);

    let window = fold_baseline(Some(&window), 6, &lcp(1000.0), &policy(2))
        .expect("fold")
        .window;
    assert_eq!(window.window_size, 2);
    assert_eq!(window.entries.len(), 2);
}

#[test]
fn metric_missing_from_reference_is_neutral() {
    let seeded = fold_baseline(None, 1, &lcp(2000.0), &policy(5))
        .expect("seed")
        .window;
    let fin = fold_baseline(
        Some(&seeded),
        2,
        &MetricVector::new().with(Metric::Inp, 900.0),
        &policy(5),
    )
    .expect("fold");
    assert_eq!(
        fin.comparison.metrics[&Metric::Inp].classification,
        Classification::Neutral
    );
}

#[test]
fn classification_parses_from_storage_form() {
    for c in [
        Classification::Regression,
        Classification::Improvement,
        Classification::Neutral,
    ] {
        assert_eq!(c.as_str().parse::<Classification>().unwrap(), c);
    }
}
