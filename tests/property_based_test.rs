//! Property-based tests using proptest
//!
//! Tests that verify properties hold for arbitrary inputs.

mod common;

use common::{registry_with, run_scrape, series, FakeClient, Outcome};
use proptest::prelude::*;
use scrape_exporter::metrics::{build_fq_name, is_valid_metric_name, render, MetricDesc};
use scrape_exporter::scrape::ExtraParams;

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Succeed), Just(Outcome::Fail), Just(Outcome::Panic)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_scrape_emits_two_samples_per_collector_plus_lifecycle(
        outcomes in proptest::collection::vec(outcome(), 0..8)
    ) {
        // Given: N collectors with arbitrary outcomes
        let names: Vec<String> = (0..outcomes.len()).map(|i| format!("c{}", i)).collect();
        let plan: Vec<(&str, Outcome)> = names
            .iter()
            .map(String::as_str)
            .zip(outcomes.iter().copied())
            .collect();
        let client = FakeClient::new();
        let registry = registry_with(&client, &plan);
        let set = registry.build_set("test", "", ExtraParams::new()).unwrap();

        // When: Running one scrape
        let (result, samples) = runtime().block_on(run_scrape(&set));

        // Then: N+3 durations, N successes, and success mirrors each outcome
        let summary = result.unwrap();
        let durations = series(&samples, "test_scrape_collector_duration_seconds");
        let successes = series(&samples, "test_scrape_collector_success");
        prop_assert_eq!(durations.len(), outcomes.len() + 3);
        prop_assert_eq!(successes.len(), outcomes.len());
        prop_assert!(durations.iter().all(|(_, v)| *v >= 0.0));

        for (name, outcome) in &plan {
            let success = successes.iter().find(|(n, _)| n == name).map(|(_, v)| *v);
            let expected = if *outcome == Outcome::Succeed { 1.0 } else { 0.0 };
            prop_assert_eq!(success, Some(expected));
        }
        prop_assert_eq!(summary.succeeded.len() + summary.failed.len(), outcomes.len());
    }

    #[test]
    fn test_any_label_value_renders_without_panic(value in "\\PC*") {
        // Given: A gauge and an arbitrary label value
        let desc = MetricDesc::new("truenas_pool_health", "Pool health", &["pool"]);
        let samples = vec![desc.sample(&[value.as_str()], 1.0).unwrap()];

        // When: Rendering
        let result = render(&samples, &[]);

        // Then: Rendering succeeds
        prop_assert!(result.is_ok());
    }

    #[test]
    fn test_any_sample_value_renders(value in proptest::num::f64::ANY) {
        let desc = MetricDesc::new("truenas_value", "Value", &[]);
        let samples = vec![desc.sample(&[], value).unwrap()];

        prop_assert!(render(&samples, &[]).is_ok());
    }

    #[test]
    fn test_fq_name_of_valid_parts_is_valid(
        namespace in "[a-z_][a-z0-9_]{0,12}",
        subsystem in "[a-z0-9_]{0,12}",
        name in "[a-z0-9_]{1,12}",
    ) {
        // Given: A valid namespace followed by name-safe parts
        // When: Joining them
        let fq_name = build_fq_name(&namespace, &subsystem, &name);

        // Then: The result is still a valid metric name
        prop_assert!(is_valid_metric_name(&fq_name));
        prop_assert!(fq_name.starts_with(namespace.as_str()));
        prop_assert!(fq_name.ends_with(name.as_str()));
    }

    #[test]
    fn test_wrong_label_count_is_rejected(labels in 0usize..6, given in 0usize..6) {
        let names: Vec<String> = (0..labels).map(|i| format!("l{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let desc = MetricDesc::new("truenas_x", "X", &name_refs);
        let values: Vec<&str> = vec!["v"; given];

        prop_assert_eq!(desc.sample(&values, 1.0).is_ok(), labels == given);
    }
}
