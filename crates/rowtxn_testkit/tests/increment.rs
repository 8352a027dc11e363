//! End-to-end counter workloads.

use rowtxn_core::Config;
use rowtxn_testkit::prelude::*;

#[test]
fn sequential_increments_add_up() {
    init_tracing();
    let cluster = TestCluster::new();
    let config = StressConfig {
        operations: 1_000,
        ..StressConfig::default()
    };

    let result = stress_sequential_increments(&cluster, "counters", &config);
    assert_eq!(result.successful_ops, 1_000);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.lost_updates, 0);
    assert_eq!(
        counter_value(&cluster, "counters", &counter_row(0)).unwrap(),
        1_000
    );
    assert_eq!(cluster.stats().conflicts(), 0);
}

#[test]
fn concurrent_random_increments_converge() {
    init_tracing();
    let cluster = TestCluster::new();
    let client = cluster.client(Config::default());
    let config = StressConfig {
        operations: 100,
        threads: 10,
        counters: 1,
        max_increment: 10,
        retry_attempts: 10_000,
    };

    let result = stress_concurrent_increments(&client, "counters", &config);
    result.print_summary("concurrent increments");
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, 1_000);
    assert_eq!(
        sum_counters(&client, "counters", &config).unwrap(),
        result.expected_total
    );
}

#[test]
fn concurrent_increments_over_many_rows() {
    let cluster = TestCluster::new();
    let client = cluster.client(Config::default());
    let config = StressConfig {
        operations: 50,
        threads: 4,
        counters: 5,
        max_increment: 3,
        retry_attempts: 10_000,
    };

    let result = stress_concurrent_increments(&client, "counters", &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(
        sum_counters(&client, "counters", &config).unwrap(),
        result.expected_total
    );
    for i in 0..config.counters {
        let row = String::from_utf8(counter_row(i).to_vec()).unwrap();
        assert!(cluster.is_stable("counters", &row));
    }
}
