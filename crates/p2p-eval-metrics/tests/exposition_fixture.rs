//! Scraping a captured nwaku `/metrics` response.

use std::collections::BTreeMap;

use p2p_eval_metrics::{ScrapedValue, scrape};

const METRICS_DUMP: &str = include_str!("fixtures/metrics_dump.txt");

#[test]
fn network_bytes_has_both_directions() {
    let results = scrape(METRICS_DUMP, "libp2p_network_bytes_total");
    assert_eq!(results.len(), 2);

    let by_direction: BTreeMap<&str, f64> = results
        .iter()
        .map(|r| (r.labels["direction"].as_str(), r.value))
        .collect();
    assert_eq!(by_direction["in"], 5055.0);
    assert_eq!(by_direction["out"], 3918.0);
    assert!(results.iter().all(|r| r.labels.len() == 1));
}

#[test]
fn label_less_peers_gauge() {
    let results = scrape(METRICS_DUMP, "libp2p_peers");
    assert_eq!(
        results,
        vec![ScrapedValue {
            labels: BTreeMap::new(),
            value: 1.0
        }]
    );
}

#[test]
fn multi_label_series_keep_input_order() {
    let results = scrape(METRICS_DUMP, "libp2p_open_streams");
    let values: Vec<f64> = results.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![2.0, 1.0, 3.0]);
    assert_eq!(results[2].labels["type"], "YamuxChannel");
    assert_eq!(results[2].labels["dir"], "in");
}

#[test]
fn missing_metric_is_empty() {
    assert!(scrape(METRICS_DUMP, "this_metric_does_not_exist").is_empty());
}

#[test]
fn repeated_scrapes_agree() {
    let first = scrape(METRICS_DUMP, "libp2p_network_bytes_total");
    let second = scrape(METRICS_DUMP, "libp2p_network_bytes_total");
    assert_eq!(first, second);
}
