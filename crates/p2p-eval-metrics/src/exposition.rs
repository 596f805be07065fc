//! Prometheus text exposition format, read side.
//!
//! Extracts the samples of one named metric from a scrape. The parser is
//! line-oriented and lenient: a malformed line is skipped, never fatal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One sample of the requested metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedValue {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Collect every sample of `metric_name` in `text`, in input order.
///
/// - `#` lines and blank lines are skipped.
/// - The value is whatever follows the last space on the line.
/// - Without `{`, the whole name must equal `metric_name`; with `{...}`,
///   the part before `{` must, and `key="value"` pairs become labels.
/// - Lines that fail to parse are skipped.
pub fn scrape(text: &str, metric_name: &str) -> Vec<ScrapedValue> {
    text.lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_line(line, metric_name);
            if parsed.is_none() {
                debug!(%line, "skipping metric line");
            }
            parsed.flatten()
        })
        .collect()
}

/// `None` for a malformed line, `Some(None)` for a different metric.
fn parse_line(line: &str, metric_name: &str) -> Option<Option<ScrapedValue>> {
    let (name_part, value_str) = line.rsplit_once(' ')?;
    let value = value_str.trim().parse::<f64>().ok()?;
    let name_part = name_part.trim_end();

    let Some(brace) = name_part.find('{') else {
        if name_part.contains('}') {
            return None;
        }
        return Some((name_part == metric_name).then(|| ScrapedValue {
            labels: BTreeMap::new(),
            value,
        }));
    };

    if &name_part[..brace] != metric_name {
        return Some(None);
    }
    let inner = name_part[brace + 1..].strip_suffix('}')?;
    let labels = parse_labels(inner)?;
    Some(Some(ScrapedValue { labels, value }))
}

/// Parse `k1="v1",k2="v2"`. Commas inside quoted values do not split pairs.
/// An empty pair, as in `{}` or a trailing comma, rejects the whole set.
fn parse_labels(inner: &str) -> Option<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in split_pairs(inner)? {
        let (key, value) = pair.trim().split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        labels.insert(key.to_string(), value.trim().trim_matches('"').to_string());
    }
    Some(labels)
}

fn split_pairs(inner: &str) -> Option<Vec<&str>> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' | '}' if !in_quotes => return None,
            ',' if !in_quotes => {
                pairs.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_quotes {
        return None;
    }
    pairs.push(&inner[start..]);
    Some(pairs)
}
