use augur_lib::classifier::Metrics;
use itertools::Itertools;

pub fn metrics_view(metrics: &Metrics) -> String {
    format!(
        "
Samples:        {} ({} train / {} test)
Categories:     {}
Train accuracy: {:.1}%
Test accuracy:  {:.1}%
",
        metrics.total_samples,
        metrics.train_size,
        metrics.test_size,
        metrics.categories.iter().join(", "),
        metrics.train_accuracy * 100.0,
        metrics.test_accuracy * 100.0,
    )
}

pub fn importance_view(scored: &[(String, f64)]) -> String {
    let mut out = String::from("Most informative features:\n");
    for (name, score) in scored {
        out.push_str(&format!("  {:<24} {:.3}\n", name, score));
    }
    out
}
