//! Tests for the type-safe configuration builder.

use std::path::PathBuf;

use listascrape::config::HarvestConfig;
use listascrape::sink::OutputTarget;

fn file_target() -> OutputTarget {
    OutputTarget::File(PathBuf::from("out.csv"))
}

#[test]
fn builder_requires_output_target() {
    // This should not compile if uncommented - build() only exists once the
    // output target has been provided.
    // let cfg = HarvestConfig::builder().build();

    let cfg = HarvestConfig::builder()
        .output(file_target())
        .build()
        .expect("config with output target should build");
    assert_eq!(cfg.output(), &file_target());
}

#[test]
fn builder_optional_fields_have_defaults() {
    let cfg = HarvestConfig::builder()
        .output(file_target())
        .build()
        .expect("default config should build");

    assert_eq!(cfg.chunk_size(), 100);
    assert_eq!(cfg.worker_count(), 4);
    assert_eq!(cfg.stall_threshold(), 3);
    assert_eq!(cfg.max_item_retries(), 3);
    assert_eq!(cfg.load_timeout().as_secs(), 30);
    assert_eq!(cfg.detail_wait().as_secs(), 10);
    assert!(cfg.headless());
    assert!(!cfg.force_rescrape());
}

#[test]
fn builder_overrides_apply() {
    let cfg = HarvestConfig::builder()
        .chunk_size(10)
        .worker_count(2)
        .stall_threshold(5)
        .max_item_retries(1)
        .force_rescrape(true)
        .headless(false)
        .output(OutputTarget::Database("sqlite://x.db".to_string()))
        .build()
        .expect("overridden config should build");

    assert_eq!(cfg.chunk_size(), 10);
    assert_eq!(cfg.worker_count(), 2);
    assert_eq!(cfg.stall_threshold(), 5);
    assert_eq!(cfg.max_item_retries(), 1);
    assert!(cfg.force_rescrape());
    assert!(!cfg.headless());
}

#[test]
fn builder_rejects_zero_partitioning_parameters() {
    assert!(
        HarvestConfig::builder()
            .chunk_size(0)
            .output(file_target())
            .build()
            .is_err()
    );
    assert!(
        HarvestConfig::builder()
            .worker_count(0)
            .output(file_target())
            .build()
            .is_err()
    );
    assert!(
        HarvestConfig::builder()
            .stall_threshold(0)
            .output(file_target())
            .build()
            .is_err()
    );
}

#[test]
fn detail_url_appends_identifier_verbatim() {
    let cfg = HarvestConfig::builder()
        .detail_url_template("https://example.com/detail?id=")
        .output(file_target())
        .build()
        .expect("config should build");
    assert_eq!(cfg.detail_url("00042"), "https://example.com/detail?id=00042");
}
