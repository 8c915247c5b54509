//! Unit tests for log format selection

use switchyard::logging::LogFormat;

#[test]
fn production_logs_as_json() {
    assert_eq!(LogFormat::select("production", None), LogFormat::Json);
    assert_eq!(LogFormat::select("prod", None), LogFormat::Json);
}

#[test]
fn other_environments_log_pretty() {
    assert_eq!(LogFormat::select("sandbox", None), LogFormat::Pretty);
    assert_eq!(LogFormat::select("staging", None), LogFormat::Pretty);
}

#[test]
fn explicit_format_wins() {
    assert_eq!(LogFormat::select("sandbox", Some("JSON")), LogFormat::Json);
    assert_eq!(LogFormat::select("production", Some("pretty")), LogFormat::Pretty);
    assert_eq!(LogFormat::select("production", Some("bogus")), LogFormat::Json);
}
