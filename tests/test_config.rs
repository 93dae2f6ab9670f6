use std::time::Duration;

use peerhttp::config::{Config, LISTEN_ENV};

// Environment variables are process-wide, so everything touching LISTEN
// lives in this one test.
#[test]
fn test_config_listen_address() {
    unsafe {
        std::env::remove_var(LISTEN_ENV);
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");

    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");

    unsafe {
        std::env::remove_var(LISTEN_ENV);
    }
}

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.max_pipeline, 16);
    assert_eq!(cfg.server.max_write_buffer, 1024 * 1024);
    assert_eq!(cfg.server.limits.max_line, 8192);
    assert_eq!(cfg.client.timeout(), Some(Duration::from_secs(30)));
    assert!(cfg.client.user_agent.starts_with("peerhttp/"));
}

#[test]
fn test_config_partial_yaml() {
    let cfg = Config::from_yaml(
        "server:\n  max_pipeline: 4\n  limits:\n    max_body: 1024\nclient:\n  timeout_ms: 0\n",
    )
    .unwrap();

    assert_eq!(cfg.server.max_pipeline, 4);
    assert_eq!(cfg.server.limits.max_body, 1024);
    assert_eq!(cfg.server.limits.max_headers, 100);
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.client.timeout(), None);
}

#[test]
fn test_config_rejects_zero_pipeline() {
    let err = Config::from_yaml("server:\n  max_pipeline: 0\n").unwrap_err();
    assert!(err.to_string().contains("max_pipeline"));
}

#[test]
fn test_config_rejects_bad_yaml() {
    assert!(Config::from_yaml("server:\n  max_pipeline: many\n").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1, cfg2);
}

#[test]
fn test_config_missing_file() {
    let err = Config::from_file("/nonexistent/peerhttp.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("reading config file"));
}
