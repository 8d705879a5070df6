// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Option Normalization
//!
//! Whatever the configuration document contains, the loaded options always
//! name a dialable server.

use eventd_sdk::options::{DEFAULT_HOST, DEFAULT_PORT};
use eventd_sdk::EventdOptions;
use proptest::prelude::*;
use serde_json::json;

fn load(host: &str, port: i64) -> EventdOptions {
    let document = json!({ "eventd": { "host": host, "port": port } }).to_string();
    EventdOptions::from_json_str(&document).unwrap()
}

proptest! {
    /// Ports inside 1..=65535 are kept; anything else falls back to 4222
    #[test]
    fn prop_port_is_kept_or_defaulted(port in any::<i64>()) {
        let options = load("nats.internal", port);

        if (1..=65535).contains(&port) {
            prop_assert_eq!(i64::from(options.port()), port);
        } else {
            prop_assert_eq!(options.port(), DEFAULT_PORT);
        }
    }

    /// The loaded port is never zero
    #[test]
    fn prop_port_is_never_zero(port in -70_000i64..70_000) {
        prop_assert_ne!(load("nats.internal", port).port(), 0);
    }

    /// Blank hosts fall back to the default, other hosts are kept verbatim
    #[test]
    fn prop_blank_host_defaults(host in "[ \t]{0,4}|[a-z][a-z0-9.-]{0,30}") {
        let options = load(&host, 4222);

        if host.trim().is_empty() {
            prop_assert_eq!(options.host(), DEFAULT_HOST);
        } else {
            prop_assert_eq!(options.host(), host.as_str());
        }
    }

    /// The server URL always follows the nats://host:port form
    #[test]
    fn prop_server_url_shape(host in "[a-z][a-z0-9]{0,20}", port in 1u16..=65535) {
        let options = EventdOptions::new(host.clone(), port);
        prop_assert_eq!(options.server_url(), format!("nats://{}:{}", host, port));
    }
}
