use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn watchdogs_default_to_twenty_seconds() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(
        settings.engine.navigation_timeout(),
        Duration::from_secs(20)
    );
    assert_eq!(settings.engine.render_timeout(), Duration::from_secs(20));
    assert_eq!(settings.engine.late_arrival_ceiling(), None);
}

#[test]
fn late_arrival_ceiling_is_opt_in() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        engine_late_arrival_ceiling_ms: Some(7_500),
        ..Default::default()
    };
    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.engine.late_arrival_ceiling(),
        Some(Duration::from_millis(7_500))
    );
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut raw = RawSettings::default();
    raw.engine.render_timeout_ms = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key, .. }) if key == "engine.render_timeout_ms"
    ));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["corrente"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "corrente",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--engine-render-timeout-ms",
        "5000",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.engine_render_timeout_ms, Some(5000));
        }
    }
}

#[test]
fn client_config_never_contains_the_internal_section() {
    let mut raw = RawSettings::default();
    raw.internal = serde_json::json!({ "statsSecret": "hunter2" });
    let settings = Settings::from_raw(raw).expect("valid settings");

    let exposed = settings.client_config();
    assert!(exposed.get("internal").is_none());
    assert!(!exposed.to_string().contains("hunter2"));
    assert_eq!(exposed["engine"]["renderTimeoutMs"], 20_000);
}
