use fraudprep::{init_logging, LogFormat, LoggingConfig, LoggingInitError};

#[test]
fn second_initialisation_is_rejected() {
    let cfg = LoggingConfig {
        level: "warn".to_string(),
        format: LogFormat::Json,
        include_target: false,
    };

    init_logging(&cfg).expect("first initialisation should succeed");
    let err = init_logging(&cfg).expect_err("global subscriber is already set");
    assert!(matches!(err, LoggingInitError::AlreadyInitialized(_)));
}
