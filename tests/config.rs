//! Engine configuration loaded from RON files

use std::io::Write;

use tempfile::NamedTempFile;
use tempo_clock::{ClockError, EngineConfig, TimeSignature, Transport, TransportState, Units};

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn load_config_from_file() {
    let file = write_config(
        r#"(
            units: (beats_per_bar: 4, beats_per_minute: 90, subbeat_divisor: 96),
            time_signature_bytes: Some((4, 1)),
            queue_capacity: 256,
        )"#,
    );

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.queue_capacity, 256);
    assert_eq!(config.time_signature().unwrap(), TimeSignature::TwoFour);
    assert_eq!(config.effective_units().unwrap(), Units::new(2, 90, 96));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::load(dir.path().join("missing.ron"));
    assert!(matches!(result, Err(ClockError::Io(_))));
}

#[test]
fn malformed_file_is_a_config_error() {
    let file = write_config("(units: oops)");
    assert!(matches!(EngineConfig::load(file.path()), Err(ClockError::Config(_))));
}

#[test]
fn saved_config_loads_back() {
    let config = EngineConfig {
        units: Units::new(3, 140, 480),
        input_port: Some("Clock In".to_string()),
        ..EngineConfig::default()
    };
    let file = write_config(&config.to_ron_string().unwrap());
    assert_eq!(EngineConfig::load(file.path()).unwrap(), config);
}

#[test]
fn transport_from_loaded_config() {
    let file = write_config("(units: (beats_per_bar: 3, beats_per_minute: 100, subbeat_divisor: 480))");
    let config = EngineConfig::load(file.path()).unwrap();

    let transport = Transport::loopback(&config).unwrap();
    assert_eq!(transport.state(), TransportState::Stopped);
    assert_eq!(transport.time_signature(), TimeSignature::ThreeFour);
    assert_eq!(transport.tempo(), 100);
    assert_eq!(transport.position().units(), Units::new(3, 100, 480));
}
