//! Process-wide facade created from an invalid environment
//!
//! Kept in its own test binary: the facade reads the environment once, when
//! the process-wide library is first created.

use hlml::{Config, HlmlError, LibraryState};
use serial_test::serial;

#[test]
#[serial]
fn test_invalid_backend_variable_fails_initialize() {
    std::env::set_var("HLML_BACKEND", "simulatd");

    assert!(matches!(hlml::initialize(), Err(HlmlError::Config { .. })));
    assert!(matches!(
        hlml::initialize_with_diagnostics(),
        Err(HlmlError::Config { .. })
    ));
    assert_eq!(hlml::state(), LibraryState::Uninitialized);

    // An explicit configuration replaces the one that failed to load.
    hlml::configure(Config::simulated(1));
    hlml::initialize().expect("initialize");
    assert_eq!(hlml::device_count().expect("count"), 1);
    hlml::shutdown().expect("shutdown");
}
