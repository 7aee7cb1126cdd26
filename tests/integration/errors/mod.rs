//! Error handling against a mock CA

mod integrity_test;
mod protocol_test;
mod validation_test;
