//! Certificate request operations against a mock CA

mod certification_test;
mod initialization_test;
mod key_update_test;
mod signed_response_test;
