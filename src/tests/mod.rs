mod support;

mod query_tests;
mod token_reader_tests;

#[cfg(feature = "http")]
mod client_tests;
