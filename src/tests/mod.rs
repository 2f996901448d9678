//! Consolidated test modules.
//!
//! End-to-end tests that run the metadata fetch against a wiremock IdP.
