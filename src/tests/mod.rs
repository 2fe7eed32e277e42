//! Unit tests for the session-state machine.
//!
//! Token, store, storage, and observable behavior is covered next to the
//! modules themselves; these tests exercise the `JwtService` lifecycle
//! against a mocked transport and identity lookup.
