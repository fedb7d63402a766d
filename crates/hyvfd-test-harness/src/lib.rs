//! hyvfd-test-harness: Test utilities and mock transports for hyvfd.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! drive protocol engine without a real RS-485 link, plus [`MockHandle`] to
//! observe sent frames and inject inbound bytes once the engine owns the
//! transport.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport, Responder, SentFrame};
