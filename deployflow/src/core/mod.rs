//! Deterministic, pure logic shared by the conversations and the reader.
//!
//! Core modules must be free of I/O side effects (target classification only
//! asks whether a local directory exists). They operate on in-memory data and
//! return deterministic outputs suitable for tests.

pub mod conversation;
pub mod entries;
pub mod evidence;
pub mod reply;
pub mod target;
