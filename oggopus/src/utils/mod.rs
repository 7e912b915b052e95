//! Utility functions and supporting infrastructure.
//!
//! Provides page CRC computation and the error types shared by the
//! multiplexer, demultiplexer and codec adapter.

pub mod crc;
pub mod errors;
