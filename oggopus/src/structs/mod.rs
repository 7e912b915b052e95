//! Data structures representing Ogg and Opus format components.
//!
//! This module contains the packet, page and header structures shared by
//! the multiplexer and demultiplexer.

pub mod header;
pub mod packet;
pub mod page;
pub mod segment;
