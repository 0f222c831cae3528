//! Helpers shared by socket-bound unit tests.

pub mod socket_guard;
