//! Source readers: each variant produces the sequential Document stream the
//! coordinator feeds into a sink.

pub mod file;
pub mod remote;
