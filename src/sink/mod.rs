//! Sink writers: each variant consumes the Document stream and owns the
//! destination exclusively for the duration of the transfer.

pub mod file;
pub mod remote;
