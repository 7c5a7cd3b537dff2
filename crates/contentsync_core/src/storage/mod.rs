//! Payload storage layout. Only path allocation lives in core; moving bytes
//! into place is owned by importers.

pub mod path;
