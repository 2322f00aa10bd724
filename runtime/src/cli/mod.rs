//! CLI subcommand implementations for the `cwcot-scout` binary.

pub mod classify_cmd;
pub mod doctor;
pub mod label_cmd;
pub mod output;
pub mod resolve_cmd;
