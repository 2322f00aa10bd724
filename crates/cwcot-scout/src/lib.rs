//! Core model for locating and classifying purchase agreement addenda on
//! listing pages.
//!
//! This crate is browser-free: it holds the outcome record shape, the label
//! and text classifiers, and the artifact-address signature check. The
//! browser-driven resolver lives in the runtime crate.

pub mod artifact;
pub mod label;
pub mod text;
pub mod types;

pub use artifact::{
    filename_of, is_artifact_address, is_artifact_mime, resolve_artifact_address,
    resolve_observed_address,
};
pub use label::{classify_label, is_prohibited_label, is_target_label, normalize_label};
pub use text::{classify_text, extract_revision, normalize_text, SAMPLE_TEXT_LIMIT};
pub use types::*;
