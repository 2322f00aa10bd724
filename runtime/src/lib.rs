// Copyright 2026 CWCOT Scout Contributors
// SPDX-License-Identifier: Apache-2.0

//! CWCOT Scout runtime: browser-driven resolution of purchase agreement
//! addenda on listing pages.
//!
//! [`orchestrator::Resolver`] drives one listing page to a
//! [`cwcot_scout::SelectionOutcome`]; [`budget`] bounds how long a caller
//! waits for it.

pub mod aux_session;
pub mod budget;
pub mod capture;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod invoker;
pub mod legacy;
pub mod locator;
pub mod orchestrator;
pub mod reader;
pub mod renderer;
pub mod scripts;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tiles;

pub use budget::{resolve_within, with_budget, Budgeted, PendingResolution};
pub use config::ResolverConfig;
pub use error::{classify_error, ErrorClass, ResolveError};
pub use orchestrator::Resolver;
pub use reader::{ArtifactReader, BrowserArtifactReader};
