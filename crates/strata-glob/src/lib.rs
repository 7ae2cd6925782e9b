//! strata-glob: file-mask matching for virtual filesystem searches.
//!
//! Masks are the classic DOS/Windows style used when searching a directory
//! tree by name:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - everything else matches itself, case-insensitively
//!
//! A mask is compiled once into an anchored regex and then applied to every
//! candidate name. The mask `*` matches without touching the regex engine.

mod mask;

pub use mask::{contains_wildcards, mask_match, mask_to_regex, FileMask};

use thiserror::Error;

/// Errors from compiling a file mask.
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("invalid file mask {mask:?}: {source}")]
    Invalid {
        mask: String,
        #[source]
        source: regex::Error,
    },
}
