//! Mask compilation and matching.

use regex::{Regex, RegexBuilder};

use crate::MaskError;

/// The mask that matches every name.
const MATCH_ALL: &str = "*";

/// A compiled file mask.
///
/// ```
/// use strata_glob::FileMask;
///
/// let mask = FileMask::new("*.TXT").unwrap();
/// assert!(mask.is_match("notes.txt"));
/// assert!(!mask.is_match("notes.txt.bak"));
/// ```
#[derive(Debug, Clone)]
pub struct FileMask {
    pattern: String,
    matcher: Option<Regex>,
}

impl FileMask {
    /// Compile a mask. An empty mask is treated as `*`.
    pub fn new(mask: &str) -> Result<Self, MaskError> {
        let mask = mask.trim();
        if mask.is_empty() || mask == MATCH_ALL {
            return Ok(Self::any());
        }

        let matcher = RegexBuilder::new(&mask_to_regex(mask))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|source| MaskError::Invalid {
                mask: mask.to_string(),
                source,
            })?;

        Ok(Self {
            pattern: mask.to_string(),
            matcher: Some(matcher),
        })
    }

    /// A mask that accepts every name without filtering.
    pub fn any() -> Self {
        Self {
            pattern: MATCH_ALL.to_string(),
            matcher: None,
        }
    }

    /// True when this mask accepts everything.
    pub fn is_any(&self) -> bool {
        self.matcher.is_none()
    }

    /// The mask text this matcher was built from.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Test a single name (not a path) against the mask.
    pub fn is_match(&self, name: &str) -> bool {
        match &self.matcher {
            None => true,
            Some(re) => re.is_match(name),
        }
    }
}

impl Default for FileMask {
    fn default() -> Self {
        Self::any()
    }
}

impl std::fmt::Display for FileMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Translate a mask into anchored regex source.
///
/// Literal text is escaped; `*` becomes `.*` and `?` becomes `.`.
///
/// ```
/// use strata_glob::mask_to_regex;
///
/// assert_eq!(mask_to_regex("*.txt"), r"^.*\.txt$");
/// assert_eq!(mask_to_regex("a?c"), "^a.c$");
/// ```
pub fn mask_to_regex(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 8);
    out.push('^');
    let mut literal = String::new();
    for c in mask.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

/// One-shot mask test. Invalid masks match nothing.
pub fn mask_match(mask: &str, name: &str) -> bool {
    FileMask::new(mask).is_ok_and(|m| m.is_match(name))
}

/// Check whether a string contains mask wildcards (`*` or `?`).
pub fn contains_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}
