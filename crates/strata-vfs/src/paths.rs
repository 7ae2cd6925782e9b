//! Path rules for virtual and physical paths.
//!
//! Virtual paths are always rooted and `/`-separated. Directories carry a
//! trailing `/` (the root is just `/`); files never do. Names compare
//! case-insensitively, so every map keyed by name goes through [`fold_case`].
//!
//! ```text
//! "\\data//maps\\"   -> "/data/maps/"       (normalize_directory with '/')
//! "data/a<b>.txt"    -> "/data/ab.txt"      (normalize_path)
//! "/data/maps/"      -> ["data", "maps"]    (split_virtual_path)
//! ```

use crate::{VfsError, VfsResult};

/// Virtual path separator.
pub const SEPARATOR: char = '/';

/// The virtual root directory.
pub const ROOT: &str = "/";

/// Characters that can never appear in a directory segment.
const ILLEGAL_PATH_CHARS: &[char] = &['<', '>', '"', '|'];

/// Characters that can never appear in a file name.
const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Case-fold a name or path for map keys and comparisons.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

/// Compare two names or paths case-insensitively.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || fold_case(a) == fold_case(b)
}

fn strip_segment(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_PATH_CHARS.contains(c))
        .collect()
}

/// Normalize a directory path using `separator`.
///
/// Both `/` and `\` are treated as separators, repeated separators collapse,
/// `.` segments vanish and `..` pops the previous segment. The result always
/// ends with `separator`. A leading separator is kept.
pub fn normalize_directory(path: &str, separator: char) -> VfsResult<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(VfsError::invalid_path("empty directory path"));
    }

    let rooted = trimmed.starts_with(['/', '\\']);
    let mut segments: Vec<String> = Vec::new();
    for raw in trimmed.split(['/', '\\']) {
        let segment = strip_segment(raw);
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut out = String::with_capacity(trimmed.len() + 1);
    if rooted {
        out.push(separator);
    }
    for segment in &segments {
        out.push_str(segment);
        out.push(separator);
    }
    if out.is_empty() {
        // Only `.` or `..` segments: treat as the root.
        out.push(separator);
    }
    Ok(out)
}

/// Normalize a virtual directory: rooted, `/`-separated, trailing `/`.
pub fn virtual_directory(path: &str) -> VfsResult<String> {
    let dir = normalize_directory(path, SEPARATOR)?;
    if dir.starts_with(SEPARATOR) {
        Ok(dir)
    } else {
        Ok(format!("{SEPARATOR}{dir}"))
    }
}

/// Strip characters that are illegal in file names.
///
/// An empty result means the input had no usable file name.
pub fn normalize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_NAME_CHARS.contains(c))
        .collect()
}

/// Normalize a virtual file path.
///
/// The directory part is normalized as a virtual directory and the last
/// segment as a file name. A path ending in a separator normalizes to a
/// directory, which callers detect through an empty [`file_name`].
pub fn normalize_path(path: &str) -> VfsResult<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(VfsError::invalid_path("empty path"));
    }

    let unified = trimmed.replace('\\', "/");
    match unified.rfind(SEPARATOR) {
        None => Ok(format!("{SEPARATOR}{}", normalize_file_name(&unified))),
        Some(idx) => {
            let dir = if idx == 0 {
                ROOT.to_string()
            } else {
                virtual_directory(&unified[..idx])?
            };
            Ok(format!("{dir}{}", normalize_file_name(&unified[idx + 1..])))
        }
    }
}

/// Split a virtual path into its non-empty segments.
pub fn split_virtual_path(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

/// The directory containing `path`, with a trailing separator.
///
/// For a directory path this is its parent; the root is its own parent.
pub fn parent_directory(path: &str) -> String {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) => trimmed[..=idx].to_string(),
        None => ROOT.to_string(),
    }
}

/// The final segment of a file path; empty for a directory path.
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// The final segment of a directory path, without separators.
pub fn directory_name(path: &str) -> &str {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    file_name(trimmed)
}

/// Join a virtual directory and a child name.
pub fn join_virtual(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches(SEPARATOR);
    if dir.ends_with(SEPARATOR) {
        format!("{dir}{name}")
    } else {
        format!("{dir}{SEPARATOR}{name}")
    }
}

/// True when `path` lies in `dir` or below it (case-insensitive).
pub fn is_within(path: &str, dir: &str) -> bool {
    fold_case(path).starts_with(&fold_case(dir))
}

/// Check whether a physical path names a provider-defined location.
///
/// Such locations look like `scheme://...`, where the scheme is at least two
/// characters so Windows drive letters never qualify.
pub fn is_fake_location(path: &str) -> bool {
    match path.find("://") {
        Some(idx) if idx >= 2 => path[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')),
        _ => false,
    }
}
