//! Relative links between units.
//!
//! Include markers store the target unit's path relative to the folder of
//! the including unit, always with `/` separators so archives move between
//! platforms unchanged.

use std::path::{Component, Path, PathBuf};

/// Path of `to` relative to the folder `from_dir`, `/`-separated.
///
/// Both paths are normalized first. When they share no common prefix (for
/// example one is absolute and the other relative) the normalized `to` is
/// returned as is.
pub fn relative_href(from_dir: &Path, to: &Path) -> String {
    let from = path_clean::clean(from_dir);
    let to = path_clean::clean(to);

    let from_parts: Vec<Component<'_>> = from.components().filter(|c| !is_cur(c)).collect();
    let to_parts: Vec<Component<'_>> = to.components().filter(|c| !is_cur(c)).collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let rooted = |parts: &[Component<'_>]| {
        parts
            .first()
            .is_some_and(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
    };
    if common == 0 && (rooted(&from_parts) || rooted(&to_parts)) {
        return join_slash(to_parts.iter());
    }

    let ups = from_parts.len() - common;
    let mut segments: Vec<String> = std::iter::repeat("..".to_string()).take(ups).collect();
    segments.extend(
        to_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

/// Resolve an include `href` found in the unit at `unit_path`.
pub fn resolve_href(unit_path: &Path, href: &str) -> PathBuf {
    let mut joined = if href.starts_with('/') {
        PathBuf::from("/")
    } else {
        unit_path.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
    };
    for segment in href.split('/').filter(|s| !s.is_empty()) {
        joined.push(segment);
    }
    path_clean::clean(joined)
}

fn is_cur(c: &Component<'_>) -> bool {
    matches!(c, Component::CurDir)
}

fn join_slash<'a>(parts: impl Iterator<Item = &'a Component<'a>>) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            Component::RootDir => out.push('/'),
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}
