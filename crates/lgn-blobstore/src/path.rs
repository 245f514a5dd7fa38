//! Conversions between structured `(container, key)` pairs and native
//! single-string paths.
//!
//! Native paths only exist between the facade and the gateway: the facade
//! receives containers and keys, builds a path here, and hands it to the
//! backend.

/// The separator used by native paths.
pub const SEPARATOR: char = '/';

/// Builds the native path of a key inside a container.
///
/// Trailing separators on the container and leading separators on the key are
/// trimmed, so `("c1/", "/a/b.txt")` and `("c1", "a/b.txt")` both yield
/// `c1/a/b.txt`.
pub fn native_path(container: &str, key: &str) -> String {
    let container = container.trim_end_matches(SEPARATOR);
    let key = key.trim_start_matches(SEPARATOR);

    if key.is_empty() {
        container.to_string()
    } else {
        format!("{}{}{}", container, SEPARATOR, key)
    }
}

/// Builds the native path used to create a directory: `container/directory`.
pub fn directory_path(container: &str, directory: &str) -> String {
    native_path(container, directory.trim_end_matches(SEPARATOR))
}

/// Builds the native marker path of a directory: `container/directory/`.
///
/// The trailing separator is significant: it distinguishes a directory from
/// a blob with the same name.
pub fn directory_marker_path(container: &str, directory: &str) -> String {
    let mut path = directory_path(container, directory);
    path.push(SEPARATOR);

    path
}

/// Splits a native path into its container and its optional prefix.
///
/// The container is the first segment. The prefix is everything after the
/// first separator, once trailing separators are stripped. A path without a
/// separator, or ending right after the container, has no prefix.
pub fn parse_path(path: &str) -> (&str, Option<&str>) {
    let path = path.trim_end_matches(SEPARATOR);

    match path.split_once(SEPARATOR) {
        Some((container, prefix)) if !prefix.is_empty() => (container, Some(prefix)),
        Some((container, _)) => (container, None),
        None => (path, None),
    }
}

/// Returns the container part of a native path.
pub fn parse_container_from_path(path: &str) -> &str {
    parse_path(path).0
}

/// Returns the prefix part of a native path, if any.
pub fn parse_prefix_from_path(path: &str) -> Option<&str> {
    parse_path(path).1
}

/// Whether a native path or entry name denotes a directory marker.
pub fn is_directory_marker(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Whether a native path addresses a container: a single segment, without
/// any key below it.
pub fn is_container_path(path: &str) -> bool {
    !path.trim_matches(SEPARATOR).contains(SEPARATOR)
}
