//! Shared path helpers for providers.

/// Normalize a path (remove trailing slashes, handle //).
pub(crate) fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    while result.contains("//") {
        result = result.replace("//", "/");
    }
    while result.ends_with('/') && result.len() > 1 {
        result.pop();
    }
    if !result.starts_with('/') {
        result = format!("/{}", result);
    }
    result
}

/// Join a normalized parent path and a child name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    let trimmed = parent.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", trimmed, name)
    }
}

/// Split a normalized path into its parent and last component.
///
/// Returns `None` for the root.
pub(crate) fn split_path(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind('/')?;
    let name = &path[idx + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, name))
}

/// Path of `path` relative to the directory `root`, if it lies strictly below it.
pub(crate) fn relative_to(root: &str, path: &str) -> Option<String> {
    let prefix = if root == "/" {
        "/".to_string()
    } else {
        format!("{}/", root)
    };
    path.strip_prefix(&prefix)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

/// Whether `path` equals `ancestor` or lies below it.
pub(crate) fn is_within(ancestor: &str, path: &str) -> bool {
    path == ancestor || relative_to(ancestor, path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/foo"), "/foo");
        assert_eq!(normalize_path("/foo/"), "/foo");
        assert_eq!(normalize_path("/foo//bar"), "/foo/bar");
        assert_eq!(normalize_path("/foo///bar"), "/foo/bar");
        assert_eq!(normalize_path("foo"), "/foo");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/a/", "b"), "/a/b");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("/a"), Some(("/", "a")));
        assert_eq!(split_path("/a/b/c"), Some(("/a/b", "c")));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("/", "/a"), Some("a".to_string()));
        assert_eq!(relative_to("/a", "/a/b/c"), Some("b/c".to_string()));
        assert_eq!(relative_to("/a", "/a"), None);
        assert_eq!(relative_to("/a", "/ab"), None);
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a", "/a/b"));
        assert!(!is_within("/a", "/ab"));
    }
}
