//! Key naming rules and path helpers.
//!
//! Record ids are path-like (`docs/a.txt`). Directories are never stored as
//! records; they are derived from the ids. A normalized directory is either
//! the empty string (the root) or a prefix ending in `/` (`docs/`).

/// Prefix of internal management records (index meta, chunks, log, guard).
pub const MANAGE_PREFIX: &str = "manage@";

/// Prefix of chunked upload segments written by the store's uploaders.
pub const CHUNK_PREFIX: &str = "chunk_";

/// Returns `true` if `key` names internal bookkeeping rather than a file.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(MANAGE_PREFIX) || key.starts_with(CHUNK_PREFIX)
}

/// Normalize a user-supplied directory into prefix form.
///
/// Leading `/` are dropped and a trailing `/` is added to non-empty values,
/// so `"/docs"`, `"docs"` and `"docs/"` all become `"docs/"`.
pub fn normalize_directory(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// The parent path of a record id, without trailing slash (`""` at the root).
pub fn parent_directory(id: &str) -> &str {
    match id.rfind('/') {
        Some(pos) => &id[..pos],
        None => "",
    }
}

/// Every ancestor directory of `id`, shallowest first.
///
/// `a/b/c.txt` yields `a` then `a/b`.
pub fn ancestor_directories(id: &str) -> impl Iterator<Item = &str> {
    id.match_indices('/').map(move |(pos, _)| &id[..pos])
}

/// Returns `true` if `id` sits directly inside the normalized `directory`.
pub fn is_direct_child(id: &str, directory: &str) -> bool {
    id.strip_prefix(directory)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// The immediate subdirectory of `directory` that contains `id`, as a full
/// path without trailing slash (`docs/sub`). `None` for direct children and
/// for ids outside `directory`.
pub fn immediate_subdirectory(id: &str, directory: &str) -> Option<String> {
    let rest = id.strip_prefix(directory)?;
    let slash = rest.find('/')?;
    Some(format!("{directory}{}", &rest[..slash]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefixes() {
        assert!(is_reserved_key("manage@index@meta"));
        assert!(is_reserved_key("chunk_0001_abc"));
        assert!(!is_reserved_key("docs/manage@x"));
        assert!(!is_reserved_key("img/c.png"));
    }

    #[test]
    fn normalize_directory_forms() {
        assert_eq!(normalize_directory(""), "");
        assert_eq!(normalize_directory("/"), "");
        assert_eq!(normalize_directory("docs"), "docs/");
        assert_eq!(normalize_directory("/docs"), "docs/");
        assert_eq!(normalize_directory("docs/"), "docs/");
        assert_eq!(normalize_directory("a/b"), "a/b/");
    }

    #[test]
    fn parent_of_nested_and_root_ids() {
        assert_eq!(parent_directory("docs/a.txt"), "docs");
        assert_eq!(parent_directory("a/b/c.txt"), "a/b");
        assert_eq!(parent_directory("top.txt"), "");
    }

    #[test]
    fn ancestors_shallowest_first() {
        let dirs: Vec<&str> = ancestor_directories("a/b/c.txt").collect();
        assert_eq!(dirs, vec!["a", "a/b"]);
        assert_eq!(ancestor_directories("top.txt").count(), 0);
    }

    #[test]
    fn direct_children() {
        assert!(is_direct_child("docs/a.txt", "docs/"));
        assert!(!is_direct_child("docs/sub/a.txt", "docs/"));
        assert!(!is_direct_child("img/c.png", "docs/"));
        assert!(is_direct_child("top.txt", ""));
        assert!(!is_direct_child("docs/a.txt", ""));
    }

    #[test]
    fn immediate_subdirectories() {
        assert_eq!(immediate_subdirectory("docs/a.txt", ""), Some("docs".into()));
        assert_eq!(
            immediate_subdirectory("docs/sub/deep/a.txt", "docs/"),
            Some("docs/sub".into())
        );
        assert_eq!(immediate_subdirectory("docs/a.txt", "docs/"), None);
        assert_eq!(immediate_subdirectory("img/c.png", "docs/"), None);
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[a-z/]{0,12}") {
            let once = normalize_directory(&raw);
            proptest::prop_assert_eq!(normalize_directory(&once), once);
        }

        #[test]
        fn direct_children_have_matching_parent(dir in "[a-c]{1,3}", name in "[a-z]{1,6}") {
            let directory = normalize_directory(&dir);
            let id = format!("{directory}{name}.txt");
            proptest::prop_assert!(is_direct_child(&id, &directory));
            proptest::prop_assert_eq!(parent_directory(&id), directory.trim_end_matches('/'));
        }
    }
}
