//! Repository-relative path handling.
//!
//! All paths the adapter works with are slash-separated, begin with `/` and
//! carry no trailing slash except for the root itself. Backends receive the
//! repository-root-joined form.

/// Normalize a slash-separated path.
///
/// Collapses repeated separators, resolves `.` and `..` (never escaping the
/// root) and strips any trailing slash. The empty string normalizes to `/`.
pub fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }
    let mut out = String::from("/");
    out.push_str(&components.join("/"));
    out
}

/// Join a normalized base onto a repository-relative path.
pub fn join(base: &str, path: &str) -> String {
    let mut joined = String::with_capacity(base.len() + path.len() + 1);
    joined.push_str(base);
    joined.push('/');
    joined.push_str(path);
    normalize(&joined)
}

/// Final component of a normalized path; empty for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Strip the repository prefix from a volume-absolute path.
pub fn strip_repository<'a>(repository: &str, full_path: &'a str) -> &'a str {
    if repository == "/" {
        full_path
    } else {
        full_path.strip_prefix(repository).unwrap_or(full_path)
    }
}
