//! Remote path helpers.
//!
//! Remote paths are plain forward-slash strings regardless of the local OS,
//! so they are handled as `str` rather than `std::path::Path`.

use std::path::{Component, Path};

/// Normalize a relative path into the form used as a checksum map key:
/// no leading `./`. Backslashes are kept; on the remote they are ordinary
/// filename characters.
pub fn normalize_relative(path: &str) -> String {
    let mut normalized = path;
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest;
    }
    normalized.to_string()
}

/// Convert a local relative path into a map key, joining its components
/// with `/` whatever the host separator is.
pub fn relative_key(path: &Path) -> String {
    let joined = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    normalize_relative(&joined)
}

/// Join a relative path onto a remote directory.
pub fn remote_join(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        return relative.to_string();
    }
    if base == "/" {
        return format!("/{}", relative);
    }
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

/// Parent directory of a remote path, or `None` for a bare name.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Every directory prefix of `path`, shortest first.
///
/// `"a/b/c"` yields `["a", "a/b", "a/b/c"]`; an absolute path keeps its
/// leading slash (`"/srv/www"` yields `["/srv", "/srv/www"]`). Empty and `.`
/// segments are skipped.
pub fn prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut out = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() {
            current.push('/');
        } else if absolute {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-~+@%:,".contains(c))
    {
        // A leading ~ must stay unquoted for the remote shell to expand it.
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("./index.html"), "index.html");
        assert_eq!(normalize_relative("././a b.txt"), "a b.txt");
        assert_eq!(normalize_relative("plain"), "plain");
    }

    #[test]
    fn test_relative_key() {
        assert_eq!(relative_key(Path::new("assets/js/app.js")), "assets/js/app.js");
        assert_eq!(relative_key(Path::new("./index.html")), "index.html");
        assert_eq!(relative_key(&Path::new("assets").join("app.js")), "assets/app.js");
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_a_name_character_on_unix() {
        assert_eq!(relative_key(Path::new("dir/a\\b.txt")), "dir/a\\b.txt");
        assert_eq!(normalize_relative("./a\\b.txt"), "a\\b.txt");
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("site/public_html", "a/b.js"), "site/public_html/a/b.js");
        assert_eq!(remote_join("site/", "b.js"), "site/b.js");
        assert_eq!(remote_join("", "b.js"), "b.js");
        assert_eq!(remote_join("/", "b.js"), "/b.js");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("a/b/c.js"), Some("a/b"));
        assert_eq!(remote_parent("/c.js"), Some("/"));
        assert_eq!(remote_parent("c.js"), None);
    }

    #[test]
    fn test_prefixes_relative() {
        assert_eq!(prefixes("a/b/c"), vec!["a", "a/b", "a/b/c"]);
        assert_eq!(prefixes("a//b/"), vec!["a", "a/b"]);
        assert_eq!(prefixes("./a"), vec!["a"]);
    }

    #[test]
    fn test_prefixes_absolute() {
        assert_eq!(prefixes("/srv/www"), vec!["/srv", "/srv/www"]);
        assert!(prefixes("/").is_empty());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("domains/site"), "domains/site");
        assert_eq!(shell_quote("my dir"), "'my dir'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
