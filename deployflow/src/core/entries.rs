//! Listing entries and the depth-1 normalization shared by every backend.

use std::collections::BTreeMap;
use std::fmt;

/// One listing result: a repository-relative path and a directory flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entry {
    /// `/`-separated path relative to the repository root, no trailing `/`.
    pub path: String,
    pub is_dir: bool,
}

impl Entry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.path)
        } else {
            f.write_str(&self.path)
        }
    }
}

/// Normalize a requested directory into a prefix: `""`, `"."` and `"/"` map to
/// the root (`""`), anything else gains exactly one trailing `/`.
pub fn dir_prefix(subdir: &str) -> String {
    let trimmed = subdir
        .trim()
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string();
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Normalize a member name from an archive or tree listing.
///
/// Returns the cleaned path and whether the name itself was marked as a
/// directory with a trailing separator.
pub fn clean_member(name: &str) -> (String, bool) {
    let unified = name.replace('\\', "/");
    let marked_dir = unified.ends_with('/');
    let cleaned = unified
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string();
    (cleaned, marked_dir)
}

/// Reduce a flat set of `(path, is_dir)` members to the immediate children of
/// `subdir`.
///
/// A member deeper than one level contributes its first path segment below the
/// prefix as a directory, so archives without explicit directory members still
/// produce their folders. Results are sorted and deduplicated; a path seen as
/// both file and directory is reported as a directory.
pub fn immediate_children<I, S>(members: I, subdir: &str) -> Vec<Entry>
where
    I: IntoIterator<Item = (S, bool)>,
    S: AsRef<str>,
{
    let prefix = dir_prefix(subdir);
    let mut children: BTreeMap<String, bool> = BTreeMap::new();

    for (member, is_dir) in members {
        let (path, marked_dir) = clean_member(member.as_ref());
        let Some(rest) = path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let (child, child_is_dir) = match rest.split_once('/') {
            Some((head, _)) => (head, true),
            None => (rest, is_dir || marked_dir),
        };
        let flag = children.entry(format!("{prefix}{child}")).or_insert(false);
        *flag |= child_is_dir;
    }

    children
        .into_iter()
        .map(|(path, is_dir)| Entry { path, is_dir })
        .collect()
}

/// True when `subdir` names a directory among `members`: some member lives
/// strictly below it, or a member at that path is a directory. Archive
/// listings use this to tell an empty directory from a missing one, and a
/// file path from a directory.
pub fn has_prefix<I, S>(members: I, subdir: &str) -> bool
where
    I: IntoIterator<Item = (S, bool)>,
    S: AsRef<str>,
{
    let prefix = dir_prefix(subdir);
    if prefix.is_empty() {
        return true;
    }
    let bare = prefix.trim_end_matches('/');
    members.into_iter().any(|(member, is_dir)| {
        let (path, marked_dir) = clean_member(member.as_ref());
        path.starts_with(prefix.as_str()) || (path == bare && (is_dir || marked_dir))
    })
}

/// Render entries the way the oracle sees them (`["README.md", "app/"]`).
pub fn render(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(Entry::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_like() -> Vec<(&'static str, bool)> {
        vec![
            ("README.md", false),
            ("app/", true),
            ("app/app.py", false),
            ("app/templates/index.html", false),
            ("app/static/css/site.css", false),
        ]
    }

    #[test]
    fn root_listing_has_depth_one() {
        let entries = immediate_children(zip_like(), "");
        assert_eq!(render(&entries), vec!["README.md", "app/"]);
    }

    #[test]
    fn subdir_listing_infers_directories() {
        let entries = immediate_children(zip_like(), "app");
        assert_eq!(
            render(&entries),
            vec!["app/app.py", "app/static/", "app/templates/"]
        );
        assert_eq!(immediate_children(zip_like(), "app/"), entries);
    }

    #[test]
    fn tar_style_members_use_explicit_kind() {
        let members = vec![("proj", true), ("proj/src", true), ("proj/src/main.py", false)];
        let entries = immediate_children(members, "proj/");
        assert_eq!(entries, vec![Entry::dir("proj/src")]);
    }

    #[test]
    fn prefix_match_requires_separator() {
        let members = vec![("application/x.py", false), ("app/y.py", false)];
        let entries = immediate_children(members, "app");
        assert_eq!(render(&entries), vec!["app/y.py"]);
    }

    #[test]
    fn dir_prefix_normalizes() {
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("/"), "");
        assert_eq!(dir_prefix("./app/"), "app/");
        assert_eq!(dir_prefix("app\\templates"), "app/templates/");
    }

    #[test]
    fn has_prefix_distinguishes_missing_dirs() {
        let names = [("app/app.py", false), ("README.md", false)];
        assert!(has_prefix(names, "app"));
        assert!(!has_prefix(names, "lib/"));
    }

    #[test]
    fn has_prefix_rejects_file_paths() {
        assert!(!has_prefix(zip_like(), "README.md"));
        assert!(!has_prefix(zip_like(), "app/app.py/"));
        assert!(has_prefix([("empty/", false)], "empty"));
        assert!(has_prefix([("proj", true)], "proj"));
    }
}
