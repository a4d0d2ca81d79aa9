use std::path::{Component, Path, PathBuf};

use dirs_next::home_dir;

/// Replaces a leading `~` component with the current user's home directory.
///
/// Paths are left as they are when no home directory is known.
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match (components.next(), home_dir()) {
        (Some(Component::Normal(first)), Some(home)) if first == "~" => {
            let rest = components.as_path();
            if rest.as_os_str().is_empty() { home } else { home.join(rest) }
        }
        _ => path.to_path_buf(),
    }
}

/// Expands `~` and anchors relative paths at `base`, usually the directory of the
/// file that named them.
pub fn resolve_path(path: &Path, base: Option<&Path>) -> PathBuf {
    let expanded = expand_home(path);
    match base {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_untouched() {
        let path = Path::new("/var/lib/nodeflow/runs.jsonl");
        assert_eq!(expand_home(path), path);
        assert_eq!(resolve_path(path, Some(Path::new("/etc/nodeflow"))), path);
    }

    #[test]
    fn home_prefix_is_expanded() {
        let Some(home) = home_dir() else {
            return;
        };
        assert_eq!(expand_home(Path::new("~")), home);
        assert_eq!(expand_home(Path::new("~/flows/graph.json")), home.join("flows/graph.json"));
        assert_eq!(expand_home(Path::new("~flows/graph.json")), Path::new("~flows/graph.json"));
        assert_eq!(resolve_path(Path::new("~/runs.jsonl"), Some(Path::new("/etc/nodeflow"))), home.join("runs.jsonl"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        assert_eq!(
            resolve_path(Path::new("logs/runs.jsonl"), Some(Path::new("/etc/nodeflow"))),
            Path::new("/etc/nodeflow/logs/runs.jsonl")
        );
        assert_eq!(resolve_path(Path::new("logs/runs.jsonl"), None), Path::new("logs/runs.jsonl"));
    }
}
