use std::path::Path;
use walkdir::WalkDir;

use crate::error::{RelevanceError, Result};

/// Everything the walker found under a root, as sorted `/`-separated paths
/// relative to that root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub files: Vec<String>,
    /// Every directory that survived filtering, used for the tree
    pub dirs: Vec<String>,
}

/// Walk `root` and collect the indexable text files beneath it.
///
/// Hidden and vendored directories are pruned. Entries that cannot be read
/// are logged and skipped; only a missing or unreadable root is an error.
pub fn collect_candidates(root: &Path) -> Result<Candidates> {
    let meta = std::fs::metadata(root).map_err(|e| RelevanceError::file_access(root, e))?;
    if !meta.is_dir() {
        return Err(RelevanceError::file_access(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut candidates = Candidates::default();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error walking {}: {e}", root.display());
                continue;
            }
        };

        let rel = relative_path(root, entry.path());
        if entry.file_type().is_dir() {
            candidates.dirs.push(rel);
        } else if entry.file_type().is_file() && is_indexable_file(entry.path()) {
            candidates.files.push(rel);
        }
    }

    candidates.files.sort();
    candidates.dirs.sort();
    tracing::info!(
        "Found {} candidate files in {} directories under {}",
        candidates.files.len(),
        candidates.dirs.len(),
        root.display()
    );
    Ok(candidates)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden_or_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    name.ends_with(".egg-info")
        || matches!(
            name.as_ref(),
            "node_modules"
                | "target"
                | "dist"
                | "build"
                | "__pycache__"
                | "__mocks__"
                | "coverage"
                | "vendor"
                | "venv"
                | "env"
        )
}

fn is_indexable_file(path: &Path) -> bool {
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if filename.ends_with(".min.js") || filename.ends_with(".min.css") {
        return false;
    }

    if matches!(
        filename.as_str(),
        "makefile"
            | "dockerfile"
            | "rakefile"
            | "gemfile"
            | "cmakelists.txt"
            | "readme"
            | "license"
    ) {
        return true;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    matches!(
        ext.as_str(),
        "rs" | "py"
            | "js"
            | "ts"
            | "tsx"
            | "jsx"
            | "mjs"
            | "go"
            | "java"
            | "c"
            | "cpp"
            | "cc"
            | "h"
            | "hpp"
            | "cs"
            | "rb"
            | "php"
            | "swift"
            | "kt"
            | "kts"
            | "scala"
            | "r"
            | "lua"
            | "sh"
            | "bash"
            | "zsh"
            | "ps1"
            | "sql"
            | "html"
            | "css"
            | "scss"
            | "md"
            | "rst"
            | "txt"
            | "proto"
            | "graphql"
            | "vue"
            | "svelte"
            | "ex"
            | "exs"
            | "erl"
            | "hs"
            | "ml"
            | "clj"
            | "tf"
            | "nix"
            | "zig"
            | "dart"
            | "jl"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x\n").unwrap();
    }

    #[test]
    fn test_collects_sorted_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "README.md");
        touch(dir.path(), "src/util/strings.go");

        let c = collect_candidates(dir.path()).unwrap();
        assert_eq!(c.files, vec!["README.md", "src/main.rs", "src/util/strings.go"]);
        assert_eq!(c.dirs, vec!["src", "src/util"]);
    }

    #[test]
    fn test_skips_ignored_directories_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "node_modules/pkg/index.js");
        touch(dir.path(), ".git/config.txt");
        touch(dir.path(), "target/debug/out.rs");
        touch(dir.path(), ".env");
        touch(dir.path(), "lib/app.py");

        let c = collect_candidates(dir.path()).unwrap();
        assert_eq!(c.files, vec!["lib/app.py"]);
        assert_eq!(c.dirs, vec!["lib"]);
    }

    #[test]
    fn test_skips_non_indexable_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "logo.png");
        touch(dir.path(), "bundle.min.js");
        touch(dir.path(), "Makefile");
        touch(dir.path(), "app.js");

        let c = collect_candidates(dir.path()).unwrap();
        assert_eq!(c.files, vec!["Makefile", "app.js"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_candidates(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RelevanceError::FileAccess { .. }));
    }
}
