use ignore::{DirEntry, WalkBuilder};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracemap_core::{FileCategory, Language, LocatorConfig};
use tracing::{debug, info, warn};

/// Walk every file under `root`, skipping excluded directories, in file-name order
fn walk_files(root: &Path, exclude_dirs: &[String]) -> impl Iterator<Item = PathBuf> {
    let excluded = exclude_dirs.to_vec();
    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry: &DirEntry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| excluded.iter().any(|d| d == name))
                    .unwrap_or(false))
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Walker error: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn root_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned())
}

/// Source files searched when the remembered file has no match.
///
/// Scripting files come first, then web, then compiled; each category is
/// capped at `files_per_category` and the whole list at `max_files`.
pub fn collect_candidate_files(roots: &[PathBuf], config: &LocatorConfig) -> Vec<PathBuf> {
    let mut scripting = Vec::new();
    let mut web = Vec::new();
    let mut compiled = Vec::new();
    let cap = config.files_per_category;

    for root in roots {
        for path in walk_files(root, &config.exclude_dirs) {
            let bucket = match Language::from_path(&path).category() {
                Some(FileCategory::Scripting) => &mut scripting,
                Some(FileCategory::Web) => &mut web,
                Some(FileCategory::Compiled) => &mut compiled,
                None => continue,
            };
            if bucket.len() < cap {
                bucket.push(path);
            }
            if scripting.len() >= cap && web.len() >= cap && compiled.len() >= cap {
                break;
            }
        }
    }

    let mut files: Vec<PathBuf> = scripting.into_iter().chain(web).chain(compiled).collect();
    files.truncate(config.max_files);
    debug!("Collected {} candidate source files", files.len());
    files
}

/// Root name -> relative file paths, at most `max_files` per root
pub fn collect_workspace_structure(roots: &[PathBuf], config: &LocatorConfig) -> Value {
    let mut structure = Map::new();
    for root in roots {
        let files: Vec<Value> = walk_files(root, &config.exclude_dirs)
            .take(config.max_files)
            .map(|path| Value::String(relative(root, &path)))
            .collect();
        info!("Workspace {}: {} files", root.display(), files.len());
        structure.insert(root_label(root), Value::Array(files));
    }
    Value::Object(structure)
}

/// Declared third-party dependencies from the first `package.json` and
/// `requirements.txt` found in the workspace
pub fn collect_dependencies(roots: &[PathBuf], config: &LocatorConfig) -> Value {
    let mut deps = Map::new();

    if let Some(path) = find_first(roots, config, "package.json") {
        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        {
            Some(package) => {
                let field = |name: &str| package.get(name).cloned().unwrap_or_else(|| json!({}));
                deps.insert(
                    "node".to_string(),
                    json!({
                        "dependencies": field("dependencies"),
                        "devDependencies": field("devDependencies"),
                    }),
                );
            }
            None => debug!("Skipping unreadable {}", path.display()),
        }
    }

    if let Some(path) = find_first(roots, config, "requirements.txt") {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let lines: Vec<Value> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|l| Value::String(l.to_string()))
                    .collect();
                deps.insert("python".to_string(), Value::Array(lines));
            }
            Err(e) => debug!("Skipping unreadable {}: {}", path.display(), e),
        }
    }

    Value::Object(deps)
}

fn find_first(roots: &[PathBuf], config: &LocatorConfig, file_name: &str) -> Option<PathBuf> {
    roots.iter().find_map(|root| {
        walk_files(root, &config.exclude_dirs)
            .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(file_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_candidates_are_capped_per_category_and_skip_dependencies() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("py/m{}.py", i), "");
            write(dir.path(), &format!("web/c{}.ts", i), "");
        }
        write(dir.path(), "src/Main.java", "");
        write(dir.path(), "node_modules/lib/index.js", "");
        write(dir.path(), ".venv/lib/site.py", "");
        write(dir.path(), "README.md", "");

        let config = LocatorConfig {
            files_per_category: 3,
            max_files: 7,
            ..LocatorConfig::default()
        };
        let files = collect_candidate_files(&[dir.path().to_path_buf()], &config);

        assert_eq!(files.len(), 7);
        let exts: Vec<&str> = files
            .iter()
            .map(|p| p.extension().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(exts, vec!["py", "py", "py", "ts", "ts", "ts", "java"]);
        assert!(files.iter().all(|p| !p.to_string_lossy().contains("node_modules")));
        assert!(files.iter().all(|p| !p.to_string_lossy().contains(".venv")));
    }

    #[test]
    fn test_structure_lists_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "");
        write(dir.path(), "pkg/util.py", "");
        write(dir.path(), "node_modules/x/index.js", "");

        let structure =
            collect_workspace_structure(&[dir.path().to_path_buf()], &LocatorConfig::default());
        let label = root_label(dir.path());
        assert_eq!(structure[&label], json!(["app.py", "pkg/util.py"]));
    }

    #[test]
    fn test_dependencies_from_manifests() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies": {"express": "^4"}, "name": "x"}"#,
        );
        write(dir.path(), "api/requirements.txt", "flask==3.0\n\nrequests\n");

        let deps = collect_dependencies(&[dir.path().to_path_buf()], &LocatorConfig::default());
        assert_eq!(deps["node"]["dependencies"]["express"], "^4");
        assert_eq!(deps["node"]["devDependencies"], json!({}));
        assert_eq!(deps["python"], json!(["flask==3.0", "requests"]));
    }

    #[test]
    fn test_no_manifests_yields_empty_object() {
        let dir = TempDir::new().unwrap();
        let deps = collect_dependencies(&[dir.path().to_path_buf()], &LocatorConfig::default());
        assert_eq!(deps, json!({}));
    }
}
