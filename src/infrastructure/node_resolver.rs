use crate::core::interfaces::ModuleResolver;
use crate::core::models::ResolveConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Package.json structure for parsing npm packages
#[derive(Debug, Clone, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(HashMap<String, serde_json::Value>),
}

/// Node.js-style module resolution with browser-field and dedupe support
pub struct NodeModuleResolver {
    root: PathBuf,
    extensions: Vec<String>,
    browser: bool,
    dedupe: Vec<String>,
    /// Parsed package.json files; `None` records a missing or invalid file
    package_cache: DashMap<PathBuf, Option<PackageJson>>,
}

impl NodeModuleResolver {
    pub fn new(root: PathBuf, config: &ResolveConfig) -> Self {
        Self {
            root,
            extensions: config.extensions.clone(),
            browser: config.browser,
            dedupe: config.dedupe.clone(),
            package_cache: DashMap::new(),
        }
    }

    async fn resolve_path(&self, import_path: &str, from_file: &Path) -> Option<PathBuf> {
        // Handle relative imports
        if import_path.starts_with("./") || import_path.starts_with("../") {
            let resolved = from_file.parent()?.join(import_path);
            return self.resolve_file_or_directory(&resolved).await;
        }

        // Absolute imports are taken from the project root
        if let Some(stripped) = import_path.strip_prefix('/') {
            let resolved = self.root.join(stripped);
            return self.resolve_file_or_directory(&resolved).await;
        }

        self.resolve_node_module(import_path, from_file).await
    }

    /// Resolve a node_modules package
    async fn resolve_node_module(&self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        let (pkg_name, subpath) = parse_package_specifier(specifier);

        // Deduped packages always come from the root's node_modules
        let start = if self.dedupe.iter().any(|d| *d == pkg_name) {
            self.root.clone()
        } else {
            from_file.parent()?.to_path_buf()
        };

        // Walk up directory tree looking for node_modules
        let mut current_dir = Some(start.as_path());
        while let Some(dir) = current_dir {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if package_dir.is_dir() {
                if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref()).await {
                    return Some(entry);
                }
            }
            current_dir = dir.parent();
        }

        None
    }

    /// Resolve package entry point
    async fn resolve_package_entry(&self, package_dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        let package = self.read_package_json(&package_dir.join("package.json")).await;

        let resolved = match subpath {
            Some(subpath) => self.resolve_file_or_directory(&package_dir.join(subpath)).await?,
            None => self.resolve_main(package_dir, package.as_ref()).await?,
        };

        match package.as_ref() {
            Some(pkg) if self.browser => Some(browser_replacement(package_dir, pkg, &resolved)),
            _ => Some(resolved),
        }
    }

    /// Entry fields in order of preference: browser (string form), module, main, index
    async fn resolve_main(&self, package_dir: &Path, package: Option<&PackageJson>) -> Option<PathBuf> {
        if let Some(pkg) = package {
            let mut fields = Vec::new();
            if self.browser {
                if let Some(BrowserField::String(browser)) = &pkg.browser {
                    fields.push(browser.as_str());
                }
            }
            fields.extend(pkg.module.as_deref());
            fields.extend(pkg.main.as_deref());

            for field in fields {
                if let Some(resolved) = self.resolve_file_or_directory(&package_dir.join(field)).await {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(package_dir)
    }

    /// Try to resolve as file or directory
    async fn resolve_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path) {
            return Some(file);
        }

        if !path.is_dir() {
            return None;
        }

        // A directory with its own package.json names its entry through `main`
        if let Some(pkg) = self.read_package_json(&path.join("package.json")).await {
            if let Some(main) = &pkg.main {
                if let Some(resolved) = self.resolve_as_file(&path.join(main)) {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(path)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.resolve_as_file(&dir.join("index"))
    }

    /// Try the path as-is, then with each configured extension appended
    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(normalize(path));
        }

        self.extensions.iter().find_map(|ext| {
            let mut candidate: OsString = path.as_os_str().to_owned();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            candidate.is_file().then(|| normalize(&candidate))
        })
    }

    /// Read and cache package.json
    async fn read_package_json(&self, path: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let package = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<PackageJson>(&content).ok(),
            Err(_) => None,
        };

        self.package_cache.insert(path.to_path_buf(), package.clone());
        package
    }
}

#[async_trait]
impl ModuleResolver for NodeModuleResolver {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let resolved = self.resolve_path(specifier, importer).await?;
        // Canonical paths keep one graph node per physical file
        Some(std::fs::canonicalize(&resolved).unwrap_or(resolved))
    }
}

/// Parse package specifier into package name and subpath
fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name_parts = if specifier.starts_with('@') { 2 } else { 1 };

    let name: Vec<&str> = parts.by_ref().take(name_parts).collect();
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name.join("/"), subpath)
}

/// Apply an object-form `browser` field mapping to a file resolved inside the package
fn browser_replacement(package_dir: &Path, package: &PackageJson, resolved: &Path) -> PathBuf {
    let Some(BrowserField::Object(map)) = &package.browser else {
        return resolved.to_path_buf();
    };

    for (from, to) in map {
        let Some(to) = to.as_str() else { continue };
        let from_path = normalize(&package_dir.join(from));
        let matches = from_path == resolved
            || (from_path.extension().is_none() && resolved.with_extension("") == from_path);
        if matches {
            let replacement = normalize(&package_dir.join(to));
            if replacement.is_file() {
                return replacement;
            }
        }
    }

    resolved.to_path_buf()
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
