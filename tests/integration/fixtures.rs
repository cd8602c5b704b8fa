use kiln::core::models::{BuildConfig, Mode, ServeConfig, SourceMapMode};
use std::path::Path;
use tempfile::TempDir;

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Project with a JSON file, a component, a stylesheet and a CommonJS package
pub fn component_app() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "src/main.js",
        "import App from './App.svelte';\n\
         import settings from './settings.json';\n\
         import './global.scss';\n\
         import pad from 'left-pad';\n\
         console.log(App.name, settings.title, pad('1', 3));\n",
    );
    write(
        root,
        "src/App.svelte",
        "<script>\n  const greeting = 'hello';\n</script>\n\n<h1>{greeting}</h1>\n\n<style>\n  h1 { color: red; }\n</style>\n",
    );
    write(root, "src/settings.json", r#"{"title": "kiln demo", "debug": false}"#);
    write(root, "src/global.scss", "$accent: #ff3e00;\nbody { a { color: $accent; } }\n");
    write(
        root,
        "node_modules/left-pad/package.json",
        r#"{"name": "left-pad", "main": "index.js"}"#,
    );
    write(
        root,
        "node_modules/left-pad/index.js",
        "module.exports = function (s, n) { while (s.length < n) s = ' ' + s; return s; };\n",
    );

    dir
}

/// Default pipeline for `mode`, without a dev server
pub fn config(root: &Path, mode: Mode) -> BuildConfig {
    let mut config = BuildConfig::defaults(root.to_path_buf(), mode);
    config.serve = ServeConfig {
        enabled: false,
        ..ServeConfig::default()
    };
    config
}

/// No stages at all, no source map
pub fn bare_config(root: &Path) -> BuildConfig {
    let mut config = config(root, Mode::Production);
    config.stages = Vec::new();
    config.output.sourcemap = SourceMapMode::Off;
    config
}
