use crate::fixtures::{bare_config, component_app, config, write};
use kiln::core::models::{EnabledWhen, Mode, SourceMapMode, StageDescriptor};
use kiln::core::services::BuildOrchestrator;
use kiln::utils::BuildError;

#[tokio::test]
async fn test_dependency_code_precedes_importer() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/main.js", "import { twice } from './util.js';\nconsole.log(twice(21));\n");
    write(dir.path(), "src/util.js", "export function twice(n) {\n  return n * 2;\n}\n");

    let artifact = BuildOrchestrator::new(bare_config(dir.path()))
        .unwrap()
        .run_build()
        .await
        .unwrap();

    let util = artifact.content.find("return n * 2;").unwrap();
    let main = artifact.content.find("console.log(twice(21));").unwrap();
    assert!(util < main, "util must be emitted before main");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("public/build/bundle.js")).unwrap(),
        artifact.content
    );
}

#[tokio::test]
async fn test_repeated_builds_are_identical() {
    let dir = component_app();
    let orchestrator = BuildOrchestrator::new(config(dir.path(), Mode::Development)).unwrap();

    let first = orchestrator.run_build().await.unwrap();
    let second = orchestrator.run_build().await.unwrap();
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.source_map, second.source_map);
}

#[tokio::test]
async fn test_development_pipeline_handles_every_module_kind() {
    let dir = component_app();
    let artifact = BuildOrchestrator::new(config(dir.path(), Mode::Development))
        .unwrap()
        .run_build()
        .await
        .unwrap();

    let code = &artifact.content;
    assert!(code.contains(r#"__define("src/App.svelte""#));
    assert!(code.contains(r#"__define("src/settings.json""#));
    assert!(code.contains(r#"__define("node_modules/left-pad/index.js""#));
    assert!(code.contains("kiln demo"));
    assert!(code.contains("#ff3e00"));
    assert!(code.contains("ws://"), "live-reload client expected in development");
    assert!(code.contains("//# sourceMappingURL=bundle.js.map"));
    assert!(dir.path().join("public/build/bundle.js.map").exists());
}

#[tokio::test]
async fn test_production_pipeline_minifies_without_live_reload() {
    let dir = component_app();
    let development = BuildOrchestrator::new(config(dir.path(), Mode::Development))
        .unwrap()
        .run_build()
        .await
        .unwrap();
    let production = BuildOrchestrator::new(config(dir.path(), Mode::Production))
        .unwrap()
        .run_build()
        .await
        .unwrap();

    assert!(!production.content.contains("ws://"));
    assert!(production.size() < development.size());
    let map = production.source_map.unwrap();
    assert!(map.contains("src/main.js"));
}

#[tokio::test]
async fn test_disabled_stage_equals_absent_stage() {
    let dir = component_app();

    let mut with_disabled = config(dir.path(), Mode::Production);
    with_disabled.output.sourcemap = SourceMapMode::Off;
    for stage in with_disabled.stages.iter_mut().filter(|s| s.name == "minify") {
        stage.enabled = EnabledWhen::Never;
    }
    let mut without = with_disabled.clone();
    without.stages.retain(|s| s.name != "minify");

    let a = BuildOrchestrator::new(with_disabled).unwrap().run_build().await.unwrap();
    let b = BuildOrchestrator::new(without).unwrap().run_build().await.unwrap();
    assert_eq!(a.content, b.content);
}

#[tokio::test]
async fn test_missing_import_produces_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/main.js", "import './nowhere.js';\n");

    let err = BuildOrchestrator::new(bare_config(dir.path()))
        .unwrap()
        .run_build()
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Resolution { ref path, .. } if path == "./nowhere.js"));
    assert!(!dir.path().join("public/build/bundle.js").exists());
}

#[tokio::test]
async fn test_cycle_names_both_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/main.js", "import './a.js';\n");
    write(dir.path(), "src/a.js", "import './b.js';\nexport const a = 1;\n");
    write(dir.path(), "src/b.js", "import './a.js';\nexport const b = 2;\n");

    let err = BuildOrchestrator::new(bare_config(dir.path()))
        .unwrap()
        .run_build()
        .await
        .unwrap_err();

    match err {
        BuildError::Cycle { cycle_paths } => {
            assert!(cycle_paths.iter().any(|p| p.ends_with("a.js")));
            assert!(cycle_paths.iter().any(|p| p.ends_with("b.js")));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stage_failure_names_stage_and_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/main.js", "import data from './broken.json';\nconsole.log(data);\n");
    write(dir.path(), "src/broken.json", "{ not json");

    let mut config = bare_config(dir.path());
    config.stages = vec![StageDescriptor::new("json")];
    let err = BuildOrchestrator::new(config).unwrap().run_build().await.unwrap_err();

    match err {
        BuildError::Stage { stage, path, .. } => {
            assert_eq!(stage, "json");
            assert!(path.unwrap().ends_with("broken.json"));
        }
        other => panic!("expected a stage error, got {other:?}"),
    }
    assert!(!dir.path().join("public/build/bundle.js").exists());
}

#[tokio::test]
async fn test_unknown_stage_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = bare_config(dir.path());
    config.stages = vec![StageDescriptor::new("typescript")];

    assert!(matches!(
        BuildOrchestrator::new(config),
        Err(BuildError::Config(_))
    ));
}

#[tokio::test]
async fn test_process_shim_keeps_leading_import_linked() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/main.js",
        "import { twice } from './util.js';\nconsole.log(process.env.NODE_ENV, twice(2));\n",
    );
    write(dir.path(), "src/util.js", "export function twice(n) {\n  return n * 2;\n}\n");

    for mode in [Mode::Development, Mode::Production] {
        let artifact = BuildOrchestrator::new(config(dir.path(), mode))
            .unwrap()
            .run_build()
            .await
            .unwrap();

        assert!(
            !artifact.content.contains("./util.js"),
            "{} bundle still carries the raw import",
            mode.as_str()
        );
        assert!(artifact.content.contains(mode.as_str()));
    }
}

#[tokio::test]
async fn test_production_iife_defines_its_global() {
    let dir = component_app();
    let artifact = BuildOrchestrator::new(config(dir.path(), Mode::Production))
        .unwrap()
        .run_build()
        .await
        .unwrap();

    assert!(artifact.content.contains("var app"), "the `app` global must survive minification");
}

#[tokio::test]
async fn test_node_builtins_in_dependencies_are_polyfilled() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/main.js", "import emitter from 'tiny-emitter';\nconsole.log(emitter());\n");
    write(
        dir.path(),
        "node_modules/tiny-emitter/package.json",
        r#"{"name": "tiny-emitter", "main": "index.js"}"#,
    );
    write(
        dir.path(),
        "node_modules/tiny-emitter/index.js",
        "var EventEmitter = require('events');\n\
         var path = require('node:path');\n\
         var fs = require('fs');\n\
         module.exports = function () { new EventEmitter().emit('x'); return path.join('a', 'b') + typeof fs; };\n",
    );

    let artifact = BuildOrchestrator::new(config(dir.path(), Mode::Development))
        .unwrap()
        .run_build()
        .await
        .unwrap();

    let code = &artifact.content;
    assert!(code.contains(r#"__define("__polyfills__/events.js""#));
    assert!(code.contains(r#"__define("__polyfills__/path.js""#));
    assert!(code.contains(r#"__define("__polyfills__/fs.js", function (module, exports, __require) { "#));
    assert!(code.contains(r#"__require("__polyfills__/events.js")"#));
    assert!(!code.contains("require('events')"));
}
