use crate::fixtures::write;
use kiln::core::models::{Mode, OutputFormat};
use kiln::core::services::BuildOrchestrator;
use kiln::utils::{CliOverrides, ConfigLoader, CONFIG_FILE_NAME};

#[tokio::test]
async fn test_config_file_drives_the_build() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/index.js", "export const answer = 42;\n");
    write(
        dir.path(),
        CONFIG_FILE_NAME,
        r#"{
  "entry": "src/index.js",
  "output": { "file": "dist/lib.js", "format": "cjs", "sourcemap": false },
  "stages": [{ "name": "minify", "enabled": "never" }]
}"#,
    );

    let file_config = ConfigLoader::load_from_file(dir.path(), None).unwrap();
    let config = ConfigLoader::merge_with_cli(
        file_config,
        dir.path().to_path_buf(),
        &CliOverrides::default(),
        Mode::Production,
    );
    assert_eq!(config.output.format, OutputFormat::Cjs);

    let artifact = BuildOrchestrator::new(config).unwrap().run_build().await.unwrap();
    assert!(artifact.path.ends_with("dist/lib.js"));
    assert!(artifact.content.trim_end().ends_with("module.exports = __kiln_entry;"));
    assert!(artifact.map_path.is_none());
}
