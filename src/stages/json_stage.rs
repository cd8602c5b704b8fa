// JSON stage: turns `.json` modules into JavaScript modules

use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::ModuleKind;
use crate::utils::StageFailure;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Options: `namedExports` (default true) exports each top-level key that is a
/// valid identifier; `indent` pretty-prints the embedded value (compact when absent)
pub struct JsonStage;

fn render_value(value: &serde_json::Value, indent: Option<&str>) -> Result<String, String> {
    let Some(indent) = indent else {
        return Ok(value.to_string());
    };

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    serde::Serialize::serialize(value, &mut serializer).map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

impl JsonStage {
    pub fn to_module(source: &str, named_exports: bool, indent: Option<&str>) -> Result<String, String> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| format!("invalid JSON: {}", e))?;

        let mut code = format!(
            "const __json = {};\nexport default __json;\n",
            render_value(&value, indent)?
        );
        if let (true, Some(object)) = (named_exports, value.as_object()) {
            for key in object.keys() {
                if IDENTIFIER_REGEX.is_match(key) && !RESERVED_WORDS.contains(&key.as_str()) {
                    code.push_str(&format!("export const {} = __json[{}];\n", key, serde_json::Value::String(key.clone())));
                }
            }
        }
        Ok(code)
    }
}

#[async_trait]
impl Stage for JsonStage {
    fn name(&self) -> &str {
        "json"
    }

    async fn transform(&self, mut graph: BuildGraph, ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        let named_exports = ctx.bool_option("namedExports", true);
        let indent = ctx.str_option("indent");

        for module in graph.modules_mut().filter(|m| m.kind == ModuleKind::Json) {
            let code = Self::to_module(&module.transformed, named_exports, indent)
                .map_err(|message| StageFailure::at(&module.id, message))?;
            module.transformed = code;
            module.kind = ModuleKind::JavaScript;
            module.source_map = None;
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Mode, ModuleNode, StageOptions};
    use std::path::{Path, PathBuf};

    #[test]
    fn test_named_exports_for_identifier_keys() {
        let code = JsonStage::to_module(r#"{"title": "kiln", "two words": 1, "class": 2}"#, true, None).unwrap();
        assert!(code.starts_with("const __json = {"));
        assert!(code.contains("export default __json;"));
        assert!(code.contains(r#"export const title = __json["title"];"#));
        assert!(!code.contains("two words = "));
        assert!(!code.contains("export const class"));
    }

    #[test]
    fn test_indent_pretty_prints_value() {
        let code = JsonStage::to_module(r#"{"a": 1}"#, false, Some("\t")).unwrap();
        assert_eq!(code, "const __json = {\n\t\"a\": 1\n};\nexport default __json;\n");
    }

    #[tokio::test]
    async fn test_invalid_json_fails_with_path() {
        let mut graph = BuildGraph::new(PathBuf::from("/p/data.json"));
        graph.insert(ModuleNode::new(PathBuf::from("/p/data.json"), "{ nope".to_string()));

        let options = StageOptions::new();
        let ctx = StageContext { options: &options, mode: Mode::Production, root: Path::new("/p") };
        let err = JsonStage.transform(graph, &ctx).await.unwrap_err();
        assert_eq!(err.path, Some(PathBuf::from("/p/data.json")));
    }

    #[tokio::test]
    async fn test_json_module_becomes_javascript() {
        let mut graph = BuildGraph::new(PathBuf::from("/p/data.json"));
        graph.insert(ModuleNode::new(PathBuf::from("/p/data.json"), "[1, 2]".to_string()));

        let options = StageOptions::new();
        let ctx = StageContext { options: &options, mode: Mode::Production, root: Path::new("/p") };
        let graph = JsonStage.transform(graph, &ctx).await.unwrap();
        let module = graph.get(Path::new("/p/data.json")).unwrap();
        assert_eq!(module.kind, ModuleKind::JavaScript);
        assert_eq!(module.transformed, "const __json = [1,2];\nexport default __json;\n");
    }
}
