// Polyfills stage: serves browser shims for Node builtin modules

use crate::core::interfaces::{Stage, StageContext};
use crate::core::models::Mode;
use async_trait::async_trait;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Root-relative directory the shim modules appear under in the graph
pub const POLYFILL_DIR: &str = "__polyfills__";

const SHIMS: &[(&str, &str)] = &[
    ("assert", include_str!("polyfills/assert.js")),
    ("buffer", include_str!("polyfills/buffer.js")),
    ("events", include_str!("polyfills/events.js")),
    ("os", include_str!("polyfills/os.js")),
    ("path", include_str!("polyfills/path.js")),
    ("querystring", include_str!("polyfills/querystring.js")),
    ("string_decoder", include_str!("polyfills/string_decoder.js")),
    ("timers", include_str!("polyfills/timers.js")),
    ("url", include_str!("polyfills/url.js")),
    ("util", include_str!("polyfills/util.js")),
];

/// Builtins with no browser counterpart; importing them yields `{}`
const EMPTY_BUILTINS: &[&str] = &[
    "child_process",
    "cluster",
    "dgram",
    "dns",
    "fs",
    "fs/promises",
    "http2",
    "inspector",
    "module",
    "net",
    "perf_hooks",
    "readline",
    "repl",
    "tls",
    "tty",
    "v8",
    "worker_threads",
];

/// Options: `exclude` lists builtins left to the regular resolver
pub struct PolyfillsStage;

impl PolyfillsStage {
    /// Shim source for a builtin name (without the `node:` prefix)
    pub fn shim(name: &str, mode: Mode) -> Option<Cow<'static, str>> {
        if name == "process" {
            return Some(Cow::Owned(process_shim(mode)));
        }
        if EMPTY_BUILTINS.contains(&name) {
            return Some(Cow::Borrowed("module.exports = {};"));
        }
        SHIMS
            .iter()
            .find(|(shim, _)| *shim == name)
            .map(|(_, source)| Cow::Borrowed(*source))
    }

    pub fn is_polyfilled(name: &str) -> bool {
        name == "process"
            || EMPTY_BUILTINS.contains(&name)
            || SHIMS.iter().any(|(shim, _)| *shim == name)
    }
}

fn process_shim(mode: Mode) -> String {
    format!(
        "module.exports = {{ env: {{ NODE_ENV: {} }}, browser: true, argv: [], version: '', versions: {{}}, platform: 'browser', \
         cwd: function () {{ return '/'; }}, \
         nextTick: function (fn) {{ var args = Array.prototype.slice.call(arguments, 1); Promise.resolve().then(function () {{ fn.apply(null, args); }}); }} }};",
        serde_json::Value::String(mode.as_str().to_string())
    )
}

#[async_trait]
impl Stage for PolyfillsStage {
    fn name(&self) -> &str {
        "polyfills"
    }

    fn resolve_id(&self, specifier: &str, _importer: &Path, ctx: &StageContext<'_>) -> Option<PathBuf> {
        let name = specifier.strip_prefix("node:").unwrap_or(specifier);
        if !Self::is_polyfilled(name) || ctx.list_option("exclude", &[]).iter().any(|e| e == name) {
            return None;
        }
        Some(ctx.root.join(POLYFILL_DIR).join(format!("{}.js", name)))
    }

    fn load(&self, id: &Path, ctx: &StageContext<'_>) -> Option<String> {
        let relative = id.strip_prefix(ctx.root.join(POLYFILL_DIR)).ok()?;
        let name = relative.to_str()?.replace('\\', "/");
        let name = name.strip_suffix(".js")?;
        Self::shim(name, ctx.mode).map(Cow::into_owned)
    }
}
