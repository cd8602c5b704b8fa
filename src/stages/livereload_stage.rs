// Live-reload stage: appends the browser client that listens for reload notifications

use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::RenderedChunk;
use async_trait::async_trait;

pub const DEFAULT_LIVERELOAD_PORT: u16 = 35729;

/// Options: `port` of the live-reload server; `watch` names the directory it observes
pub struct LiveReloadStage;

impl LiveReloadStage {
    pub fn client_snippet(port: u64) -> String {
        format!(
            "(function () {{ if (typeof window === 'undefined' || window.__kilnLiveReload) return; window.__kilnLiveReload = true; \
             var socket = new WebSocket('ws://' + (location.hostname || 'localhost') + ':{}/livereload'); \
             socket.onmessage = function (event) {{ try {{ var message = JSON.parse(event.data); if (message.command === 'reload') location.reload(); }} catch (e) {{}} }}; }})();",
            port
        )
    }
}

#[async_trait]
impl Stage for LiveReloadStage {
    fn name(&self) -> &str {
        "livereload"
    }

    async fn render_chunk(&self, mut chunk: RenderedChunk, ctx: &StageContext<'_>) -> StageResult<RenderedChunk> {
        let port = ctx.u64_option("port", u64::from(DEFAULT_LIVERELOAD_PORT));
        // Appended, so existing line mappings stay valid
        if !chunk.code.ends_with('\n') {
            chunk.code.push('\n');
        }
        chunk.code.push_str(&Self::client_snippet(port));
        chunk.code.push('\n');
        Ok(chunk)
    }
}
