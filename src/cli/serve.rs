//! Asset server (`sluice serve`).

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{ServeMode, SluiceConfig};
use crate::log;
use crate::serve::{self, DynamicHandler, Handler, StaticHandler};

/// Serve in the configured mode until Ctrl+C.
pub fn serve_assets(config: &SluiceConfig) -> Result<()> {
    let handler: Arc<dyn Handler> = match config.serve.mode {
        ServeMode::Static => {
            let handler = StaticHandler::load(&config.build.output, config.build.compress)
                .context("Static mode needs a manifest, run `sluice build` first")?;
            Arc::new(handler)
        }
        ServeMode::Dynamic => {
            log!(
                "serve";
                "dynamic mode, compiling {} on request",
                config.build.input.display()
            );
            Arc::new(DynamicHandler::new(config.pipeline()))
        }
    };

    serve::serve(handler, config.serve.interface, config.serve.port)
}
