//! `geosync serve` — run the vault host's loopback RPC server.

use tokio_util::sync::CancellationToken;

use crate::cli::output;
use crate::cli::{Cli, HostContext};
use crate::errors::Result;
use crate::rpc::{RpcHandler, RpcServer};

/// Execute the `serve` command. Blocks until Ctrl-C.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    if !ctx.credentials().is_configured()? {
        output::warning("No master password is set; value requests will fail.");
        output::tip("Run `geosync init` to set one.");
    }

    let addr = ctx.settings.listen_addr()?;
    let idle_timeout = ctx.settings.idle_timeout();
    let handler = RpcHandler::new(ctx.db.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = RpcServer::bind(addr, handler)
            .await?
            .with_idle_timeout(idle_timeout);

        output::success(&format!(
            "GeoSync vault listening on {} (database: {})",
            server.local_addr()?,
            ctx.db.path().display()
        ));
        output::tip("Press Ctrl-C to stop.");

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => on_signal.cancel(),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });

        server.serve(shutdown).await
    })
}
