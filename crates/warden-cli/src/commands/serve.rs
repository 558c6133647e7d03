use std::sync::Arc;
use tracing::warn;

use warden_config::{ConfigLoader, WardenConfig};
use warden_gateway::Gateway;

pub(super) async fn cmd_serve(
    mut config: WardenConfig,
    listen: Option<String>,
    config_loader: ConfigLoader,
) -> warden_core::Result<()> {
    if let Some(listen) = listen {
        config.server.listen = listen;
    }

    println!("warden v{}", env!("CARGO_PKG_VERSION"));
    println!("   Upstream:  {}", config.upstream.base_url);
    println!("   Audit log: {}", config.audit.path.display());
    println!("   Listen:    http://{}", config.server.listen);
    if config.policy.kill_switch {
        println!("   Kill switch: ACTIVE (every plan is simulation-only)");
    }
    println!();

    let gateway = Arc::new(Gateway::from_config(&config)?);

    if let Err(e) = gateway.upstream().health_check().await {
        warn!(error = %e, upstream = %config.upstream.base_url, "upstream health check failed");
    }

    // Only the kill switch is applied live; kept alive for the server's lifetime.
    let kill_switch = gateway.kill_switch().clone();
    let _watcher = match config_loader.watch(move |new_config| {
        kill_switch.set(new_config.policy.kill_switch);
    }) {
        Ok(w) => {
            println!("   Config hot-reload: enabled (kill switch)");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };

    warden_server::start_server(gateway, config.server.clone()).await
}
