//! NEXUS Topology CLI
//!
//! Path search, link confidence and suppression-aware reachability over a
//! topology snapshot file.

use nexus_topology::app::{AppContext, run_with_context};
use nexus_topology::log_error;

#[tokio::main]
async fn main() {
    if let Err(e) = nexus_topology::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {}", e);
    }

    let context = AppContext::from_env();
    let _ctrl_c = context.cancel_on_ctrl_c();
    if let Err(e) = run_with_context(std::env::args(), &context).await {
        log_error!("{:#}", e);
        std::process::exit(1);
    }
}
