//! HSM-Link demo entry point.
//!
//! Wires a client to an in-process simulated server over the shared-memory
//! transport, then walks the whole protocol surface:
//!
//! ```text
//! main()
//!  └─ SimHsm::new()        -- shared simulator state
//!  └─ SimServer::run()     -- server poll loop on its own thread
//!  └─ client sequence
//!       ├─ comm_init             -> learn the server id
//!       ├─ echo                  -> round-trip sanity check
//!       ├─ key_cache / commit    -> place and persist key material
//!       ├─ key_export            -> read it back
//!       ├─ custom probe          -> check a callback slot
//!       └─ comm_close
//! ```
//!
//! An optional TOML config path may be passed as the first argument.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::info;
use tracing_subscriber::EnvFilter;

use hsmlink_client::sim::SimHsm;
use hsmlink_client::{mem_pair, Client, ClientConfig};
use hsmlink_core::keystore::Label;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .init();

    info!("HSM-Link demo starting");

    // ── Simulated server ──────────────────────────────────────────────────
    let hsm = SimHsm::new(0xAA);
    hsm.register_callback(0);

    let (client_end, server_end) = mem_pair();
    let running = Arc::new(AtomicBool::new(true));
    let server = hsm.server(Box::new(server_end));
    let server_thread = {
        let running = Arc::clone(&running);
        std::thread::spawn(move || server.run(running))
    };

    // ── Client sequence ───────────────────────────────────────────────────
    let mut client = Client::with_policy(Box::new(client_end), config.client_id, config.poll);

    let (client_id, server_id) = client.comm_init()?;
    info!(client_id, server_id, "session established");

    let echoed = client.echo(b"hsmlink demo echo")?;
    info!(bytes = echoed.len(), "echo round-trip complete");

    let key_id = client.key_cache(0, Some(Label::new(b"demo-key")), &[0x42; 32])?;
    info!(%key_id, "key cached");

    client.key_commit(key_id)?;
    info!(%key_id, "key committed to persistent storage");

    let mut out = [0u8; 32];
    let exported = client.key_export(key_id, &mut out)?;
    info!(len = exported.len, "key exported back");

    let verdict = client.custom_check_registered(0)?;
    info!(?verdict, "callback slot 0 probed");

    client.key_erase(key_id)?;
    info!(%key_id, "key erased");

    client.comm_close()?;
    info!("session closed");

    running.store(false, Ordering::Relaxed);
    server_thread
        .join()
        .map_err(|_| anyhow::anyhow!("simulator thread panicked"))?;
    Ok(())
}
