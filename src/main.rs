/// Entry point for the wattmon power-attribution agent.
///
/// The agent samples per-process CPU usage and the node's hardware energy
/// counters on a fixed interval, attributes zone energy to processes,
/// containers, and VMs, and serves the resulting snapshots over HTTP.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug WATTMON_STDOUT=1 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    wattmon::run().await
}
