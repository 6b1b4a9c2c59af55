/// Entry point for the Creo Metrics container sampler.
///
/// Samples the containers listed in `CREO_CONTAINERS` through their cgroup v2
/// stat files and `/proc/<pid>/net/dev`, and writes per-step rates to stdout
/// as open-falcon JSON lines.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., missing or invalid
/// environment variables, or an unreadable hostname).
///
/// # Examples
///
/// ```bash
/// CREO_CONTAINERS=3f2a9c:4242:/sys/fs/cgroup/system.slice/docker-3f2a9c.scope \
///     CREO_STEP_SECS=10 RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_metrics::run().await
}
