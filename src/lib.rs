pub mod config;
pub mod server;
pub mod statistics;

use self::{
    config::Config,
    server::{Server, ServerOptions},
};

/// Runs a server with the given configuration and prints every received
/// report. The binary is a thin wrapper around this function so integration
/// tests can drive the crate the same way.
pub async fn startup(config: Config) -> anyhow::Result<()> {
    let mut server = Server::new(ServerOptions {
        bind: config.listen,
        password: config.password,
        encryption_method: config.encryption_method,
        max_queue_size: config.max_queue_size,
    });

    server.start().await?;

    while let Some(report) = server.recv().await {
        if report.service.is_empty() {
            println!(
                "[{}] host report: host={:?}, state={:?}, message={:?}",
                report.timestamp, report.hostname, report.state, report.message
            );
        } else {
            println!(
                "[{}] service report: host={:?}, service={:?}, state={:?}, message={:?}",
                report.timestamp, report.hostname, report.service, report.state, report.message
            );
        }
    }

    Ok(())
}
