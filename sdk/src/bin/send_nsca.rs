use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use nsca_server_sdk::{
    Client, ClientOptions, DEFAULT_PORT,
    codec::State,
    config::Settings,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(
    about = "Submit passive host and service check results to an NSCA host",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Address of the NSCA host to send reports to
    #[arg(default_value = "localhost", value_name = "ADDRESS")]
    host: String,

    /// Port of the NSCA host
    #[arg(long, short, default_value_t = DEFAULT_PORT, value_name = "NUM")]
    port: u16,

    /// Delimiter used when parsing input lines
    #[arg(long, short, default_value = "\t", value_name = "DELIM")]
    delimiter: String,

    /// Config file carrying the password and encryption method
    #[arg(long, short, default_value = "/etc/send_nsca.cfg", value_name = "PATH")]
    config_file: PathBuf,

    /// Log verbosity
    #[arg(long, default_value = "warn")]
    log_level: log::Level,
}

struct Report<'a> {
    host: &'a str,
    service: Option<&'a str>,
    state: State,
    message: &'a str,
}

/// One report per input line: `host`, optionally `service`, `state` and
/// `message`, joined by the delimiter. Three fields make a host report.
fn parse_line<'a>(line: &'a str, delimiter: &str) -> anyhow::Result<Report<'a>> {
    let fields = line.split(delimiter).collect::<Vec<_>>();

    let (host, service, state, message) = match fields.as_slice() {
        [host, service, state, message] => (*host, Some(*service), *state, *message),
        [host, state, message] => (*host, None, *state, *message),
        _ => anyhow::bail!("invalid report: {line:?}"),
    };

    Ok(Report {
        host,
        service,
        state: state.parse().map_err(anyhow::Error::msg)?,
        message,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log_level)?;

    let settings = Settings::load(&cli.config_file)
        .with_context(|| format!("failed to parse config file {:?}", cli.config_file))?;

    let mut client = Client::new(ClientOptions {
        host: cli.host,
        port: cli.port,
        encryption_method: settings.encryption_method,
        password: settings.password,
    });

    client.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }

        let report = parse_line(&line, &cli.delimiter)?;
        client
            .send_report(report.host, report.service, report.state, report.message)
            .await?;
    }

    client.disconnect(true).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let report = parse_line("web01\tnginx\tWARNING\tslow", "\t").unwrap();
        assert_eq!(report.host, "web01");
        assert_eq!(report.service, Some("nginx"));
        assert_eq!(report.state, State::Warning);
        assert_eq!(report.message, "slow");

        let report = parse_line("web01;0;up", ";").unwrap();
        assert_eq!(report.service, None);
        assert_eq!(report.state, State::Ok);

        assert!(parse_line("web01\tup", "\t").is_err());
        assert!(parse_line("web01\tnot-a-state\tup", "\t").is_err());
    }
}
