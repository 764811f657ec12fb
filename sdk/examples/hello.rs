use nsca_server_sdk::{Client, ClientOptions, codec::State};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Debug)?;

    // Expects an NSCA server on localhost:5667, e.g. `cargo run -p nsca-server`.
    let mut client = Client::new(ClientOptions::default());
    client.connect().await?;

    client.send_report("web01", None, State::Ok, "up").await?;
    client
        .send_report("web01", Some("nginx"), State::Warning, "response time 1.9s")
        .await?;

    client.disconnect(true).await;
    Ok(())
}
