use zapq::config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Config::load()?;

    zapq::run(config).await
}
