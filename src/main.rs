use bank_sync::{config::Config, setup};
use color_eyre::eyre::Context;
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenv().ok();

    let config = Config::load().wrap_err("Failed to load configuration")?;
    config_tracing(config.debug);

    let state = setup(&config).await?;

    // Waiting for consent can take arbitrarily long, let the operator abort it
    let transactions = tokio::select! {
        result = state.pipeline.bulk() => result.wrap_err("Failed to read transactions")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, no transactions were read");
            return Ok(());
        }
    };

    tracing::info!("Read {} transactions", transactions.len());
    println!("{}", serde_json::to_string_pretty(&transactions)?);
    Ok(())
}

fn config_tracing(debug: bool) {
    use tracing::Level;
    use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

    let default_level = if debug { Level::DEBUG } else { Level::INFO };
    let tracing_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let filter = filter::Targets::new()
        .with_target("hyper", Level::INFO)
        .with_target("reqwest", Level::INFO)
        .with_target("aws_config", Level::WARN)
        .with_target("aws_smithy_runtime", Level::WARN)
        .with_default(default_level);

    tracing_subscriber::registry()
        .with(tracing_layer)
        .with(filter)
        .init();
}
