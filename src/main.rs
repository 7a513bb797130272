use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ws_rtt::{
    cli::{Cli, Mode},
    client,
    config::Config,
    log_sink::LogSink,
    server, version,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", version::version_info());
        return Ok(());
    }
    let Some(mode) = cli.mode else {
        anyhow::bail!("--mode is required");
    };

    // Load configuration
    let mut config = Config::load()?;
    config.apply_cli(&cli);
    config.validate()?;

    // Every diagnostic goes through the buffered sink
    let log_sink = LogSink::stdout(config.log_sink());
    init_tracing(&log_sink, config.log_json);
    log_sink.write(&format!("Starting {} in {} mode", version::version_info(), mode));

    let result = match mode {
        Mode::Server => server::run(&config).await,
        Mode::Client => client::run(&config, &log_sink).await.map(|_| ()),
    };

    log_sink.stop();
    Ok(result?)
}

fn init_tracing(log_sink: &LogSink, json: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| fmt::layer().json().with_writer(log_sink.clone())))
        .with((!json).then(|| fmt::layer().with_writer(log_sink.clone())))
        .init();
}
