use envconfig::Envconfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay::config::Config;
use relay::envelope::Envelope;
use relay::fingerprint::PtFingerprint;
use relay::relay::process_batch;
use relay::sink::StdoutSink;

#[tokio::main]
async fn main() {
    // Records go to stdout, diagnostics to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let fingerprinter = PtFingerprint::new(config.fingerprint_command.clone());
    let sink = StdoutSink {};

    tracing::info!(
        log_group = config.log_group.as_str(),
        "reading envelopes from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.expect("failed to read stdin") {
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!("failed to parse envelope: {}", err);
                std::process::exit(1);
            }
        };

        if let Err(err) = process_batch(&envelope, &fingerprinter, &sink).await {
            tracing::error!("failed to process batch: {}", err);
            std::process::exit(1);
        }
    }
}
