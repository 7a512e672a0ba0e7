use clap::Parser;
use h3_storm::args::Args;
use h3_storm::certs;
use h3_storm::error::HarnessError;
use h3_storm::keylog;
use h3_storm::logging::Logging;
use h3_storm::runner::RunOrchestrator;
use h3_storm::transport::quic::QuicTransportFactory;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), HarnessError> {
    let args = Args::parse();
    let _logging = Logging::init(args.verbose, args.log_file.as_deref())?;

    let params = args.trial_parameters()?;
    if let Some(path) = params.key_log_path() {
        keylog::prepare(path)?;
    }
    let cert_pool = certs::load_trusted_roots(&args.ca_certs)?;

    let orchestrator = RunOrchestrator::new(
        params,
        cert_pool,
        args.addresses,
        Arc::new(QuicTransportFactory),
        args.timeout,
    );
    let summary = orchestrator.run(args.repeat_count).await;
    info!(
        "Finished {}/{} trial(s).",
        summary.completed, summary.launched
    );
    Ok(())
}
