use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use realitycap_auth::StaticTokenProvider;
use realitycap_client::ServiceRegistry;
use realitycap_observability::LogFormat;
use realitycap_runner::{Outcome, RunnerSettings, read_job, run};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    realitycap_observability::init(LogFormat::from_env());

    let path = std::env::args_os()
        .nth(1)
        .context("usage: realitycap-runner <job.json>")?;
    let settings = RunnerSettings::from_env()?;
    let job = read_job(&path)?;

    let tokens = Arc::new(StaticTokenProvider::new(settings.token));
    let registry = ServiceRegistry::connect(&settings.client, tokens)
        .context("failed to configure service clients")?;

    let interrupted = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c; running without it");
            std::future::pending::<()>().await;
        }
    };

    let outcome = run(&registry, &job, &settings.poll, interrupted).await?;
    if let Outcome::Succeeded(job) = &outcome {
        println!("{}", serde_json::to_string_pretty(job.outputs())?);
    }
    Ok(outcome.exit_code())
}
