//! Run a single poll cycle with the configured source, transport and state
//! file, print the cycle report, and exit. Handy for checking credentials
//! or the pager path without starting the service.

use notam_relay::{init_tracing, Config, PollOutcome, Poller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?;
    let poller = Poller::from_config(&cfg).await?;

    match poller.poll().await {
        PollOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        PollOutcome::Skipped => println!("poll skipped"),
    }
    Ok(())
}
