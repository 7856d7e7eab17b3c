use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use announcer::webhook_verification::signature_header;

/// Signs a saved GitHub webhook payload and delivers it to a running
/// Announcer instance.
#[derive(Parser, Debug)]
#[command(name = "replay_webhook")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON payload file
    payload: PathBuf,

    /// Webhook secret used to sign the delivery
    #[arg(short, long)]
    secret: String,

    /// GitHub event kind sent in X-GitHub-Event
    #[arg(short, long, default_value = "release")]
    event: String,

    /// Webhook endpoint to deliver to
    #[arg(short, long, default_value = "http://localhost:8080/webhooks/github")]
    url: String,

    /// Print the computed X-Hub-Signature-256 value and exit
    #[arg(long)]
    print_signature: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let body = std::fs::read(&args.payload)
        .with_context(|| format!("reading payload file {}", args.payload.display()))?;

    let signature = signature_header(&args.secret, &body).context("computing signature")?;

    if args.print_signature {
        println!("{}", signature);
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;

    let response = client
        .post(&args.url)
        .header("content-type", "application/json")
        .header("x-github-event", &args.event)
        .header("x-hub-signature-256", &signature)
        .body(body)
        .send()
        .await
        .with_context(|| format!("delivering webhook to {}", args.url))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    println!("{} {}", status.as_u16(), text);

    if !status.is_success() {
        bail!("delivery refused with status {}", status);
    }

    Ok(())
}
