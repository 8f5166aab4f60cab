use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "analytics-cli")]
#[command(about = "Management CLI for the trace analytics daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer key, when the daemon has `admin.api_key` set
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a module's version
    Version { module: String },
    /// Enable traces of an API for a module
    Start { module: String, api_id: u32 },
    /// Disable traces of an API for a module
    Stop { module: String, api_id: u32 },
    /// Send a trace document (`{"event": ..., "telemetry": ...}`) from a file
    Send { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let res = match cli.command {
        Commands::Version { module } => {
            client
                .get(format!("{}/modules/{module}/version", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Start { module, api_id } => {
            client
                .post(format!("{}/modules/{module}/{api_id}/start", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Stop { module, api_id } => {
            client
                .post(format!("{}/modules/{module}/{api_id}/stop", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Send { file } => {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            client
                .post(format!("{}/api/telemetry", cli.url))
                .json(&body)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: daemon returned status {status}");
        if !text.is_empty() {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
