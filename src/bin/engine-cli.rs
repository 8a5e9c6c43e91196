use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(about = "Management CLI for the dispatch engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "DISPATCH_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate counters, backend counts and session summary
    Stats,
    /// Overall status and per-backend detail
    Health,
    /// Run a health check cycle now
    Check,
    /// Effective configuration
    Config,
    /// Drop every sticky-session mapping
    ClearSessions,
    /// Zero the stats counters
    ResetStats,
}

impl Commands {
    fn endpoint(&self) -> (Method, &'static str) {
        match self {
            Commands::Stats => (Method::GET, "/admin/stats"),
            Commands::Health => (Method::GET, "/admin/health"),
            Commands::Check => (Method::POST, "/admin/health/check"),
            Commands::Config => (Method::GET, "/admin/config"),
            Commands::ClearSessions => (Method::POST, "/admin/sessions/clear"),
            Commands::ResetStats => (Method::POST, "/admin/stats/reset"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.endpoint();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    // The health endpoint answers 503 with a full report when nothing is eligible.
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => {
            eprintln!("Error: Admin API returned status {}", status);
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
    }

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
