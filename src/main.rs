//! SQL Tutor - terminal client for the SQL tutoring service
//!
//! Connects to the tutoring backend with a bearer token and drops into a
//! REPL where the learner can:
//! - stream natural-language explanations of SQL topics (/explain)
//! - draw practice questions by topic and submit answers (/practice)
//! - work the personalized daily question and leaderboard (/daily)

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use sqltutor::api::{HttpApi, TutorApi};
use sqltutor::config::{self, Config};
use sqltutor::error::ApiError;
use sqltutor::repl::{self, colors, Repl};
use sqltutor::session::SessionController;

#[derive(Parser)]
#[command(name = "sqltutor")]
#[command(about = "Terminal client for the SQL tutoring service")]
struct Args {
    /// Backend base URL
    #[arg(long, env = "SQLTUTOR_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token for the tutoring service
    #[arg(long, env = "SQLTUTOR_TOKEN")]
    token: Option<String>,

    /// LLM provider for explanations (deepseek or qwen)
    #[arg(long, env = "SQLTUTOR_PROVIDER")]
    provider: Option<String>,

    /// Follow explanations with a personalized question recommendation
    #[arg(long)]
    personalize: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (from ~/.sqltutor/.env or current dir)
    let env_path = dirs::home_dir()
        .map(|h| h.join(".sqltutor").join(".env"))
        .filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Load config file (~/.sqltutor/config.toml)
    let config = Config::load();

    // Resolve values: CLI args > env vars (handled by clap) > config file > defaults
    let base_url = args
        .base_url
        .or(config.base_url)
        .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());

    let token = match args.token.or(config.token) {
        Some(token) => token,
        None => {
            eprintln!(
                "{}",
                colors::error(
                    "No token configured. Set SQLTUTOR_TOKEN, pass --token, or add `token` to ~/.sqltutor/config.toml."
                )
            );
            std::process::exit(1);
        }
    };

    let provider = args
        .provider
        .or(config.provider)
        .unwrap_or_else(|| config::DEFAULT_PROVIDER.to_string());
    if !config::PROVIDERS.contains(&provider.as_str()) {
        eprintln!(
            "{}",
            colors::error(&format!(
                "Unknown provider {:?}. Available: {}",
                provider,
                config::PROVIDERS.join(", ")
            ))
        );
        std::process::exit(1);
    }

    let personalize = args.personalize || config.personalize.unwrap_or(false);

    use colors::ansi::*;

    // Pretty startup banner
    println!();
    println!("{}", colors::banner_accent(&format!("  SQL Tutor {}", env!("CARGO_PKG_VERSION"))));
    println!("{}", colors::separator(50));
    println!("{}", colors::banner_line("Server", &base_url));
    println!("{}", colors::banner_line("Provider", &provider));
    println!(
        "{}",
        colors::banner_line("Personalize", if personalize { "on" } else { "off" })
    );

    let api: Arc<dyn TutorApi> = Arc::new(HttpApi::new(base_url, token));

    // The session exists only once authentication has succeeded.
    let user = match api.fetch_current_user().await {
        Ok(user) => {
            println!(
                "{}",
                colors::banner_line("Signed in", &format!("{}{}{}", GREEN, user.username, RESET))
            );
            println!("{}", colors::banner_line("Points", &user.points.to_string()));
            user
        }
        Err(ApiError::Unauthorized) => {
            println!(
                "{}",
                colors::banner_line("Signed in", &format!("{}rejected{}", RED, RESET))
            );
            eprintln!();
            eprintln!("{}", colors::error("Token rejected - please log in again."));
            std::process::exit(1);
        }
        Err(e) => {
            println!(
                "{}",
                colors::banner_line("Signed in", &format!("{}unreachable{}", YELLOW, RESET))
            );
            eprintln!();
            eprintln!("{}", colors::error(&format!("Cannot reach the server: {}", e)));
            std::process::exit(1);
        }
    };

    match api.fetch_leaderboard().await {
        Ok(entries) => {
            println!("{}", colors::separator(50));
            repl::print_leaderboard(&entries);
        }
        Err(e) => {
            tracing::warn!("leaderboard unavailable at startup: {}", e);
        }
    }

    println!("{}", colors::separator(50));
    println!();
    println!("Hello, {}! Pick a mode to start learning.", user.username);

    let controller = SessionController::new(Arc::clone(&api), provider, personalize);
    controller.set_user(user).await;

    let mut repl = Repl::new(api, controller)?;
    repl.run().await
}
