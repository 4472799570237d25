//! CLI interface for student-portal

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::ai::{
    generate_progress_insights, generate_smart_notifications, generate_study_tips, FlowOutcome,
    ProgressInsightsInput, ProgressPoint, SmartNotificationsInput, StudyTipsInput,
};
use crate::auth::AuthService;
use crate::config::{self, Config};
use crate::server::{self, ServerState};
use crate::session::ClientInfo;

#[derive(Parser)]
#[command(name = "student-portal")]
#[command(about = "Student learning backend with session-aware auth and AI study flows", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "STUDENT_PORTAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Sign in once and print the resulting user and cookies
    SignIn {
        email: String,
        #[arg(long, env = "STUDENT_PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Generate study tips for a subject
    Tips {
        subject: String,
    },
    /// Analyze monthly progress for a subject
    Insights {
        subject: String,
        /// Monthly progress as MONTH=PERCENT (repeatable)
        #[arg(short, long = "month", value_parser = parse_progress_point)]
        months: Vec<ProgressPoint>,
    },
    /// Generate smart notifications from a JSON input file
    Notify {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

fn parse_progress_point(s: &str) -> Result<ProgressPoint, String> {
    let (month, progress) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MONTH=PERCENT, got '{}'", s))?;
    let progress = progress
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| format!("invalid percentage '{}': {}", progress, e))?;
    Ok(ProgressPoint {
        month: month.trim().to_string(),
        progress,
    })
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };

    match cli.command {
        Commands::Serve { host, port } => {
            let config = Config::load_from(&config_path)?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let state = ServerState::from_config(config, &config_path)?;
            server::start(state, &host, port).await?;
        }
        Commands::SignIn { email, password } => {
            sign_in(&config_path, &email, &password).await?;
        }
        Commands::Tips { subject } => {
            let config = Config::load_from(&config_path)?;
            let model = server::model_from_config(&config);
            let outcome = generate_study_tips(model.as_ref(), &StudyTipsInput { subject }).await;
            print_outcome(outcome, |out| out.tips.clone());
        }
        Commands::Insights { subject, months } => {
            let config = Config::load_from(&config_path)?;
            let model = server::model_from_config(&config);
            let input = ProgressInsightsInput {
                subject,
                progress_data: months,
            };
            let outcome = generate_progress_insights(model.as_ref(), &input).await;
            print_outcome(outcome, |out| out.insights.clone());
        }
        Commands::Notify { input } => {
            let config = Config::load_from(&config_path)?;
            let model = server::model_from_config(&config);
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let input: SmartNotificationsInput =
                serde_json::from_str(&raw).context("Input is not a valid smart notifications request")?;
            let outcome = generate_smart_notifications(model.as_ref(), &input).await;
            print_outcome(outcome, |out| serde_json::to_string_pretty(out).unwrap_or_default());
        }
        Commands::Config { show, reset, path } => {
            if path {
                println!("{}", config_path.display());
            } else if reset {
                Config::default().save_to(&config_path)?;
                println!("Configuration reset to defaults at {}", config_path.display());
            } else {
                let config = Config::load_from(&config_path)?;
                if !show {
                    println!("Use --show to display configuration, --reset to restore defaults.");
                    println!();
                }
                config::show_config(&config, &config_path);
            }
        }
    }

    Ok(())
}

async fn sign_in(config_path: &Path, email: &str, password: &str) -> Result<()> {
    let mut config = Config::load_from(config_path)?;
    let secret = config.ensure_token_secret(config_path)?;
    let auth = AuthService::from_config(&config, secret)?;

    let mut ctx = auth.new_context(ClientInfo {
        user_agent: Some(format!("student-portal-cli/{}", env!("CARGO_PKG_VERSION"))),
        ip_address: None,
    });
    let user = auth.sign_in(&mut ctx, email, password).await?;

    println!("{}", serde_json::to_string_pretty(&user)?);
    println!();
    for cookie in ctx.cookies_mut().take_outgoing() {
        println!("Set-Cookie: {}", cookie);
    }
    let remaining = auth.session_time_remaining(&ctx);
    println!();
    println!(
        "Session valid: {} ({}h {}m remaining)",
        auth.is_session_valid(&ctx),
        remaining.num_hours(),
        remaining.num_minutes() % 60
    );
    Ok(())
}

fn print_outcome<T>(outcome: FlowOutcome<T>, render: impl Fn(&T) -> String) {
    if let Some(reason) = outcome.fallback_reason() {
        eprintln!("⚠ Model unavailable, showing fallback ({})", reason);
        eprintln!();
    }
    println!("{}", render(outcome.value()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_point() {
        let point = parse_progress_point("March=72.5%").unwrap();
        assert_eq!(point.month, "March");
        assert_eq!(point.progress, 72.5);
        assert!(parse_progress_point("March").is_err());
        assert!(parse_progress_point("March=lots").is_err());
    }

    #[test]
    fn test_cli_parses_insights() {
        let cli = Cli::try_parse_from([
            "student-portal",
            "insights",
            "Math",
            "--month",
            "Jan=60",
            "-m",
            "Feb=70",
        ])
        .unwrap();
        match cli.command {
            Commands::Insights { subject, months } => {
                assert_eq!(subject, "Math");
                assert_eq!(months.len(), 2);
                assert_eq!(months[1].progress, 70.0);
            }
            _ => panic!("expected insights command"),
        }
    }
}
