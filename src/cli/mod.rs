use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::infra::config::Config;

#[derive(Parser)]
#[command(name = "sse-tool-gateway")]
#[command(about = "Tool server speaking JSON-RPC over SSE + POST")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the registered tools
    Tools,
    /// Health check a running service
    Health {
        /// Service URL to check
        #[arg(short, long, default_value = "http://localhost:3002")]
        url: String,
    },
    /// Show sessions and tools of a running service
    Status {
        /// Service URL to check
        #[arg(short, long, default_value = "http://localhost:3002")]
        url: String,
    },
    /// Validate configuration
    Config {
        /// Validate config without starting service
        #[arg(long)]
        validate: bool,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    run_commands(cli.command.unwrap_or(Commands::Serve { port: None })).await
}

pub async fn run_commands(command: Commands) -> ExitCode {
    match command {
        Commands::Serve { port } => match serve(port).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "server exited with error");
                ExitCode::FAILURE
            }
        },
        Commands::Tools => match list_tools() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("❌ Tool registration failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Health { url } => match health_check(&url).await {
            Ok(_) => {
                println!("✅ Service is healthy");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Health check failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Status { url } => match show_status(&url).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("❌ Status check failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Config { validate } => match load_config(validate) {
            Ok(cfg) => {
                if validate {
                    println!("✅ Configuration is valid");
                } else {
                    println!("📋 Configuration (not validated)");
                }
                println!("  Port: {}", cfg.port);
                println!("  Session policy: {:?}", cfg.session_policy);
                println!("  Keep-alive: {}s", cfg.keep_alive_secs);
                println!("  Outbound buffer: {}", cfg.outbound_buffer);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Configuration validation failed: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut cfg = Config::from_env_and_toml()?;
    if let Some(port) = port {
        cfg.port = port;
    }
    crate::infra::boot::run_server(cfg).await
}

fn list_tools() -> Result<(), Box<dyn std::error::Error>> {
    let registry = crate::tools::build_registry()?;
    for t in registry.list() {
        println!("🔧 {} - {}", t.name, t.description);
        println!("   input: {}", t.input_schema);
    }
    Ok(())
}

fn validate_config() -> Result<Config, Box<dyn std::error::Error>> {
    load_config(true)
}

fn load_config(validate: bool) -> Result<Config, Box<dyn std::error::Error>> {
    let cfg = Config::from_env_and_toml()?;
    if validate {
        cfg.validate()?;
    }
    Ok(cfg)
}

async fn health_check(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/healthz", url))
        .timeout(std::time::Duration::from_millis(500))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", response.status()).into())
    }
}

async fn show_status(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let health_response = client
        .get(format!("{}/healthz", url))
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await?;

    println!(
        "🏥 Health Status: {}",
        if health_response.status().is_success() {
            "✅ Healthy"
        } else {
            "❌ Unhealthy"
        }
    );

    let status_response = client
        .get(format!("{}/status", url))
        .timeout(std::time::Duration::from_millis(500))
        .send()
        .await;

    match status_response {
        Ok(resp) if resp.status().is_success() => {
            let v: serde_json::Value = resp.json().await?;
            let sessions = v["sessions"].as_array().cloned().unwrap_or_default();
            println!("📡 Sessions: {} ({})", sessions.len(), v["policy"].as_str().unwrap_or("?"));
            for s in sessions {
                println!(
                    "  {} {} since {}",
                    s["id"].as_str().unwrap_or("?"),
                    s["state"].as_str().unwrap_or("?"),
                    s["opened_at"].as_str().unwrap_or("?")
                );
            }
            let tools: Vec<&str> = v["tools"]
                .as_array()
                .map(|a| a.iter().filter_map(|t| t.as_str()).collect())
                .unwrap_or_default();
            println!("🔧 Tools: {}", tools.join(", "));
        }
        Ok(resp) => {
            println!("📡 Status: ❌ HTTP {}", resp.status());
        }
        Err(_) => {
            println!("📡 Status: ❌ Unavailable");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[tokio::test]
    async fn health_check_fails_without_service() {
        let result = health_check("http://localhost:9999").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_check_ok_and_error_paths() {
        use httpmock::prelude::*;
        let server = MockServer::start();
        server.mock(|when, then| { when.method(GET).path("/healthz"); then.status(200).body("ok"); });
        assert!(health_check(&server.base_url()).await.is_ok());

        let bad = MockServer::start();
        bad.mock(|when, then| { when.method(GET).path("/healthz"); then.status(500); });
        assert!(health_check(&bad.base_url()).await.is_err());
    }

    #[tokio::test]
    async fn show_status_ok_path() {
        use httpmock::prelude::*;
        let server = MockServer::start();
        server.mock(|when, then| { when.method(GET).path("/healthz"); then.status(200).body("ok"); });
        server.mock(|when, then| {
            when.method(GET).path("/status");
            then.status(200).json_body(serde_json::json!({
                "policy": "SingleActive",
                "sessions": [{"id": "abc", "state": "Open", "opened_at": "2026-01-01T00:00:00Z"}],
                "tools": ["isOdd", "isPrime"]
            }));
        });
        assert!(show_status(&server.base_url()).await.is_ok());
    }

    #[tokio::test]
    async fn status_handles_non_200_status_route() {
        use httpmock::prelude::*;
        let server = MockServer::start();
        server.mock(|when, then| { when.method(GET).path("/healthz"); then.status(500).body("boom"); });
        server.mock(|when, then| { when.method(GET).path("/status"); then.status(500).body("boom"); });
        assert!(show_status(&server.base_url()).await.is_ok());
    }

    #[tokio::test]
    async fn status_fails_when_service_is_down() {
        assert!(show_status("http://localhost:9999").await.is_err());
    }

    #[test]
    #[serial]
    fn validate_config_rejects_port_zero() {
        env::remove_var("GATEWAY_CONFIG");
        env::set_var("PORT", "0");
        let result = validate_config();
        assert!(result.unwrap_err().to_string().contains("PORT cannot be 0"));
        env::remove_var("PORT");
    }

    #[tokio::test]
    #[serial]
    async fn run_commands_config_success_and_failure() {
        env::remove_var("GATEWAY_CONFIG");
        env::remove_var("PORT");
        env::remove_var("SESSION_POLICY");
        assert_eq!(run_commands(Commands::Config { validate: true }).await, ExitCode::SUCCESS);

        env::set_var("SESSION_POLICY", "nope");
        assert_eq!(run_commands(Commands::Config { validate: true }).await, ExitCode::FAILURE);
        env::remove_var("SESSION_POLICY");
    }

    #[tokio::test]
    #[serial]
    async fn config_without_validate_flag_only_prints() {
        env::remove_var("GATEWAY_CONFIG");
        env::set_var("PORT", "0");
        assert_eq!(run_commands(Commands::Config { validate: false }).await, ExitCode::SUCCESS);
        assert_eq!(run_commands(Commands::Config { validate: true }).await, ExitCode::FAILURE);
        env::remove_var("PORT");
    }

    #[tokio::test]
    async fn run_commands_tools_lists_registry() {
        assert_eq!(run_commands(Commands::Tools).await, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn run_commands_health_and_status_fail_against_dead_url() {
        let health = run_commands(Commands::Health { url: "http://localhost:9".into() }).await;
        assert_eq!(health, ExitCode::FAILURE);
        let status = run_commands(Commands::Status { url: "http://localhost:9".into() }).await;
        assert_eq!(status, ExitCode::FAILURE);
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["sse-tool-gateway"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["sse-tool-gateway", "serve", "--port", "4000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(4000) })));
    }
}
