// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wapipe - rate-limited WhatsApp messaging pipeline.
//!
//! This is the binary entry point for the service.

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wapipe_config::{TenantProviderConfig, WapipeConfig};

#[derive(Parser, Debug)]
#[command(name = "wapipe", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the standard lookup.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher, sweeper and HTTP server.
    Serve,
    /// Validate configuration and print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => wapipe_config::load_and_validate_path(path),
        None => wapipe_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            wapipe_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => print_summary(&config),
        None => {
            println!("wapipe: use --help for available commands");
        }
    }
}

fn print_summary(config: &WapipeConfig) {
    println!("config ok");
    println!(
        "  listen       {}:{}",
        config.service.bind_address, config.service.port
    );
    println!(
        "  storage      {}",
        if config.storage.durable {
            config.storage.database_path.as_str()
        } else {
            "in-process"
        }
    );
    println!(
        "  rate limit   {}/s (burst {}), {}/min per tenant",
        config.rate_limit.messages_per_second,
        config.rate_limit.burst_size,
        config.rate_limit.tenant_limit_per_minute
    );
    if config.service.api_token.is_none() {
        println!("  warning      service.api_token not set; API routes are closed");
    }
    for tenant in &config.tenants {
        let provider = match &tenant.provider {
            TenantProviderConfig::CloudApi(_) => "cloud_api",
            TenantProviderConfig::Dialog360(s) if s.partner_id.is_some() => "dialog360 (partner)",
            TenantProviderConfig::Dialog360(_) => "dialog360",
        };
        let limit = tenant
            .limit_per_minute
            .unwrap_or(config.rate_limit.tenant_limit_per_minute);
        println!("  tenant       {} via {provider}, {limit}/min", tenant.id);
    }
}
