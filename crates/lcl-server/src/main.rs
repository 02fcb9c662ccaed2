// crates/lcl-server/src/main.rs
// ============================================================================
// Module: Control Layer Server Entry Point
// Description: Process bootstrap for the headless control layer.
// Purpose: Resolve configuration, load the policy, and serve until shutdown.
// Dependencies: lcl-config, lcl-http, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! Startup order: tracing, environment configuration, application context
//! (policy first, then stores), HTTP serve loop. Any initialization failure
//! is fatal with exit code 1; a clean shutdown (ctrl-c) exits 0.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use lcl_config::ControlConfig;
use lcl_http::AppContext;
use lcl_http::serve;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Boots the control layer and serves until a shutdown signal arrives.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info")
        }))
        .init();

    let config = match ControlConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "configuration is invalid");
            return ExitCode::FAILURE;
        }
    };

    let context = match AppContext::from_config(&config) {
        Ok(context) => Arc::new(context),
        Err(error) => {
            tracing::error!(error = %error, "initialization failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        policy_id = %context.policy.policy_id,
        policy_version = %context.policy.policy_version,
        "policy loaded"
    );

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };
    match serve(context, addr, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "server terminated abnormally");
            ExitCode::FAILURE
        }
    }
}
