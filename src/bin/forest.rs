// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Terminal client for Activity Forest.
//!
//! ```text
//! forest login                 print the Strava authorization URL
//! forest <redirect-url>        finish login with the URL the browser landed on
//! forest                       load activities with stored tokens
//! forest logout                forget stored tokens
//! ```

use std::process::ExitCode;

use activity_forest::client::{CompanionClient, FileStorage, ForestApp, LaunchParams, Page};
use activity_forest::config::ClientConfig;
use activity_forest::services::StravaApi;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: forest [login | logout | <redirect-url-or-query>]";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();

    let config = ClientConfig::from_env();
    tracing::debug!(
        server = %config.server_url,
        token_path = %config.token_path.display(),
        "Client configuration loaded"
    );

    let app = ForestApp::new(
        CompanionClient::new(&config.server_url),
        StravaApi::new(&config.strava_api_url),
        FileStorage::new(&config.token_path),
    );

    let arg = std::env::args().nth(1);
    match arg.as_deref() {
        Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            return Ok(ExitCode::SUCCESS);
        }
        Some("logout") => {
            app.logout();
            println!("Signed out.");
            return Ok(ExitCode::SUCCESS);
        }
        Some("login") => {
            if let Some(url) = app.login().await {
                println!("Open this URL to connect with Strava:\n{}", url);
                println!("Then run `forest '<the URL your browser lands on>'`.");
                return Ok(ExitCode::SUCCESS);
            }
        }
        Some(query) if !LaunchParams::parse(query).has_oauth_params() => {
            eprintln!("{}", USAGE);
            return Ok(ExitCode::FAILURE);
        }
        query => app.start(query.unwrap_or_default()).await,
    }

    let state = app.state();
    let mut page = Page::new();
    page.render(&state);
    print!("{}", page);

    Ok(if state.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Human-readable logs on stderr so stdout stays the rendered page.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("activity_forest=info".parse().unwrap())
                .add_directive("warn".parse().unwrap()),
        )
        .with(format)
        .init();
}
