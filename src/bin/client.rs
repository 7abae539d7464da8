//! solball headless client
//!
//! Joins a room, optionally claims host and starts the match, then plays a
//! scripted patrol while logging the interpolated scene.

use std::env;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solball_server::client::{self, ClientOptions, ScriptedInput, TracingRenderer};
use solball_server::ws::protocol::Team;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let options = options_from_env()?;
    info!(room = %options.room, team = ?options.team, host = options.wallet.is_some(), "Starting client");

    client::net::run(
        options,
        Box::new(ScriptedInput::patrol()),
        Box::new(TracingRenderer::default()),
    )
    .await?;

    Ok(())
}

fn options_from_env() -> anyhow::Result<ClientOptions> {
    let defaults = ClientOptions::default();

    let team = match env::var("SOLBALL_TEAM").ok().as_deref() {
        None | Some("") => None,
        Some("red") => Some(Team::Red),
        Some("blue") => Some(Team::Blue),
        Some(other) => anyhow::bail!("SOLBALL_TEAM must be red or blue, got {other:?}"),
    };

    let duration_min = env::var("SOLBALL_DURATION_MIN")
        .ok()
        .map(|raw| raw.parse::<u32>())
        .transpose()
        .context("SOLBALL_DURATION_MIN must be a positive integer")?
        .filter(|m| *m > 0);

    Ok(ClientOptions {
        url: env::var("SOLBALL_URL").unwrap_or(defaults.url),
        room: env::var("SOLBALL_ROOM").unwrap_or(defaults.room),
        team,
        team_size: None,
        name: env::var("SOLBALL_NAME").ok(),
        player_key: env::var("SOLBALL_PLAYER_KEY").ok().filter(|k| !k.is_empty()),
        wallet: env::var("SOLBALL_WALLET").ok().filter(|w| !w.is_empty()),
        start: matches!(
            env::var("SOLBALL_START").ok().as_deref(),
            Some("1") | Some("true")
        ),
        duration_min,
    })
}
