//! A whole match in one process: an in-memory relay and a few bots.
//!
//! ```text
//! cargo run -p local-match
//! TOPSPIN_BOTS=4 TOPSPIN_SECONDS=60 RUST_LOG=debug cargo run -p local-match
//! TOPSPIN_CONFIG=client.json cargo run -p local-match
//! ```

use std::time::Duration;

use topspin::prelude::*;
use tracing::info;

/// Bots close the distance and start spinning inside this range.
const ATTACK_RANGE: f32 = 4.0;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn load_config() -> Result<ClientConfig, TopspinError> {
    match std::env::var("TOPSPIN_CONFIG") {
        Ok(path) => {
            info!(%path, "loading client config");
            ClientConfig::from_json_file(path)
        }
        Err(_) => {
            let mut config = ClientConfig::default();
            config.session.join_timeout = Duration::from_secs(2);
            Ok(config)
        }
    }
}

/// One decision: steer toward the nearest opponent, spin when close.
fn drive(bot: &ClientHandle) -> Result<(), TopspinError> {
    let view = bot.view();
    let Some(me) = view.local_entity() else {
        return Ok(());
    };
    let nearest = view
        .entities
        .iter()
        .filter(|e| !e.local)
        .min_by(|a, b| {
            me.position
                .distance_squared(a.position)
                .total_cmp(&me.position.distance_squared(b.position))
        });
    match nearest {
        Some(target) => {
            let offset = target.position - me.position;
            bot.steer(offset)?;
            bot.set_spinning(offset.length() < ATTACK_RANGE)?;
        }
        // Nobody to chase: drift back toward the middle.
        None => {
            bot.steer(-me.position)?;
            bot.set_spinning(false)?;
        }
    }
    Ok(())
}

fn log_scores(bots: &[ClientHandle]) {
    let Some(view) = bots.iter().map(ClientHandle::view).find(|v| v.is_authority) else {
        info!("no authority yet");
        return;
    };
    for (participant, record) in &view.scores {
        info!(
            %participant,
            score = record.score,
            kills = record.kills,
            deaths = record.deaths,
            "standings"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), TopspinError> {
    topspin::init_logging();

    let bot_count: usize = env_or("TOPSPIN_BOTS", 3);
    let seconds: u64 = env_or("TOPSPIN_SECONDS", 30);
    let config = load_config()?;

    let (transport, connector) = memory_transport();
    let relay = Relay::new(transport, RelayConfig::default());
    let relay_handle = relay.handle();
    tokio::spawn(async move {
        if let Err(e) = relay.run().await {
            tracing::error!(error = %e, "relay failed");
        }
    });

    let mut bots = Vec::with_capacity(bot_count);
    for n in 0..bot_count {
        let mut bot_config = config.clone();
        bot_config.display_name = format!("bot-{n}");
        bots.push(ArenaClient::spawn(bot_config, connector.clone()));
        // Staggered joins exercise the search-then-create path and late
        // joiners.
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    info!(bots = bot_count, seconds, "match started");

    let mut control = tokio::time::interval(Duration::from_millis(100));
    let mut report = tokio::time::interval(Duration::from_secs(5));
    let end = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(end);

    loop {
        tokio::select! {
            _ = control.tick() => {
                for bot in &bots {
                    drive(bot)?;
                }
            }
            _ = report.tick() => {
                log_scores(&bots);
                info!(rooms = relay_handle.room_count().await, "relay");
            }
            _ = &mut end => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    log_scores(&bots);
    for bot in bots {
        bot.shutdown().await?;
    }
    info!("match over");
    Ok(())
}
