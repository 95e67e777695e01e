//! Prints the next occurrences of an event definition given as JSON.
//!
//! Usage: `upcoming '<definition json>' [count]`

use chrono::Utc;
use rally_core::config::load_config;
use rally_engine::event::EventDefinition;
use rally_engine::recurrence::next_occurrence;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    let filter = EnvFilter::try_new(config.logging.level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(raw) = args.next() else {
        anyhow::bail!("usage: upcoming '<definition json>' [count]");
    };
    let count: usize = args.next().map_or(Ok(5), |value| value.parse())?;

    let definition: EventDefinition = serde_json::from_str(&raw)?;
    definition.validate()?;

    let mut cursor = Utc::now();
    for _ in 0..count {
        let Some(occurrence) = next_occurrence(&definition, cursor) else {
            tracing::info!("no further occurrences");
            break;
        };
        println!("{} .. {}", occurrence.start.to_rfc3339(), occurrence.end.to_rfc3339());
        cursor = occurrence.end;
    }

    Ok(())
}
