//! Star sync demo binary
//!
//! Drives a few star toggles through the synchronizer and prints what the
//! user and the shared cache would see. Talks to a real API when
//! `STAR_SYNC_API_URL` is set, otherwise to a simulated one.

use anyhow::Context;
use serde_json::json;
use star_sync_core::cache::PreferenceCache;
use star_sync_core::environment::SystemClock;
use star_sync_core::notification::Notifier;
use star_sync_core::preference::{EntityId, PreferenceError, PreferenceService};
use star_sync_core::toggle::{ToggleAction, ToggleEnvironment};
use star_sync_runtime::config::SyncConfig;
use star_sync_runtime::{
    BroadcastNotifier, EventRecord, HttpPreferenceService, QueryCache, StarToggle,
};
use star_sync_testing::MockPreferenceService;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Latency of the simulated API
const SIMULATED_LATENCY: Duration = Duration::from_millis(300);

fn sample_events() -> Vec<EventRecord> {
    vec![
        EventRecord::new("1", false).with_field("event_name", json!("Code Wars 2026")),
        EventRecord::new("2", true).with_field("event_name", json!("Retro Gaming Night")),
        EventRecord::new("4", false).with_field("event_name", json!("Cyberpunk Dance Battle")),
    ]
}

fn print_cache(cache: &QueryCache) {
    for record in cache.list("all").unwrap_or_default() {
        let name = record
            .extra
            .get("event_name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<unnamed>");
        let star = if record.is_starred { "★" } else { "☆" };
        println!("    {star} {name}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "star_sync_demo=info,star_sync_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env();
    tracing::info!(
        debounce_ms = config.debounce_ms,
        api = config.api.base_url.as_deref().unwrap_or("simulated"),
        "Loaded configuration"
    );

    println!("=== Star Sync Demo: optimistic, debounced favourites ===\n");

    let simulated = config
        .api
        .base_url
        .is_none()
        .then(|| Arc::new(MockPreferenceService::with_latency(SIMULATED_LATENCY)));

    let service: Arc<dyn PreferenceService> = match &simulated {
        Some(mock) => {
            println!("No STAR_SYNC_API_URL set, using a simulated API ({SIMULATED_LATENCY:?} latency)\n");
            Arc::clone(mock) as Arc<dyn PreferenceService>
        },
        None => Arc::new(
            HttpPreferenceService::from_config(&config.api).context("building HTTP client")?,
        ),
    };

    let cache = Arc::new(QueryCache::new());
    cache.put_list("all", sample_events());
    cache.put_detail(EntityId::new("1"), sample_events().remove(0));

    let notifier = Arc::new(BroadcastNotifier::new());
    let mut toasts = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(toast) = toasts.recv().await {
            println!("  [toast] {}", toast.message);
        }
    });

    let env = ToggleEnvironment::new(
        service,
        Arc::clone(&cache) as Arc<dyn PreferenceCache>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::new(SystemClock),
    )
    .with_config(config.toggle_config());

    // 1. A burst of three clicks becomes one write
    println!(">>> Clicking the star of 'Code Wars 2026' three times quickly");
    let code_wars = StarToggle::new(EntityId::new("1"), false, env.clone());
    for _ in 0..3 {
        let shown = code_wars.toggle().await?;
        println!("  UI shows: {}", if shown { "★" } else { "☆" });
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    code_wars
        .settle_timeout(config.shutdown_timeout())
        .await
        .context("waiting for the write")?;
    println!("  Cached list after the write:");
    print_cache(&cache);

    // 2. A burst that ends where it started writes nothing
    println!("\n>>> Clicking the star of 'Retro Gaming Night' twice");
    let retro = StarToggle::new(EntityId::new("2"), true, env.clone());
    retro.toggle().await?;
    retro.toggle().await?;
    retro.settle().await;
    println!("  Still starred: {}", retro.server_value().await);

    // 3. A failing write rolls back
    if let Some(mock) = &simulated {
        println!("\n>>> Starring 'Cyberpunk Dance Battle' while the API is down");
        mock.fail_next(PreferenceError::Network("connection refused".into()));
        let dance = StarToggle::new(EntityId::new("4"), false, env.clone());
        dance.toggle().await?;
        println!("  UI shows: {}", if dance.current_value().await { "★" } else { "☆" });
        dance.settle().await;
        println!(
            "  UI after rollback: {}",
            if dance.current_value().await { "★" } else { "☆" }
        );
    }

    // 4. Leaving the page inside the window still saves the click
    println!("\n>>> Un-starring 'Code Wars 2026' and leaving the page immediately");
    code_wars.toggle().await?;
    let mut actions = code_wars.subscribe_actions();
    code_wars.detach().await?;
    let outcome = tokio::time::timeout(config.shutdown_timeout(), async {
        while let Ok(action) = actions.recv().await {
            if matches!(
                action,
                ToggleAction::CommitSucceeded { .. } | ToggleAction::CommitFailed { .. }
            ) {
                return Some(action);
            }
        }
        None
    })
    .await;
    tracing::info!(?outcome, "Background write finished");
    println!("  Cached list after the background write:");
    print_cache(&cache);

    if let Some(mock) = &simulated {
        println!("\nSimulated API received {} writes", mock.call_count());
    }

    println!("\n=== Demo complete ===");
    Ok(())
}
