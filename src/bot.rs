//! Bot startup and lifecycle.
//!
//! Wires configuration, persisted state and the portal client together,
//! starts the Discord client and the update poller, and shuts both down on
//! Ctrl-C or when the poller hits a fatal error.

use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use tokio::sync::{oneshot, watch};

use crate::catalog::{PortalLinks, SnapshotCell};
use crate::commands;
use crate::config::{Config, StateBackend};
use crate::notify::{DiscordSink, NotificationSink};
use crate::portal::{CatalogSource, PortalClient};
use crate::state::{JsonFileStore, SqliteStore, StateStore};
use crate::subscriptions::SubscriptionStore;
use crate::types::{Data, Error};
use crate::updater::{Updater, UpdaterSettings};
use crate::utils::retry::RetryPolicy;
use crate::watermark::WatermarkStore;

/// How long an in-flight update cycle may take to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let state = open_state_store(&config).await?;
    let read_policy = RetryPolicy::with_attempts(config.state_read_attempts);

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("modwatch/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let portal: Arc<dyn CatalogSource> = Arc::new(PortalClient::new(http_client, &config.portal_api_url)?);
    let catalog = Arc::new(SnapshotCell::new());
    let subscriptions = Arc::new(SubscriptionStore::new(state.clone(), read_policy));
    let watermark = WatermarkStore::new(state, read_policy);
    let links = PortalLinks::new(&config.portal_url, &config.assets_url);
    let settings = UpdaterSettings {
        interval: config.poll_interval,
        lookback: config.lookback,
        known_versions: config.known_runtime_versions.clone(),
    };
    let default_version = config.default_runtime_version.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (poller_tx, mut poller_rx) = oneshot::channel::<crate::error::Result<()>>();

    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |context, event, framework, data| {
                Box::pin(event_handler(context, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |context, ready, framework| {
            Box::pin(async move {
                tracing::info!("Connected as {}", ready.user.name);
                poise::builtins::register_globally(context, &framework.options().commands).await?;

                let sink: Arc<dyn NotificationSink> = Arc::new(DiscordSink::new(context.http.clone()));
                let updater = Updater::new(
                    Arc::clone(&portal),
                    Arc::clone(&sink),
                    Arc::clone(&catalog),
                    Arc::clone(&subscriptions),
                    watermark,
                    links.clone(),
                    settings,
                );
                tokio::spawn(async move {
                    let _ = poller_tx.send(updater.run(shutdown_rx).await);
                });

                Ok(Data {
                    catalog,
                    portal,
                    subscriptions,
                    sink,
                    links,
                    default_version,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;
    let shard_manager = client.shard_manager.clone();

    let stopped_early = tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Discord client stopped: {}", e);
            }
            None
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            None
        }
        outcome = &mut poller_rx => Some(outcome),
    };

    let _ = shutdown_tx.send(true);
    shard_manager.shutdown_all().await;
    drop(client);

    match stopped_early {
        Some(Ok(result)) => result.map_err(Into::into),
        Some(Err(_)) => Err("Update poller stopped unexpectedly".into()),
        None => match tokio::time::timeout(SHUTDOWN_GRACE, poller_rx).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            // Never started: the client stopped before setup ran
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                tracing::warn!("Update poller did not stop within {:?}", SHUTDOWN_GRACE);
                Ok(())
            }
        },
    }
}

async fn open_state_store(config: &Config) -> crate::error::Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.state_backend {
        StateBackend::Json => {
            tracing::info!("Using JSON state in {}", config.state_dir);
            Arc::new(JsonFileStore::open(&config.state_dir).await?)
        }
        StateBackend::Sqlite => {
            tracing::info!("Using SQLite state at {}", config.db_path);
            Arc::new(SqliteStore::open(&config.db_path).await?)
        }
    };
    Ok(store)
}

async fn event_handler(
    _context: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::GuildCreate { guild, .. } = event {
        if let Err(e) = data.subscriptions.ensure_destination(&guild.id.to_string()).await {
            tracing::warn!("Could not register guild {}: {}", guild.id, e);
        }
    }
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            tracing::error!("Bot setup failed: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("/{} failed: {}", ctx.command().qualified_name, error);
            let _ = ctx.say("❌ Something went wrong, please try again later.").await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}
