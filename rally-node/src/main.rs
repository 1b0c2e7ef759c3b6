// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The rally backend node.
//!
//! Assembles the store, cache, broker, services and the HTTP/WebSocket surface from the
//! resolved configuration, spawns the background scheduler and runs until interrupted.

mod config;
mod scheduler;

use clap::Parser;
use tokio::time::Duration;

use std::{path::PathBuf, sync::Arc};

use rally_common::{
    logger::logger_init,
    task::{ShutdownBus, Spawner},
};
use rally_hub::{Hub, InProcessBroker};
use rally_rest_api::{ApiArgs, ApiArgsInner};
use rally_service::{
    account::AccountService,
    board::BoardService,
    chat::ChatService,
    event::EventService,
    export::ExportService,
    invite::InviteService,
    jobs::NotificationJobs,
    mailer::{DynMailer, LogMailer},
    participant::ParticipantService,
    poll::PollService,
    progress::ProgressEngine,
};
use rally_storage::{Cache, Store};

use config::{NodeConfig, NodeConfigBuilder};

#[derive(Parser)]
#[clap(name = "rally", version, about = "Collaborative event-planning backend")]
struct ClArgs {
    /// Path to the configuration file.
    #[clap(short, long, default_value = "rally.toml")]
    config: PathBuf,
}

fn build_broker(config: &NodeConfig) -> Arc<dyn rally_hub::Broker> {
    if config.broker.use_redis {
        #[cfg(feature = "redis")]
        {
            if let Some(url) = config.broker.redis_url.as_deref() {
                match rally_hub::RedisBroker::new(url, config.broker.group_capacity) {
                    Ok(broker) => {
                        log::info!("using the Redis broker at `{}`", url);
                        return Arc::new(broker);
                    }
                    Err(e) => log::warn!("Redis broker unavailable ({}); using the in-process hub", e),
                }
            } else {
                log::warn!("USE_REDIS_CHANNEL_LAYER set without REDIS_URL; using the in-process hub");
            }
        }
        #[cfg(not(feature = "redis"))]
        log::warn!("Redis broker requested but this build lacks the `redis` feature; using the in-process hub");
    }
    match config.broker.group_capacity {
        Some(capacity) => Arc::new(InProcessBroker::new(capacity)),
        None => Arc::new(InProcessBroker::default()),
    }
}

fn build_cache(config: &NodeConfig) -> Cache {
    if config.cache.use_redis {
        #[cfg(feature = "redis")]
        {
            if let Some(url) = config.cache.redis_url.as_deref() {
                match rally_storage::cache::RedisCache::new(url) {
                    Ok(backend) => {
                        log::info!("using the Redis cache at `{}`", url);
                        return Cache::with_backend(Arc::new(backend));
                    }
                    Err(e) => log::warn!("Redis cache unavailable ({}); using the in-process cache", e),
                }
            } else {
                log::warn!("USE_REDIS_CACHE set without REDIS_URL; using the in-process cache");
            }
        }
        #[cfg(not(feature = "redis"))]
        log::warn!("Redis cache requested but this build lacks the `redis` feature; using the in-process cache");
    }
    Cache::in_process()
}

#[tokio::main]
async fn main() {
    let cl_args = ClArgs::parse();

    let config = match NodeConfigBuilder::from_file(&cl_args.config).map(|b| b.apply_env().finish()) {
        Ok(Ok(config)) => config,
        Ok(Err(e)) | Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logger_init(config.logger.clone()) {
        eprintln!("initializing the logger failed: {}", e);
        std::process::exit(1);
    }

    if let Some(url) = config.database_url.as_deref() {
        log::info!("DATABASE_URL `{}` recorded; this build runs on the in-memory store", url);
    }

    let store = Store::new();
    let cache = build_cache(&config);
    let hub = Hub::new(build_broker(&config));
    let mailer: DynMailer = Arc::new(LogMailer::new(config.mailer.default_from_email.clone()));

    let progress = ProgressEngine::new(store.clone(), cache, hub.clone());
    let secret = config.secret_key.as_bytes().to_vec();

    let args: ApiArgs = Arc::new(ApiArgsInner {
        config: config.rest_api.clone(),
        accounts: AccountService::new(store.clone(), mailer.clone(), secret, config.front_url.clone()),
        events: EventService::new(store.clone()),
        board: BoardService::new(store.clone(), hub.clone(), progress.clone()),
        polls: PollService::new(store.clone(), hub.clone()),
        chat: ChatService::new(store.clone(), hub.clone()),
        invites: InviteService::new(store.clone(), config.front_url.clone()),
        participants: ParticipantService::new(store.clone()),
        progress,
        exports: ExportService::new(store.clone()),
        hub: hub.clone(),
        store: store.clone(),
    });

    let mut shutdown_bus = ShutdownBus::new();

    let api_shutdown = shutdown_bus.register();
    Spawner::spawn(rally_rest_api::serve(args, api_shutdown), "rest-api");

    let jobs = NotificationJobs::new(store, mailer);

    let reminders = jobs.clone();
    scheduler::spawn_periodic(
        "deadline-reminders",
        Duration::from_secs(config.scheduler.reminder_interval_secs),
        shutdown_bus.register(),
        move || {
            let jobs = reminders.clone();
            async move { jobs.send_deadline_reminders().await }
        },
    );

    let closings = jobs.clone();
    scheduler::spawn_periodic(
        "poll-closing-notifications",
        Duration::from_secs(config.scheduler.poll_closing_interval_secs),
        shutdown_bus.register(),
        move || {
            let jobs = closings.clone();
            async move { jobs.send_poll_closing_notifications().await }
        },
    );

    if config.scheduler.enable_daily_digest {
        let digest = jobs.clone();
        scheduler::spawn_daily(
            "daily-digest",
            config.scheduler.digest_hour_utc,
            shutdown_bus.register(),
            move || {
                let jobs = digest.clone();
                async move { jobs.send_daily_digest().await }
            },
        );
    }

    log::info!("node is up on {}", config.rest_api.binding_socket_addr());

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("listening for the shutdown signal failed: {}", e);
    }

    log::info!("shutting down");
    shutdown_bus.trigger();

    // Give the tasks a moment to wind down their sockets.
    tokio::time::sleep(Duration::from_millis(200)).await;
}
