//! Application Startup
//!
//! Wires the durable store, the cache-aside layer, the use-case services,
//! the event dispatcher and the Hub, then serves the realtime endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::application::events::{EventDispatcher, InMemoryEventDispatcher};
use crate::application::services::{
    AttachmentService, AttachmentServiceImpl, MessageService, MessageServiceImpl, PinService,
    PinServiceImpl, ReactionService, ReactionServiceImpl, ReadReceiptService,
    ReadReceiptServiceImpl, Repositories, SearchService, SearchServiceImpl,
};
use crate::config::{CacheSettings, Settings};
use crate::domain::ChannelRepository;
use crate::infrastructure::cache::{
    self, CacheStore, CachedAttachmentRepository, CachedChannelRepository,
    CachedMessageRepository, CachedReactionRepository,
};
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    PgAttachmentRepository, PgChannelRepository, PgMessageRepository, PgReactionRepository,
    PgReadReceiptRepository,
};
use crate::infrastructure::storage::{FileStorage, LocalFileStorage};
use crate::presentation::http::create_router;
use crate::presentation::middleware::create_trace_layer;
use crate::presentation::websocket::Hub;
use crate::shared::snowflake::SnowflakeGenerator;

/// Use-case services, ready to be called by any front end.
#[derive(Clone)]
pub struct Services {
    pub messages: Arc<dyn MessageService>,
    pub pins: Arc<dyn PinService>,
    pub receipts: Arc<dyn ReadReceiptService>,
    pub search: Arc<dyn SearchService>,
    pub attachments: Arc<dyn AttachmentService>,
    pub reactions: Arc<dyn ReactionService>,
}

impl Services {
    pub fn new(
        repos: Repositories,
        storage: Arc<dyn FileStorage>,
        dispatcher: Arc<dyn EventDispatcher>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            messages: Arc::new(MessageServiceImpl::new(
                repos.clone(),
                dispatcher.clone(),
                id_generator.clone(),
            )),
            pins: Arc::new(PinServiceImpl::new(repos.clone(), dispatcher.clone())),
            receipts: Arc::new(ReadReceiptServiceImpl::new(repos.clone(), dispatcher.clone())),
            search: Arc::new(SearchServiceImpl::new(repos.messages.clone())),
            attachments: Arc::new(AttachmentServiceImpl::new(
                repos.clone(),
                storage,
                dispatcher.clone(),
                id_generator.clone(),
            )),
            reactions: Arc::new(ReactionServiceImpl::new(repos, dispatcher, id_generator)),
        }
    }
}

/// Put the cache-aside decorators in front of durable repositories.
/// Read receipts are not cached.
pub fn cached_repositories(
    durable: Repositories,
    store: Arc<dyn CacheStore>,
    settings: &CacheSettings,
) -> Repositories {
    Repositories {
        channels: Arc::new(CachedChannelRepository::new(
            durable.channels,
            store.clone(),
            settings,
        )),
        messages: Arc::new(CachedMessageRepository::new(
            durable.messages,
            store.clone(),
            settings,
        )),
        reactions: Arc::new(CachedReactionRepository::new(
            durable.reactions,
            store.clone(),
            settings,
        )),
        attachments: Arc::new(CachedAttachmentRepository::new(
            durable.attachments,
            store,
            settings,
        )),
        receipts: durable.receipts,
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: Arc<Hub>,
    pub services: Services,
    /// Membership lookups for realtime subscriptions
    pub channels: Arc<dyn ChannelRepository>,
    /// Raised once on shutdown; every connection watches it
    pub shutdown: watch::Receiver<bool>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    shutdown: watch::Sender<bool>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let db = database::create_pool(&settings.database).await?;
        database::run_migrations(&db).await?;

        let redis = cache::create_redis_cache(&settings.redis, &settings.cache).await?;
        let store: Arc<dyn CacheStore> = Arc::new(redis);

        let durable = Repositories {
            channels: Arc::new(PgChannelRepository::new(db.clone())),
            messages: Arc::new(PgMessageRepository::new(db.clone())),
            reactions: Arc::new(PgReactionRepository::new(db.clone())),
            attachments: Arc::new(PgAttachmentRepository::new(db.clone())),
            receipts: Arc::new(PgReadReceiptRepository::new(db)),
        };
        let repos = cached_repositories(durable, store, &settings.cache);

        let id_generator = Arc::new(SnowflakeGenerator::with_epoch(
            settings.snowflake.machine_id as u64,
            0,
            settings.snowflake.epoch,
        ));
        let storage: Arc<dyn FileStorage> =
            Arc::new(LocalFileStorage::new(&settings.storage).await?);

        let hub = Arc::new(Hub::new());
        let dispatcher = Arc::new(InMemoryEventDispatcher::new());
        dispatcher.subscribe(hub.clone());

        let channels = repos.channels.clone();
        let services = Services::new(repos, storage, dispatcher, id_generator);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = AppState {
            settings: Arc::new(settings.clone()),
            hub,
            services,
            channels,
            shutdown: shutdown_rx,
        };

        let router = create_router(state).layer(create_trace_layer());

        let listener = TcpListener::bind(settings.server_addr()).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            shutdown,
        })
    }

    /// Serve until ctrl-c, then tell every open connection to close.
    pub async fn run_until_stopped(self) -> Result<()> {
        let shutdown = self.shutdown;
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
            let _ = shutdown.send(true);
        })
        .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
