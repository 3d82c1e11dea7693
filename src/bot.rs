use anyhow::{Context, Result};
use rank_core::{
    FlowError, Platform, RankService, Rating, ResultsRefresher, ServiceSettings, SheetStore,
    StoreClient, SystemClock,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discord::components::{command_definitions, fits_custom_id, parse_rate_custom_id};
use crate::discord::interaction::{self, deferred_ephemeral, ephemeral_followup, ephemeral_reply};
use crate::discord::{gateway, DiscordHttp, DiscordPlatform, GatewayEvent, Interaction, InteractionContext};
use crate::sheets;

const UNKNOWN_CONTROL: &str = "❌ This control is no longer valid.";
const MISSING_DINO: &str = "❌ `dino` is required";
const DINO_TOO_LONG: &str = "❌ Dinosaur ID too long";

pub struct BotState {
    pub config: Config,
    pub service: Arc<RankService>,
    pub http: Arc<DiscordHttp>,
    revived: AtomicBool,
}

pub struct Bot {
    state: Arc<BotState>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bot {
    /// Connect to the spreadsheet and prepare the tables. The gateway is not
    /// touched until [`start`](Self::start).
    pub async fn new(config: Config) -> Result<Self> {
        let sheets = sheets::connect(&config.sheets)
            .await
            .with_context(|| "Failed to connect to Google Sheets")?;
        info!("Using spreadsheet {}", sheets.spreadsheet_id());

        let bot = Self::from_parts(config, Arc::new(sheets))?;
        bot.state.prepare_store().await?;
        Ok(bot)
    }

    /// Wire the service over an already opened store backend.
    pub fn from_parts(config: Config, backend: Arc<dyn SheetStore>) -> Result<Self> {
        let token = config
            .discord
            .token
            .clone()
            .context("Discord token is not set")?;
        let http = Arc::new(
            DiscordHttp::new(&config.discord.api_base, token)
                .with_context(|| "Failed to create Discord HTTP client")?,
        );
        let platform: Arc<dyn Platform> = Arc::new(DiscordPlatform::new(http.clone()));

        let service = Arc::new(RankService::new(
            platform,
            Arc::new(StoreClient::new(backend)),
            Arc::new(SystemClock),
            ServiceSettings {
                results_ttl: config.cache_ttl(),
                retry: config.retry_policy(),
                glyphs: config.stars.clone(),
            },
        ));

        let state = Arc::new(BotState {
            config,
            service,
            http,
            revived: AtomicBool::new(false),
        });
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Bot {
            state,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    pub fn state(&self) -> Arc<BotState> {
        self.state.clone()
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Anthranks bot");

        let (event_tx, event_rx) = mpsc::channel(256);
        let token = self
            .state
            .config
            .discord
            .token
            .clone()
            .context("Discord token is not set")?;
        self.tasks.push(gateway::spawn(
            self.state.config.discord.gateway_url.clone(),
            token,
            event_tx,
            self.shutdown_tx.subscribe(),
        ));

        let state = self.state.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            Self::event_loop(state, event_rx, shutdown_rx).await;
        }));

        let refresher = ResultsRefresher::new(self.state.service.clone(), self.state.config.refresh_interval());
        self.tasks.push(refresher.spawn(self.shutdown_tx.subscribe()));

        info!("Anthranks bot started");
        Ok(())
    }

    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down bot");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Bot shutdown complete");
        Ok(())
    }

    async fn event_loop(
        state: Arc<BotState>,
        mut event_rx: mpsc::Receiver<GatewayEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Event loop started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Event loop shutting down");
                    break;
                },
                event = event_rx.recv() => match event {
                    Some(event) => {
                        let state = state.clone();
                        // Interactions are handled concurrently.
                        tokio::spawn(async move { state.handle_event(event).await });
                    }
                    None => {
                        warn!("Gateway event stream ended");
                        break;
                    }
                },
            }
        }
    }
}

impl BotState {
    /// Enforce table headers and load post metadata.
    pub async fn prepare_store(&self) -> Result<()> {
        let votes = self
            .service
            .votes()
            .ensure_header()
            .await
            .with_context(|| "Failed to verify the Votes table")?;
        debug!("Votes header: {:?}", votes);

        let entries = self
            .service
            .metadata()
            .load()
            .await
            .with_context(|| "Failed to load post metadata")?;
        info!("Loaded metadata for {} entries", entries.len());
        Ok(())
    }

    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { application_id, user } => self.on_ready(application_id, &user).await,
            GatewayEvent::Interaction(payload) => self.handle_payload(payload).await,
        }
    }

    async fn on_ready(&self, application_id: u64, user: &str) {
        info!("Logged in as {}", user);

        let guild = self.config.discord.guild_id;
        match self
            .http
            .overwrite_commands(application_id, guild, &command_definitions())
            .await
        {
            Ok(()) => match guild {
                Some(guild) => info!("Synced slash commands to guild {}", guild),
                None => info!("Synced global slash commands"),
            },
            Err(e) => error!("Failed to register slash commands: {}", e),
        }

        // READY repeats on every reconnect; revival runs once per process.
        if !self.revived.swap(true, Ordering::SeqCst) {
            self.service.revive().await;
        }
    }

    async fn handle_payload(&self, payload: Value) {
        match interaction::parse(payload) {
            Ok(interaction) => self.handle_interaction(interaction).await,
            Err(e) => warn!("Unparsable interaction: {}", e),
        }
    }

    pub async fn handle_interaction(&self, interaction: Interaction) {
        match interaction {
            Interaction::Command { ctx, name, options } => match name.as_str() {
                "rate" => self.handle_rate(&ctx, options.string("dino")).await,
                "results" => {
                    self.handle_results(
                        &ctx,
                        options.string("thread_id"),
                        options.snowflake("channel"),
                        options.string("dino"),
                    )
                    .await
                }
                other => {
                    warn!("Unknown command '{}'", other);
                    self.respond(&ctx, &ephemeral_reply(UNKNOWN_CONTROL)).await;
                }
            },
            Interaction::Select { ctx, custom_id, values } => {
                self.handle_select(&ctx, &custom_id, &values).await
            }
            Interaction::Unsupported { kind } => debug!("Ignoring interaction type {}", kind),
        }
    }

    async fn handle_rate(&self, ctx: &InteractionContext, dino: Option<&str>) {
        let Some(dino) = dino else {
            self.respond(ctx, &ephemeral_reply(MISSING_DINO)).await;
            return;
        };
        if !fits_custom_id(dino) {
            self.respond(ctx, &ephemeral_reply(DINO_TOO_LONG)).await;
            return;
        }
        if !self.respond(ctx, &deferred_ephemeral()).await {
            return;
        }

        let reply = match self.service.post_rate_controls(ctx.channel_id, dino).await {
            Ok(_) => format!("✅ Rating controls posted for **{}**.", dino),
            Err(e) => flow_failure(&e, dino, "rate"),
        };
        self.followup(ctx, &reply).await;
    }

    async fn handle_results(
        &self,
        ctx: &InteractionContext,
        thread_id: Option<&str>,
        channel: Option<u64>,
        dino: Option<&str>,
    ) {
        if !self.respond(ctx, &deferred_ephemeral()).await {
            return;
        }

        let outcome = async {
            let dest = self
                .service
                .resolve_destination(thread_id, channel, ctx.channel_id)
                .await?;
            let published = self.service.publish_results(&dest, dino).await?;
            Ok::<_, FlowError>((dest, published))
        }
        .await;

        let reply = match outcome {
            Ok((dest, published)) => format!(
                "✅ Posted ratings for **{}** in <#{}>.",
                published.key, dest.id
            ),
            Err(e) => flow_failure(&e, dino.unwrap_or("__all__"), "results"),
        };
        self.followup(ctx, &reply).await;
    }

    async fn handle_select(&self, ctx: &InteractionContext, custom_id: &str, values: &[String]) {
        let parsed = parse_rate_custom_id(custom_id).and_then(|(entity, category)| {
            let rating: Rating = values.first()?.parse().ok()?;
            Some((entity, category, rating))
        });
        let Some((entity, category, rating)) = parsed else {
            warn!(custom_id, ?values, "Unrecognised component interaction");
            self.respond(ctx, &ephemeral_reply(UNKNOWN_CONTROL)).await;
            return;
        };

        if !self.respond(ctx, &deferred_ephemeral()).await {
            return;
        }
        let reply = self
            .service
            .submit_rating(&entity, &ctx.user_id, category, rating)
            .await;
        self.followup(ctx, &reply.message).await;
    }

    async fn respond(&self, ctx: &InteractionContext, body: &Value) -> bool {
        match self.http.create_interaction_response(&ctx.id, &ctx.token, body).await {
            Ok(()) => true,
            Err(e) => {
                error!(interaction_id = %ctx.id, "Failed to answer interaction: {}", e);
                false
            }
        }
    }

    async fn followup(&self, ctx: &InteractionContext, content: &str) {
        if let Err(e) = self
            .http
            .create_followup(&ctx.application_id, &ctx.token, &ephemeral_followup(content))
            .await
        {
            error!(interaction_id = %ctx.id, "Failed to send follow-up: {}", e);
        }
    }
}

/// Log a failed flow and produce the reply for the user.
fn flow_failure(err: &FlowError, entity_id: &str, flow: &str) -> String {
    if err.is_validation() {
        debug!(entity_id, flow, "Rejected request: {}", err);
    } else {
        error!(entity_id, flow, "Request failed: {}", err);
    }
    err.user_message()
}
