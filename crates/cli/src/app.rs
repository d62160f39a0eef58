use std::{sync::Arc, time::Duration};

use {tokio_util::sync::CancellationToken, tracing::{error, info, warn}};

use {
    skein_agents::{AgentDef, Runtime, ToolRegistry},
    skein_channels::{ChannelRegistry, MessageSink, TelegramAdapter},
    skein_config::Config,
    skein_gateway::{
        auth::Authenticator,
        chat::agent_event_sink,
        dispatch::Dispatcher,
        server::start_server,
        services::ChatService,
        state::GatewayState,
    },
    skein_lanes::LaneManager,
    skein_llm::{AnthropicProvider, Provider, ToolDef},
    skein_routing::{Binding, BindingStore, Resolver},
    skein_sessions::{DmPolicy, GroupPolicy, SendPolicy, SessionStore},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire every component and serve until a termination signal arrives.
pub async fn run_gateway(cfg: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    // Session store with TTL sweeper.
    let sessions = Arc::new(SessionStore::new(
        cfg.session.ttl(),
        cfg.session.max_history,
    ));
    sessions.start_sweeper(cfg.session.cleanup_interval(), shutdown.clone());

    // Lane scheduler with idle reaper.
    let lanes = Arc::new(LaneManager::new(
        shutdown.clone(),
        cfg.queue.buffer_size,
        cfg.queue.idle_timeout(),
    ));
    lanes.start_cleanup(cfg.queue.cleanup_interval());

    // Router: telegram bindings plus the configured default agent.
    let bindings: Vec<Binding> = cfg
        .channels
        .telegram
        .bindings
        .iter()
        .map(|rule| Binding {
            channel: "telegram".into(),
            peer_kind: rule.peer_kind.clone(),
            peer_id: rule.peer_id.clone(),
            agent_id: rule.agent_id.clone(),
            ..Default::default()
        })
        .collect();
    let mut default_agent = cfg
        .agents
        .first()
        .map(|a| a.id.clone())
        .unwrap_or_default();
    if !cfg.channels.telegram.default_agent.is_empty() {
        default_agent = cfg.channels.telegram.default_agent.clone();
    }
    let router = Resolver::new(BindingStore::new(bindings, default_agent));

    // LLM provider.
    let provider: Arc<dyn Provider> = match cfg.llm.provider.as_str() {
        "anthropic" => Arc::new(AnthropicProvider::new(&cfg.llm.api_key, &cfg.llm.model)),
        other => anyhow::bail!("unsupported LLM provider: {other}"),
    };

    // Gateway state and the agent runtime, wired through the event sink.
    let state = GatewayState::new(Authenticator::new(&cfg.auth.token));

    let mut runtime = Runtime::new(provider, cfg.llm.max_turns);
    for agent in &cfg.agents {
        runtime.register_agent(AgentDef {
            id: agent.id.clone(),
            name: agent.name.clone(),
            system_prompt: agent.system_prompt.clone(),
            model: agent.model.clone(),
            tools: agent
                .tools
                .iter()
                .map(|t| ToolDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: serde_json::json!({ "type": "object" }),
                })
                .collect(),
        });
    }
    runtime.set_event_sink(agent_event_sink(Arc::clone(&state)));
    runtime.set_tool_executor(Arc::new(ToolRegistry::new()));
    let runtime = Arc::new(runtime);

    // Channel adapters and the unified dispatcher.
    let channels = Arc::new(ChannelRegistry::new());
    let dispatcher = Dispatcher::new(
        Arc::clone(&state),
        router,
        Arc::clone(&sessions),
        Arc::clone(&lanes),
        runtime,
        Arc::clone(&channels),
    );
    state.set_chat(dispatcher.clone() as Arc<dyn ChatService>);

    if cfg.channels.telegram.enabled {
        let tg = &cfg.channels.telegram;
        let policy = SendPolicy {
            dm: DmPolicy::parse(&tg.dm_policy),
            group: GroupPolicy::parse(&tg.group_policy),
            allowed_users: tg.allowed_users.clone(),
            allowed_groups: tg.allowed_groups.clone(),
        };
        let pipeline = dispatcher.clone();
        let sink: MessageSink = Arc::new(move |msg| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move { pipeline.process(msg).await })
        });
        channels.register(Arc::new(TelegramAdapter::new(&tg.bot_token, policy, sink)));
    }

    channels.start_all(shutdown.clone()).await?;

    let server = {
        let state = Arc::clone(&state);
        let shutdown = shutdown.clone();
        let host = cfg.server.host.clone();
        let port = cfg.server.port;
        tokio::spawn(async move {
            if let Err(e) = start_server(state, &host, port, shutdown.clone()).await {
                error!(err = %e, "gateway server error");
                shutdown.cancel();
            }
        })
    };

    info!(port = cfg.server.port, "skein started");
    wait_for_signal().await;
    info!("shutting down");

    shutdown.cancel();
    lanes.stop_all();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        channels.stop_all().await;
        let _ = server.await;
    })
    .await
    .is_err()
    {
        warn!("shutdown timed out");
    }

    info!("skein stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
