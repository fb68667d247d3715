//! Wiring: resolved config → bus publisher → dispatch handler → adapter.

use std::sync::Arc;

use {
    anyhow::{Context, Result, bail},
    taskrelay_bus::{BusEndpoint, BusPublisher, PublisherOptions, RedisTransport},
    taskrelay_channels::ChatOutbound,
    taskrelay_config::ResolvedConfig,
    taskrelay_dispatch::{DispatchHandler, DispatchOutcome},
    taskrelay_slack::{SlackApi, SocketModeListener},
    tokio_util::sync::CancellationToken,
    tracing::info,
};

use crate::shell::{self, ShellOutbound};

/// The process-wide bus publisher. Nothing is dialed until the first
/// publish (or an explicit `connect`).
pub fn build_publisher(config: &ResolvedConfig, auto_reconnect: bool) -> Arc<BusPublisher> {
    BusPublisher::new(
        Arc::new(RedisTransport),
        BusEndpoint {
            host: config.bus_host.clone(),
            port: config.bus_port,
        },
        config.bus_password.clone(),
        PublisherOptions {
            connect_timeout: config.connect_timeout(),
            publish_timeout: config.publish_timeout(),
            keepalive: config.keepalive().filter(|_| auto_reconnect),
            auto_reconnect,
            ..PublisherOptions::default()
        },
    )
}

/// Serve Slack over Socket Mode until cancelled.
pub async fn run_slack(config: &ResolvedConfig, cancel: CancellationToken) -> Result<()> {
    let Some(app_token) = config.chat.slack.app_token.clone() else {
        bail!("the slack adapter needs chat.slack.app_token (TASKRELAY_SLACK_APP_TOKEN)");
    };
    let api = Arc::new(SlackApi::new(
        &config.chat.slack.api_base,
        config.chat_token.clone(),
        Some(app_token),
    )?);
    let identity = api.auth_test().await.context("slack auth.test failed")?;
    info!(
        bot_user_id = %identity.user_id,
        bot_user = %identity.name,
        "slack bot authenticated"
    );

    let publisher = build_publisher(config, true);
    let outbound: Arc<dyn ChatOutbound> = Arc::clone(&api) as _;
    let handler = Arc::new(DispatchHandler::from_config(
        config,
        Some(&identity.user_id),
        publisher,
        outbound,
    )?);

    SocketModeListener::new(api, identity.user_id, handler)
        .run(cancel)
        .await?;
    Ok(())
}

/// Read commands from stdin until EOF or cancellation.
pub async fn run_shell(config: &ResolvedConfig, cancel: CancellationToken) -> Result<()> {
    let publisher = build_publisher(config, true);
    let handler = Arc::new(DispatchHandler::from_config(
        config,
        None,
        publisher,
        Arc::new(ShellOutbound),
    )?);
    info!("shell adapter reading commands from stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    shell::run_lines(stdin, handler, cancel).await?;
    Ok(())
}

/// Dispatch one `<keyword> <target>` command as the local operator.
pub async fn publish_once(config: &ResolvedConfig, keyword: &str, target: &str) -> Result<()> {
    let publisher = build_publisher(config, false);
    let handler =
        DispatchHandler::from_config(config, None, publisher, Arc::new(ShellOutbound))?;

    match handler
        .dispatch(&shell::shell_event(&format!("{keyword} {target}")))
        .await
    {
        DispatchOutcome::Dispatched { task, receivers } => {
            info!(task = %task, channel = %config.bus_channel, receivers, "task published");
            Ok(())
        },
        DispatchOutcome::Dropped { task, reason } => bail!("{task} was not published: {reason}"),
        DispatchOutcome::Ignored => {
            bail!("{keyword:?} with target {target:?} is not a configured command")
        },
    }
}
