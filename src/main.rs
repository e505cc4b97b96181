//! Agency - 多角色协作会话
//!
//! 入口：初始化日志、加载配置、按配置组装名单并运行一次会话；Ctrl-C 取消会话。
//! 用法：`agency [任务描述...]`，任务描述作为 Admin 的开场发言。

use std::sync::Arc;

use anyhow::Context;
use agency::actor::Decider;
use agency::config::load_config;
use agency::console::Console;
use agency::core::builder::builder_from_config;
use agency::core::{SessionEvent, SessionSupervisor};
use agency::llm::create_llm_from_config;
use agency::memory::MessageKind;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agency::observability::init();

    let config_path = std::env::var("AGENCY_CONFIG").ok().map(Into::into);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let workspace = cfg.app.workspace();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let task: Vec<String> = std::env::args().skip(1).collect();
    let task = (!task.is_empty()).then(|| task.join(" "));

    let console = Console::new(cfg.session.termination_token.clone());
    let llm = create_llm_from_config(&cfg);
    let supervisor = SessionSupervisor::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let human: Arc<dyn Decider> = console.clone();
    let orchestrator = builder_from_config(&cfg, &workspace, llm, Some(human))
        .await
        .context("Failed to assemble roster")?
        .confirmation(console)
        .cancel_token(supervisor.child_token())
        .events(tx)
        .build()
        .await
        .context("Failed to build session")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Message { message } if message.kind() != MessageKind::ToolRequest => {
                    println!("{}: {}", message.sender, message.render());
                }
                SessionEvent::TurnStarted { round, actor } => {
                    tracing::debug!(round, actor = %actor, "turn");
                }
                _ => {}
            }
        }
    });

    let sup = supervisor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling session");
            sup.cancel();
        }
    });

    let summary = orchestrator
        .run(task.as_deref())
        .await
        .context("Session finalization failed")?;
    let _ = printer.await;

    println!("\nChat Summary:\n{}", summary.outcome);
    println!("Results saved to {}", workspace.display());
    if summary.reason.is_failure() {
        anyhow::bail!("session aborted: {}", summary.reason);
    }
    Ok(())
}
