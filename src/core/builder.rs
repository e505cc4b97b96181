//! 会话构建器：统一的会话初始化逻辑
//!
//! 名单、注册表、确认通道、取消令牌与超时都在这里组装成 Orchestrator；
//! 工作目录由调用方显式传入，每个会话拥有独立的上下文存储与导出目录。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::{Actor, Decider, LlmDecider, TurnSelector};
use crate::config::{AppConfig, SessionSection};
use crate::core::session_supervisor::secs_to_bound;
use crate::core::{
    AgencyError, AutoApprove, ConfirmationChannel, Orchestrator, Session, SessionEvent,
};
use crate::llm::LlmClient;
use crate::memory::{ContextHandle, SessionExporter, SharedContextStore};
use crate::tools::{builtin_registry, ToolContext, ToolDispatcher, ToolRegistry};

/// 会话参数
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_rounds: usize,
    pub termination_token: String,
    pub actor_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    pub confirmation_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionSection::default())
    }
}

impl From<&SessionSection> for SessionConfig {
    fn from(s: &SessionSection) -> Self {
        Self {
            max_rounds: s.max_rounds,
            termination_token: s.termination_token.clone(),
            actor_timeout: secs_to_bound(s.actor_timeout_secs),
            tool_timeout: secs_to_bound(s.tool_timeout_secs),
            confirmation_timeout: secs_to_bound(s.confirmation_timeout_secs),
        }
    }
}

pub struct SessionBuilder {
    workspace: PathBuf,
    config: SessionConfig,
    actors: Vec<(Actor, Arc<dyn Decider>)>,
    registry: Option<Arc<ToolRegistry>>,
    confirmation: Arc<dyn ConfirmationChannel>,
    cancel: Option<CancellationToken>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    context: Option<ContextHandle>,
}

impl SessionBuilder {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            config: SessionConfig::default(),
            actors: Vec::new(),
            registry: None,
            confirmation: Arc::new(AutoApprove),
            cancel: None,
            events: None,
            context: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.config.max_rounds = max_rounds;
        self
    }

    /// 按声明顺序追加参与者
    pub fn actor(mut self, actor: Actor, decider: Arc<dyn Decider>) -> Self {
        self.actors.push((actor, decider));
        self
    }

    /// 未设置时使用内置注册表
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 未设置时一律同意
    pub fn confirmation(mut self, channel: Arc<dyn ConfirmationChannel>) -> Self {
        self.confirmation = channel;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn events(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 复用已打开的上下文存储（LlmDecider 需要在构建前拿到同一个句柄）
    pub fn context(mut self, handle: ContextHandle) -> Self {
        self.context = Some(handle);
        self
    }

    fn validate(&self, registry: &ToolRegistry) -> Result<(), AgencyError> {
        if self.actors.is_empty() {
            return Err(AgencyError::InvalidRoster("no actors".into()));
        }
        let mut seen = HashSet::new();
        for (actor, _) in &self.actors {
            if actor.name.trim().is_empty() {
                return Err(AgencyError::InvalidRoster("actor name is empty".into()));
            }
            if !seen.insert(actor.name.to_lowercase()) {
                return Err(AgencyError::InvalidRoster(format!(
                    "duplicate actor name: {}",
                    actor.name
                )));
            }
            for tool in &actor.capabilities {
                if !registry.contains(tool) {
                    tracing::warn!(actor = %actor.name, tool = %tool, "capability names an unregistered tool");
                }
            }
        }
        Ok(())
    }

    pub async fn build(self) -> Result<Orchestrator, AgencyError> {
        let registry = self
            .registry
            .clone()
            .unwrap_or_else(|| Arc::new(builtin_registry()));
        self.validate(&registry)?;

        let context = match self.context {
            Some(handle) => handle,
            None => SharedContextStore::open(&self.workspace).await?.into_handle(),
        };
        let (actors, deciders): (Vec<Actor>, Vec<Arc<dyn Decider>>) =
            self.actors.into_iter().unzip();
        let session = Session::new(actors, self.config.max_rounds);
        let tool_ctx = ToolContext {
            session_id: session.id().to_string(),
            workspace: self.workspace.clone(),
            context,
        };
        let dispatcher = ToolDispatcher::new(registry, self.confirmation)
            .with_tool_timeout(self.config.tool_timeout)
            .with_confirmation_timeout(self.config.confirmation_timeout);

        Ok(Orchestrator {
            session,
            deciders,
            selector: TurnSelector::new(&self.config.termination_token),
            dispatcher,
            tool_ctx,
            exporter: SessionExporter::new(&self.workspace),
            cancel: self.cancel.unwrap_or_default(),
            actor_timeout: self.config.actor_timeout,
            events: self.events,
        })
    }
}

/// 按配置组装名单：未写 system_prompt 的 Admin 使用 human（控制台输入），其余 Actor 由 LLM 驱动
pub async fn builder_from_config(
    cfg: &AppConfig,
    workspace: &Path,
    llm: Arc<dyn LlmClient>,
    human: Option<Arc<dyn Decider>>,
) -> Result<SessionBuilder, AgencyError> {
    let registry = Arc::new(builtin_registry());
    let context = SharedContextStore::open(workspace).await?.into_handle();
    let mut builder = SessionBuilder::new(workspace)
        .config(SessionConfig::from(&cfg.session))
        .registry(registry.clone())
        .context(context.clone());

    for section in &cfg.actors {
        let tools = match &section.tools {
            Some(tools) => tools.iter().cloned().collect(),
            None => registry.tools_for_role(section.role),
        };
        let actor = Actor::new(&section.name, section.role)
            .with_tools(tools)
            .with_confirmation(section.requires_confirmation);

        let decider: Arc<dyn Decider> = match (&section.system_prompt, &human) {
            (None, Some(human)) => human.clone(),
            (prompt, _) => {
                let prompt = prompt.clone().unwrap_or_else(|| {
                    format!("You are {}, acting as the {} of a software team.", section.name, section.role)
                });
                Arc::new(
                    LlmDecider::new(&section.name, llm.clone(), prompt, registry.clone())
                        .with_context(context.clone()),
                )
            }
        };
        builder = builder.actor(actor, decider);
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Role, ScriptedDecider};
    use crate::llm::MockLlmClient;
    use tempfile::TempDir;

    #[test]
    fn test_default_session_config_has_no_bounds() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.actor_timeout, None);
        assert_eq!(cfg.tool_timeout, None);
        assert_eq!(cfg.confirmation_timeout, None);
        assert_eq!(cfg.max_rounds, 100);
    }

    #[tokio::test]
    async fn test_empty_roster_rejected() {
        let dir = TempDir::new().unwrap();
        let err = SessionBuilder::new(dir.path()).build().await.err().unwrap();
        assert!(matches!(err, AgencyError::InvalidRoster(_)));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let dir = TempDir::new().unwrap();
        let d: Arc<dyn Decider> = Arc::new(ScriptedDecider::new());
        let err = SessionBuilder::new(dir.path())
            .actor(Actor::new("Coder", Role::Executor), d.clone())
            .actor(Actor::new("coder", Role::Verifier), d)
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgencyError::InvalidRoster(_)));
    }

    #[tokio::test]
    async fn test_roster_from_default_config() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::default();
        let human: Arc<dyn Decider> = Arc::new(ScriptedDecider::new());
        let orch = builder_from_config(&cfg, dir.path(), Arc::new(MockLlmClient::default()), Some(human))
            .await
            .unwrap()
            .build()
            .await
            .unwrap();
        let actors = orch.session().actors();
        assert_eq!(actors.len(), 4);
        assert!(actors[0].can_use("update_context"));
        assert!(!actors[2].can_use("update_context"));
        assert!(actors[2].requires_human_confirmation);
        assert_eq!(orch.session().max_rounds(), 100);
    }
}
