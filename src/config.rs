//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AGENCY__*` 覆盖（双下划线表示嵌套，如 `AGENCY__SESSION__MAX_ROUNDS=20`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::actor::selector::DEFAULT_TERMINATION_TOKEN;
use crate::actor::Role;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub session: SessionSection,
    pub llm: LlmSection,
    /// 参与者名单，按声明顺序轮转
    pub actors: Vec<ActorSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工作目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

impl AppSection {
    pub fn workspace(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// [session] 段：轮数上限、终止标记与各挂起点的等待上限（秒，0 表示不限）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_rounds: usize,
    pub termination_token: String,
    pub actor_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            termination_token: DEFAULT_TERMINATION_TOKEN.to_string(),
            actor_timeout_secs: 0,
            tool_timeout_secs: 0,
            confirmation_timeout_secs: 0,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
        }
    }
}

/// [[actors]] 项
#[derive(Debug, Clone, Deserialize)]
pub struct ActorSection {
    pub name: String,
    pub role: Role,
    /// 未配置时使用该角色在注册表中可用的全部工具
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub requires_confirmation: bool,
    /// 为空时 Admin 走控制台输入，其余角色用内置提示词
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ActorSection {
    fn new(name: &str, role: Role, requires_confirmation: bool, system_prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            role,
            tools: None,
            requires_confirmation,
            system_prompt: Some(system_prompt.to_string()),
        }
    }
}

/// 默认名单：管理员、项目经理、程序员、测试员
pub fn default_actors() -> Vec<ActorSection> {
    vec![
        ActorSection {
            name: "Admin".to_string(),
            role: Role::Admin,
            tools: None,
            requires_confirmation: false,
            system_prompt: None,
        },
        ActorSection::new(
            "Project_Manager",
            Role::Planner,
            false,
            "You are the project manager. Break the request into small tasks, assign them to \
             Coder_Agent and Tester_Agent, and keep the project context up to date with \
             update_context. Hand the turn to a specific teammate with a line `NEXT: <name>`.",
        ),
        ActorSection::new(
            "Coder_Agent",
            Role::Executor,
            true,
            "You are the software engineer. Implement the tasks assigned by Project_Manager and \
             report what you changed. Read the project context before starting.",
        ),
        ActorSection::new(
            "Tester_Agent",
            Role::Verifier,
            false,
            "You are the QA engineer. Review what Coder_Agent reports, list defects, and say \
             TERMINATE once the work is accepted.",
        ),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            session: SessionSection::default(),
            llm: LlmSection::default(),
            actors: default_actors(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 AGENCY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AGENCY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AGENCY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
