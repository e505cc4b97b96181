//! 轮次选择器（Turn Selector）
//!
//! 纯函数：读取会话记录与参与者名单，决定下一个发言者或会话结束。
//! 优先级：终止标记 > 轮数上限 > 显式交接（`NEXT: <name>`）> 按声明顺序轮转。

use regex::Regex;

use crate::core::{Session, TerminationReason};

/// 默认终止标记（大小写不敏感）
pub const DEFAULT_TERMINATION_TOKEN: &str = "TERMINATE";

/// 交接指令：独占一行的 `NEXT: <actor>`，关键字大小写不敏感，名字前可带 @；名字取到行尾（可含空格与非 ASCII 字符）
const HANDOFF_PATTERN: &str = r"(?im)^[ \t]*next[ \t]*:[ \t]*@?([^\r\n]+?)[ \t]*\r?$";

/// 选择结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 下一个发言者在名单中的下标
    Next(usize),
    /// 会话结束
    End(TerminationReason),
}

/// 轮次选择器
#[derive(Debug, Clone)]
pub struct TurnSelector {
    termination_token: String,
    handoff: Regex,
}

impl Default for TurnSelector {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATION_TOKEN)
    }
}

impl TurnSelector {
    pub fn new(termination_token: &str) -> Self {
        let token = termination_token.trim();
        let token = if token.is_empty() {
            DEFAULT_TERMINATION_TOKEN
        } else {
            token
        };
        Self {
            termination_token: token.to_lowercase(),
            handoff: Regex::new(HANDOFF_PATTERN).expect("handoff pattern is a valid regex"),
        }
    }

    pub fn termination_token(&self) -> &str {
        &self.termination_token
    }

    /// 文本是否包含终止标记
    pub fn is_termination(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.termination_token)
    }

    /// 从文本中提取交接目标名（取最后一条指令）
    pub fn handoff_directive<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.handoff
            .captures_iter(text)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// 决定下一个发言者
    ///
    /// 终止标记只在最后一条消息是文本时检查；工具请求与工具结果里的内容不会结束会话。
    pub fn select_next(&self, session: &Session) -> Selection {
        let last = session.transcript().last();

        if let Some(text) = last.and_then(|m| m.text()) {
            if self.is_termination(text) {
                return Selection::End(TerminationReason::ExplicitTerminationToken);
            }
        }

        if session.round_count() >= session.max_rounds() {
            return Selection::End(TerminationReason::MaxRoundsReached);
        }

        let actors = session.actors();
        if actors.is_empty() {
            // 空名单无人可发言
            return Selection::End(TerminationReason::MaxRoundsReached);
        }

        let last_speaker = last.and_then(|m| session.actor_index(&m.sender));

        if let Some(target) = last
            .and_then(|m| m.text())
            .and_then(|text| self.handoff_directive(text))
        {
            match session.actor_index_ci(target) {
                Some(idx) if Some(idx) != last_speaker || actors.len() == 1 => {
                    tracing::debug!(target = %actors[idx].name, "explicit hand-off honored");
                    return Selection::Next(idx);
                }
                _ => {
                    tracing::warn!(target = %target, "hand-off target missing or ineligible, falling back to round-robin");
                }
            }
        }

        let next = match last_speaker {
            Some(idx) => (idx + 1) % actors.len(),
            None => 0,
        };
        Selection::Next(next)
    }
}
