//! 编排循环：主控状态机
//!
//! 每个会话在一个异步任务上严格顺序地推进回合：选择发言者 → 等待决策 → 记录文本或分发工具 → 回合数加一。
//! 挂起点（决策、确认）可被取消；工具处理器一旦开始执行就不会被打断。
//! 结束时合成一行结论并导出 SessionSummary。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::{Action, Decider, Selection, TurnSelector};
use crate::core::session_supervisor::bounded;
use crate::core::{
    AgencyError, LoopState, Session, SessionEvent, SessionSummary, TerminationReason,
};
use crate::memory::{SessionExporter, ToolInvocation, ToolOutcome};
use crate::tools::{DispatchError, ToolContext, ToolDispatcher};

/// 回合提前结束会话的原因
enum TurnEnd {
    Cancelled,
    Fatal(String),
}

fn emit(events: &Option<mpsc::UnboundedSender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// 会话编排器：独占 Session，由 SessionBuilder 构建
pub struct Orchestrator {
    pub(crate) session: Session,
    pub(crate) deciders: Vec<Arc<dyn Decider>>,
    pub(crate) selector: TurnSelector,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) tool_ctx: ToolContext,
    pub(crate) exporter: SessionExporter,
    pub(crate) cancel: CancellationToken,
    pub(crate) actor_timeout: Option<Duration>,
    pub(crate) events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl Orchestrator {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn tool_context(&self) -> &ToolContext {
        &self.tool_ctx
    }

    /// 运行到终止；task 不为空时作为第一个 Actor 的开场发言（占第 1 回合，max_rounds 为 0 时忽略）
    pub async fn run(mut self, task: Option<&str>) -> Result<SessionSummary, AgencyError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        tracing::info!(
            session = %self.session.id(),
            actors = self.session.actors().len(),
            max_rounds = self.session.max_rounds(),
            "session started"
        );

        let task = task.filter(|_| self.session.max_rounds() > 0);
        if let (Some(task), Some(first)) = (task, self.session.actors().first()) {
            let name = first.name.clone();
            emit(
                &self.events,
                SessionEvent::TurnStarted {
                    round: 1,
                    actor: name.clone(),
                },
            );
            self.session.transcript_mut().push_text(&name, task);
            self.emit_last(1);
            self.session.complete_round();
        }

        let mut fatal = None;
        let reason = loop {
            if self.cancel.is_cancelled() {
                break TerminationReason::OperatorCancelled;
            }
            let idx = match self.selector.select_next(&self.session) {
                Selection::Next(idx) => idx,
                Selection::End(reason) => break reason,
            };
            match self.take_turn(idx).await {
                Ok(()) => {}
                Err(TurnEnd::Cancelled) => break TerminationReason::OperatorCancelled,
                Err(TurnEnd::Fatal(detail)) => {
                    tracing::error!(session = %self.session.id(), error = %detail, "fatal storage failure");
                    fatal = Some(detail.clone());
                    break TerminationReason::StorageFailure(detail);
                }
            }
        };

        self.session.set_state(LoopState::Terminated(reason.clone()));
        emit(
            &self.events,
            SessionEvent::Terminated {
                reason: reason.clone(),
                rounds: self.session.round_count(),
            },
        );
        tracing::info!(
            session = %self.session.id(),
            reason = %reason,
            rounds = self.session.round_count(),
            "session terminated"
        );

        let summary = SessionSummary {
            session_id: self.session.id().to_string(),
            outcome: self.outcome_line(&reason),
            reason,
            round_count: self.session.round_count(),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            fatal,
            transcript: self.session.transcript().messages().to_vec(),
        };
        self.exporter.export(&summary).await?;
        Ok(summary)
    }

    async fn take_turn(&mut self, idx: usize) -> Result<(), TurnEnd> {
        let actor = self.session.actors()[idx].clone();
        let decider = self.deciders[idx].clone();
        let round = self.session.round_count() + 1;
        self.session.set_state(LoopState::Running);
        emit(
            &self.events,
            SessionEvent::TurnStarted {
                round,
                actor: actor.name.clone(),
            },
        );
        tracing::debug!(session = %self.session.id(), round, actor = %actor.name, "turn started");

        let decision = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TurnEnd::Cancelled),
            d = bounded(
                self.actor_timeout,
                decider.decide(self.session.transcript().messages(), &actor.capabilities),
            ) => d,
        };

        let action = match decision {
            Some(Ok(action)) => action,
            Some(Err(e)) => {
                tracing::warn!(actor = %actor.name, error = %e, "decision failed");
                Action::Text(format!("(no response: {})", e))
            }
            None => {
                let secs = self.actor_timeout.unwrap_or_default().as_secs_f64();
                tracing::warn!(actor = %actor.name, secs, "decision timed out");
                Action::Text(format!("(no response: timed out after {}s)", secs))
            }
        };

        let end = match action {
            Action::Text(text) => {
                self.session.transcript_mut().push_text(&actor.name, text);
                self.emit_last(1);
                None
            }
            Action::ToolRequest(invocation) => self.run_tool(&actor, invocation).await,
        };

        self.session.set_state(LoopState::Running);
        self.session.complete_round();
        match end {
            Some(end) => Err(end),
            None => Ok(()),
        }
    }

    async fn run_tool(
        &mut self,
        actor: &crate::actor::Actor,
        invocation: ToolInvocation,
    ) -> Option<TurnEnd> {
        self.session.set_state(LoopState::AwaitingTool);
        emit(
            &self.events,
            SessionEvent::ToolCall {
                actor: actor.name.clone(),
                invocation: invocation.clone(),
            },
        );

        let session = &mut self.session;
        let events = &self.events;
        let result = self
            .dispatcher
            .dispatch_with(actor, &invocation, &self.tool_ctx, &self.cancel, |state| {
                if state == LoopState::AwaitingConfirmation {
                    emit(
                        events,
                        SessionEvent::ConfirmationRequested {
                            actor: actor.name.clone(),
                            tool: invocation.tool_name.clone(),
                            invocation_id: invocation.id.clone(),
                        },
                    );
                }
                session.set_state(state);
            })
            .await;

        let (outcome, end) = match result {
            Ok(payload) => (ToolOutcome::success(&invocation.id, payload), None),
            Err(e) => {
                let end = match &e {
                    e if e.is_fatal() => Some(TurnEnd::Fatal(e.to_string())),
                    DispatchError::Cancelled => Some(TurnEnd::Cancelled),
                    _ => None,
                };
                (e.into_outcome(&invocation.id), end)
            }
        };

        emit(
            &self.events,
            SessionEvent::ToolOutcome {
                actor: actor.name.clone(),
                outcome: outcome.clone(),
            },
        );
        self.session
            .transcript_mut()
            .record_exchange(&actor.name, invocation, outcome);
        self.emit_last(2);
        end
    }

    /// 推送最后 n 条消息
    fn emit_last(&self, n: usize) {
        if self.events.is_none() {
            return;
        }
        let messages = self.session.transcript().messages();
        let start = messages.len().saturating_sub(n);
        for m in &messages[start..] {
            emit(&self.events, SessionEvent::Message { message: m.clone() });
        }
    }

    /// 一行结论：正常结束取最后一条文本消息（去掉终止标记），其余按终止原因描述
    fn outcome_line(&self, reason: &TerminationReason) -> String {
        let rounds = self.session.round_count();
        let line = match reason {
            TerminationReason::ExplicitTerminationToken => {
                let last = self
                    .session
                    .transcript()
                    .last_text()
                    .and_then(|m| m.text().map(|t| (m.sender.clone(), t.to_string())));
                match last {
                    Some((sender, text)) => {
                        let cleaned = strip_token(&text, self.selector.termination_token());
                        if cleaned.is_empty() {
                            format!("Completed after {} rounds; {} ended the session", rounds, sender)
                        } else {
                            format!("Completed after {} rounds: {}", rounds, cleaned)
                        }
                    }
                    None => format!("Completed after {} rounds", rounds),
                }
            }
            TerminationReason::MaxRoundsReached => {
                format!("Stopped after {} rounds without explicit termination", rounds)
            }
            TerminationReason::OperatorCancelled => {
                format!("Cancelled by operator after {} rounds", rounds)
            }
            TerminationReason::StorageFailure(detail) => {
                format!("Aborted after {} rounds: {}", rounds, detail)
            }
        };
        one_line(&line, 200)
    }
}

/// 大小写不敏感地移除终止标记
fn strip_token(text: &str, token: &str) -> String {
    let lower = text.to_lowercase();
    if token.is_empty() || lower.len() != text.len() {
        return text.trim().to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for (pos, _) in lower.match_indices(token) {
        out.push_str(&text[rest..pos]);
        rest = pos + token.len();
    }
    out.push_str(&text[rest..]);
    out.trim().to_string()
}

fn one_line(s: &str, max_chars: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}
