//! 会话：记录、名单、轮数与循环状态
//!
//! 只有编排循环持有 &mut Session；选择器与 Decider 只读。

use crate::actor::Actor;
use crate::core::LoopState;
use crate::memory::Transcript;

#[derive(Debug)]
pub struct Session {
    id: String,
    transcript: Transcript,
    actors: Vec<Actor>,
    round_count: usize,
    max_rounds: usize,
    state: LoopState,
}

impl Session {
    pub fn new(actors: Vec<Actor>, max_rounds: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcript: Transcript::new(),
            actors,
            round_count: 0,
            max_rounds,
            state: LoopState::Running,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub(crate) fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn round_count(&self) -> usize {
        self.round_count
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Terminated 为吸收态，之后的状态切换被忽略
    pub(crate) fn set_state(&mut self, state: LoopState) {
        if self.state.is_terminated() {
            return;
        }
        tracing::debug!(session = %self.id, from = ?self.state, to = ?state, "state transition");
        self.state = state;
    }

    pub(crate) fn complete_round(&mut self) {
        self.round_count += 1;
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    pub fn actor_index(&self, name: &str) -> Option<usize> {
        self.actors.iter().position(|a| a.name == name)
    }

    /// 名字大小写不敏感的查找（交接指令用），按 Unicode 小写比较
    pub fn actor_index_ci(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.actors
            .iter()
            .position(|a| a.name.to_lowercase() == wanted)
    }
}
