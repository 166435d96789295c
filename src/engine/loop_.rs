//! 编排主循环
//!
//! 构建上下文 -> 调用模型 -> 校验 -> 分类 ->（按策略）派发请求类动作 -> 有取回信息则重新提问；
//! 否则把整批动作挂在 PlanResult 上交给调用方。跨轮状态只存在于 RoundState 中，轮数上限在 run_rounds 里统一检查。
//! 可选 event_tx：向 CLI / 前端推送 RoundStarted / Phase / Planned / Outcome / Reprompt / Failed。

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::actions::{Action, PlanKind};
use crate::config::{EngineSection, RequestPolicy};
use crate::context::{ContextBuilder, RoundInput, Session};
use crate::core::{EngineError, EnginePhase};
use crate::desktop::render_inventory;
use crate::dispatch::{ActionOutcome, DispatchReport, Dispatcher, FetchedInfo};
use crate::engine::{EngineEvent, Planner};

/// 调用方发起的一条命令
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub model: String,
    /// 会话中先前的上下文行（不持久化时为空）
    pub prior_context: Vec<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            prior_context: Vec::new(),
        }
    }

    pub fn with_prior_context(mut self, prior_context: Vec<String>) -> Self {
        self.prior_context = prior_context;
        self
    }
}

/// 循环参数（来自 [engine] 段）
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub max_rounds: usize,
    pub request_policy: RequestPolicy,
    pub include_installed_programs: bool,
}

impl From<&EngineSection> for LoopSettings {
    fn from(cfg: &EngineSection) -> Self {
        Self {
            max_rounds: cfg.max_rounds,
            request_policy: cfg.request_policy,
            include_installed_programs: cfg.include_installed_programs,
        }
    }
}

/// 一条命令的跨轮状态
#[derive(Debug, Clone)]
struct RoundState {
    command: String,
    model: String,
    prior_context: Vec<String>,
    /// 已发生的模型调用次数（含执行器续跑）
    round: usize,
    phase: EnginePhase,
    cancel: CancellationToken,
}

/// 编排器：可 Clone，内部组件以 Arc 共享，多个会话可并发规划
#[derive(Clone)]
pub struct Orchestrator {
    planner: Arc<Planner>,
    builder: Arc<ContextBuilder>,
    dispatcher: Arc<Dispatcher>,
    settings: LoopSettings,
    /// 已安装程序清单，首次需要时取一次
    inventory: Arc<OnceCell<Option<String>>>,
    event_tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

fn send_event(tx: &Option<mpsc::UnboundedSender<EngineEvent>>, ev: EngineEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        dispatcher: Dispatcher,
        settings: LoopSettings,
    ) -> Result<Self, EngineError> {
        if settings.max_rounds == 0 {
            return Err(EngineError::Configuration(
                "engine.max_rounds must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            planner: Arc::new(planner),
            builder: Arc::new(ContextBuilder::new()),
            dispatcher: Arc::new(dispatcher),
            settings,
            inventory: Arc::new(OnceCell::new()),
            event_tx: None,
        })
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> LoopSettings {
        self.settings
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 规划一条命令；规划阶段不执行任何效果类动作
    pub async fn plan_command(
        &self,
        request: CommandRequest,
        cancel: CancellationToken,
    ) -> Result<PlanResult, EngineError> {
        tracing::info!(
            command = %request.command,
            model = %request.model,
            backend = self.planner.backend(),
            "plan command"
        );
        let state = RoundState {
            command: request.command,
            model: request.model,
            prior_context: request.prior_context,
            round: 0,
            phase: EnginePhase::Idle,
            cancel,
        };
        self.advance(state, Vec::new()).await
    }

    /// 同 plan_command，但任何终止性错误都转成一个「只有错误摘要、没有动作」的 PlanResult
    pub async fn plan_or_failure(
        &self,
        request: CommandRequest,
        cancel: CancellationToken,
    ) -> PlanResult {
        self.plan_command(request, cancel)
            .await
            .unwrap_or_else(PlanResult::failed)
    }

    /// 会话入口：先前上下文取自 session，规划成功后把命令与摘要记回 session
    pub async fn plan_in_session(
        &self,
        session: &mut Session,
        command: &str,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<PlanResult, EngineError> {
        let request =
            CommandRequest::new(command, model).with_prior_context(session.prior_context());
        tracing::debug!(session = %session.id(), "plan in session");
        let plan = self.plan_command(request, cancel).await?;
        session.record(command, &plan.summary);
        Ok(plan)
    }

    /// 从给定状态继续若干轮，直到得到需要交给调用方的 PlanResult
    async fn advance(
        &self,
        state: RoundState,
        fetched: Vec<FetchedInfo>,
    ) -> Result<PlanResult, EngineError> {
        self.run_rounds(state, fetched).await.inspect_err(|e| {
            tracing::warn!(error = %e, "command terminated");
            send_event(
                &self.event_tx,
                EngineEvent::Failed {
                    error: e.to_string(),
                },
            );
        })
    }

    async fn run_rounds(
        &self,
        mut state: RoundState,
        mut fetched: Vec<FetchedInfo>,
    ) -> Result<PlanResult, EngineError> {
        loop {
            if state.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            state.round += 1;
            if state.round > self.settings.max_rounds {
                return Err(EngineError::RoundLimitExceeded {
                    max_rounds: self.settings.max_rounds,
                });
            }
            send_event(
                &self.event_tx,
                EngineEvent::RoundStarted {
                    round: state.round,
                    max_rounds: self.settings.max_rounds,
                },
            );

            self.transition(&mut state, EnginePhase::AwaitingModel);
            let facts = self.system_facts().await;
            let input = RoundInput {
                command: &state.command,
                system_facts: facts.as_deref(),
                prior_context: &state.prior_context,
                fetched: &fetched,
            };
            let messages = self.builder.build(&input);
            let response = self
                .planner
                .plan(&state.model, messages, &state.cancel)
                .await?;
            self.transition(&mut state, EnginePhase::Validating);
            self.report_usage();

            let kind = response.plan_kind();
            tracing::info!(
                round = state.round,
                actions = response.actions.len(),
                kind = ?kind,
                summary = %response.summary,
                "model planned"
            );
            send_event(
                &self.event_tx,
                EngineEvent::Planned {
                    round: state.round,
                    summary: response.summary.clone(),
                    actions: response.actions.iter().map(|a| a.id().to_string()).collect(),
                },
            );

            let eager_requests = self.settings.request_policy == RequestPolicy::Eager
                && kind == PlanKind::RequestOnly;
            if !eager_requests {
                self.transition(&mut state, EnginePhase::Terminal);
                return Ok(PlanResult::pending(
                    response.summary,
                    response.actions,
                    self.clone(),
                    state,
                ));
            }

            self.transition(&mut state, EnginePhase::Dispatching);
            let report = self.dispatch_batch(&response.actions, &state.cancel).await;
            if state.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            // 每个请求类动作（成功或失败）都产出一条 FetchedInfo，这里 fetched 非空
            self.transition(&mut state, EnginePhase::Reprompting);
            send_event(
                &self.event_tx,
                EngineEvent::Reprompt {
                    fetched: report.fetched.len(),
                },
            );
            // 本轮取回的信息只对下一轮可见
            fetched = report.fetched;
        }
    }

    /// 派发一批动作并逐条推送 Outcome 事件；取消时已完成的结果同样推送，由调用方决定是否中止
    async fn dispatch_batch(
        &self,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let report = self.dispatcher.dispatch(actions, cancel).await;
        for outcome in &report.outcomes {
            send_event(
                &self.event_tx,
                EngineEvent::Outcome {
                    outcome: outcome.clone(),
                },
            );
        }
        report
    }

    async fn system_facts(&self) -> Option<String> {
        if !self.settings.include_installed_programs {
            return None;
        }
        self.inventory
            .get_or_init(|| async {
                let programs = self.dispatcher.desktop().installed_programs().await;
                tracing::info!(count = programs.len(), "installed programs loaded");
                render_inventory(&programs)
            })
            .await
            .clone()
    }

    fn transition(&self, state: &mut RoundState, next: EnginePhase) {
        if !state.phase.can_transition_to(next) {
            tracing::warn!(from = %state.phase, to = %next, "unexpected phase transition");
        }
        tracing::debug!(round = state.round, from = %state.phase, to = %next, "phase");
        state.phase = next;
        send_event(&self.event_tx, EngineEvent::Phase { phase: next });
    }

    fn report_usage(&self) {
        let (prompt_tokens, completion_tokens, total_tokens) = self.planner.token_usage();
        if total_tokens > 0 {
            send_event(
                &self.event_tx,
                EngineEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens,
                },
            );
        }
    }
}

/// 执行器续跑所需的上下文
struct Continuation {
    orchestrator: Orchestrator,
    state: RoundState,
}

/// 一轮规划交给调用方的结果：摘要、计划动作与一次性执行器
pub struct PlanResult {
    pub summary: String,
    pub actions: Vec<Action>,
    /// 待执行的动作；执行一次后取走
    pending: Option<Vec<Action>>,
    outcomes: Vec<ActionOutcome>,
    error: Option<EngineError>,
    continuation: Option<Continuation>,
}

impl fmt::Debug for PlanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanResult")
            .field("summary", &self.summary)
            .field("actions", &self.actions)
            .field("pending", &self.pending.is_some())
            .field("outcomes", &self.outcomes)
            .field("error", &self.error)
            .field("round", &self.round())
            .finish()
    }
}

impl PlanResult {
    fn pending(
        summary: String,
        actions: Vec<Action>,
        orchestrator: Orchestrator,
        state: RoundState,
    ) -> Self {
        Self {
            summary,
            pending: Some(actions.clone()),
            actions,
            outcomes: Vec::new(),
            error: None,
            continuation: Some(Continuation {
                orchestrator,
                state,
            }),
        }
    }

    /// 终止性错误的展示形态：摘要说明错误，没有动作，执行器什么也不做
    pub fn failed(error: EngineError) -> Self {
        Self {
            summary: error.user_message(),
            actions: Vec::new(),
            pending: None,
            outcomes: Vec::new(),
            error: Some(error),
            continuation: None,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// 执行器是否还有待执行的动作
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// 最近一次执行的各动作结果
    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    /// 产生该结果时已用的轮数
    pub fn round(&self) -> usize {
        self.continuation.as_ref().map(|c| c.state.round).unwrap_or(0)
    }

    /// 执行挂起的动作（只执行一次）
    ///
    /// 若派发产出了取回信息则继续循环并返回下一个 PlanResult；否则返回 None 表示命令已完成。
    /// 再次调用不会重复派发，直接返回 None。
    /// 派发中途被取消时返回 Cancelled，但已完成动作的结果仍保存在 outcomes() 中。
    pub async fn execute(&mut self) -> Result<Option<PlanResult>, EngineError> {
        let Some(actions) = self.pending.take() else {
            return Ok(None);
        };
        let Some(Continuation {
            orchestrator,
            mut state,
        }) = self.continuation.take()
        else {
            return Ok(None);
        };
        if actions.is_empty() {
            return Ok(None);
        }

        orchestrator.transition(&mut state, EnginePhase::Dispatching);
        let report = orchestrator.dispatch_batch(&actions, &state.cancel).await;
        self.outcomes = report.outcomes;
        if state.cancel.is_cancelled() {
            let error = EngineError::Cancelled;
            tracing::warn!(error = %error, "command terminated");
            send_event(
                &orchestrator.event_tx,
                EngineEvent::Failed {
                    error: error.to_string(),
                },
            );
            return Err(error);
        }
        if report.fetched.is_empty() {
            orchestrator.transition(&mut state, EnginePhase::Terminal);
            return Ok(None);
        }

        orchestrator.transition(&mut state, EnginePhase::Reprompting);
        send_event(
            &orchestrator.event_tx,
            EngineEvent::Reprompt {
                fetched: report.fetched.len(),
            },
        );
        orchestrator.advance(state, report.fetched).await.map(Some)
    }

    /// 同 execute，但终止性错误转成失败形态的 PlanResult
    pub async fn execute_or_failure(&mut self) -> Option<PlanResult> {
        match self.execute().await {
            Ok(next) => next,
            Err(e) => Some(PlanResult::failed(e)),
        }
    }
}
