//! Single-use policy chains.
//!
//! A [`PolicyChain`] runs the policies of one request phase in sequence. It
//! starts in [`ChainState::NotStarted`], moves to [`ChainState::Running`] and
//! ends in [`ChainState::Completed`] (including interrupts) or
//! [`ChainState::Failed`]. A failure stops the chain; the response the failing
//! policy left in place is kept as is.

use hermes_core::{
    ChainOutcome, ExecutionContext, ExecutionPhase, GatewayError, HookChain, UnitOutcome,
};
use http::header::{HeaderValue, CONNECTION};
use std::sync::Arc;

use crate::policy::Policy;

/// Lifecycle of a [`PolicyChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Built, not executed yet.
    NotStarted,
    /// Executing policies.
    Running,
    /// Every policy continued, or one interrupted.
    Completed,
    /// A policy failed.
    Failed,
}

/// Iteration order of a chain relative to resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainOrder {
    /// Resolution order, for inbound phases.
    Ordered,
    /// Reverse resolution order, for outbound phases.
    Reversed,
}

impl ChainOrder {
    /// Returns the order used for `phase`.
    #[must_use]
    pub const fn for_phase(phase: ExecutionPhase) -> Self {
        if phase.is_inbound() {
            Self::Ordered
        } else {
            Self::Reversed
        }
    }
}

/// Forward-only position over the chain's policies.
#[derive(Debug)]
struct Cursor {
    position: usize,
    len: usize,
}

impl Cursor {
    const fn new(len: usize) -> Self {
        Self { position: 0, len }
    }

    const fn has_next(&self) -> bool {
        self.position < self.len
    }

    fn advance(&mut self) -> Option<usize> {
        self.has_next().then(|| {
            self.position += 1;
            self.position - 1
        })
    }
}

/// Applies the connection signal at a chain entry point.
///
/// Returns false when the client is gone and the chain must not start. A
/// draining connection only marks the response with `connection: close`.
pub(crate) fn observe_connection(ctx: &mut ExecutionContext, chain: &str) -> bool {
    let signal = ctx.connection().clone();
    if signal.is_disconnected() {
        tracing::debug!(%chain, request_id = %ctx.request_id(), "client disconnected, chain skipped");
        return false;
    }
    if signal.is_draining() {
        ctx.response_mut()
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
    }
    true
}

/// An ephemeral chain of policies for one request phase.
///
/// # Example
///
/// ```
/// use hermes_core::fixtures::{self, JsonLiteralBackend};
/// use hermes_core::{ExecutionPhase, UnitOutcome};
/// use hermes_policy::{ChainOrder, ChainState, FnPolicy, Policy, PolicyChain};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let policies: Vec<Arc<dyn Policy>> = vec![
///     Arc::new(FnPolicy::new("a", |ctx, _| { ctx.set_attribute("a", "1"); Ok(UnitOutcome::Continue) })),
/// ];
/// let mut chain = PolicyChain::new("api", ExecutionPhase::Request, policies, ChainOrder::Ordered);
/// let mut ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));
///
/// assert!(chain.execute(&mut ctx).await.is_completed());
/// assert_eq!(chain.state(), ChainState::Completed);
/// assert_eq!(ctx.attribute("a"), Some("1"));
/// # });
/// ```
pub struct PolicyChain {
    id: String,
    phase: ExecutionPhase,
    policies: Vec<Arc<dyn Policy>>,
    cursor: Cursor,
    state: ChainState,
    hooks: HookChain,
}

impl PolicyChain {
    /// Builds a chain; `order` decides whether `policies` run as given or reversed.
    pub fn new(
        id: impl Into<String>,
        phase: ExecutionPhase,
        mut policies: Vec<Arc<dyn Policy>>,
        order: ChainOrder,
    ) -> Self {
        if order == ChainOrder::Reversed {
            policies.reverse();
        }
        Self {
            id: id.into(),
            phase,
            cursor: Cursor::new(policies.len()),
            policies,
            state: ChainState::NotStarted,
            hooks: HookChain::new(),
        }
    }

    /// Builds a chain that completes without running anything.
    pub fn noop(id: impl Into<String>, phase: ExecutionPhase) -> Self {
        Self::new(id, phase, Vec::new(), ChainOrder::Ordered)
    }

    /// Attaches hooks observing every policy.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the chain id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the phase the chain runs on.
    pub const fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Returns the current state.
    pub const fn state(&self) -> ChainState {
        self.state
    }

    /// Returns the number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true for a no-op chain.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns the policy ids in execution order.
    pub fn policy_ids(&self) -> Vec<&str> {
        self.policies.iter().map(|policy| policy.id()).collect()
    }

    /// Runs the chain to its end.
    ///
    /// A chain runs once; executing it again yields a failure without
    /// touching the context.
    pub async fn execute(&mut self, ctx: &mut ExecutionContext) -> ChainOutcome {
        if self.state != ChainState::NotStarted {
            return ChainOutcome::Failed(GatewayError::internal(format!(
                "policy chain '{}' already executed",
                self.id
            )));
        }
        if !observe_connection(ctx, &self.id) {
            ctx.interrupt();
            self.state = ChainState::Completed;
            return ChainOutcome::Interrupted(None);
        }

        self.state = ChainState::Running;
        while let Some(index) = self.cursor.advance() {
            let policy = Arc::clone(&self.policies[index]);
            let unit = self.hooks.start(policy.id(), ctx, self.phase);
            let result = policy.execute(ctx, self.phase).await;
            unit.finish(ctx, &result);

            match result {
                Ok(UnitOutcome::Continue) => {}
                Ok(UnitOutcome::Interrupt) => {
                    ctx.interrupt();
                    self.state = ChainState::Completed;
                    return ChainOutcome::Interrupted(None);
                }
                Ok(UnitOutcome::InterruptWith(failure)) => {
                    ctx.interrupt_with(failure.clone());
                    self.state = ChainState::Completed;
                    return ChainOutcome::Interrupted(Some(failure));
                }
                Err(error) => {
                    self.fail(ctx, policy.id(), &error);
                    return ChainOutcome::Failed(error);
                }
            }
        }

        self.state = ChainState::Completed;
        ChainOutcome::Completed
    }

    fn fail(&mut self, ctx: &ExecutionContext, policy: &str, error: &GatewayError) {
        self.state = ChainState::Failed;
        tracing::error!(
            chain = %self.id,
            %policy,
            phase = %self.phase,
            request_id = %ctx.request_id(),
            skipped = self.policies.len() - self.cursor.position,
            error = %error,
            "policy chain failed"
        );
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyChain")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("policies", &self.policy_ids())
            .field("state", &self.state)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FnPolicy;
    use hermes_core::fixtures::{self, JsonLiteralBackend, RecordingHook};
    use hermes_core::{ConnectionSignal, ExecutionFailure};
    use http::StatusCode;
    use parking_lot::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn journaling(name: &'static str, journal: &Journal) -> Arc<dyn Policy> {
        let journal = Arc::clone(journal);
        Arc::new(FnPolicy::new(name, move |_ctx, _phase| {
            journal.lock().push(name.to_string());
            Ok(UnitOutcome::Continue)
        }))
    }

    fn ctx() -> ExecutionContext {
        fixtures::get("/", Arc::new(JsonLiteralBackend::new()))
    }

    #[test]
    fn test_cursor_is_forward_only() {
        let mut cursor = Cursor::new(2);
        assert_eq!(cursor.advance(), Some(0));
        assert_eq!(cursor.advance(), Some(1));
        assert!(!cursor.has_next());
        assert_eq!(cursor.advance(), None);
    }

    #[tokio::test]
    async fn test_noop_chain_completes() {
        let mut chain = PolicyChain::noop("api", ExecutionPhase::Request);
        let mut ctx = ctx();

        assert!(chain.execute(&mut ctx).await.is_completed());
        assert_eq!(chain.state(), ChainState::Completed);
        assert!(!ctx.is_interrupted());
    }

    #[tokio::test]
    async fn test_reversed_order() {
        let journal = Journal::default();
        let policies = vec![
            journaling("p1", &journal),
            journaling("p2", &journal),
            journaling("p3", &journal),
        ];
        let mut chain = PolicyChain::new("api", ExecutionPhase::Response, policies, ChainOrder::Reversed);

        chain.execute(&mut ctx()).await;

        assert_eq!(*journal.lock(), vec!["p3", "p2", "p1"]);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_and_keeps_response() {
        let journal = Journal::default();
        let failing: Arc<dyn Policy> = Arc::new(FnPolicy::new("broken", |ctx, _phase| {
            *ctx.response_mut().status_mut() = StatusCode::ACCEPTED;
            Err(GatewayError::policy_execution("broken", "boom"))
        }));
        let policies = vec![journaling("p1", &journal), failing, journaling("p3", &journal)];
        let recorder = Arc::new(RecordingHook::new("rec"));
        let mut chain = PolicyChain::new("api", ExecutionPhase::Request, policies, ChainOrder::Ordered)
            .with_hooks(HookChain::new().with(recorder.clone()));
        let mut ctx = ctx();

        let outcome = chain.execute(&mut ctx).await;

        assert!(outcome.is_failed());
        assert_eq!(chain.state(), ChainState::Failed);
        assert_eq!(*journal.lock(), vec!["p1"]);
        assert_eq!(ctx.response().status(), StatusCode::ACCEPTED);
        assert_eq!(
            recorder.events(),
            vec![
                "pre:p1:request",
                "post:p1:request",
                "pre:broken:request",
                "error:broken:request",
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_with_sets_response() {
        let journal = Journal::default();
        let deny: Arc<dyn Policy> = Arc::new(FnPolicy::new("deny", |_ctx, _phase| {
            Ok(UnitOutcome::InterruptWith(
                ExecutionFailure::new(StatusCode::FORBIDDEN).key("ACCESS_DENIED"),
            ))
        }));
        let mut chain = PolicyChain::new(
            "plan",
            ExecutionPhase::Request,
            vec![deny, journaling("after", &journal)],
            ChainOrder::Ordered,
        );
        let mut ctx = ctx();

        let outcome = chain.execute(&mut ctx).await;

        assert!(outcome.is_interrupted());
        assert_eq!(chain.state(), ChainState::Completed);
        assert!(ctx.is_interrupted());
        assert_eq!(ctx.response().status(), StatusCode::FORBIDDEN);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_execution_fails() {
        let journal = Journal::default();
        let mut chain = PolicyChain::new(
            "api",
            ExecutionPhase::Request,
            vec![journaling("once", &journal)],
            ChainOrder::Ordered,
        );
        let mut ctx = ctx();

        assert!(chain.execute(&mut ctx).await.is_completed());
        assert!(chain.execute(&mut ctx).await.is_failed());
        assert_eq!(journal.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_client_skips_chain() {
        let journal = Journal::default();
        let signal = ConnectionSignal::new();
        signal.disconnect();
        let mut ctx = ExecutionContext::builder().connection(signal).build();
        let mut chain = PolicyChain::new(
            "api",
            ExecutionPhase::Request,
            vec![journaling("p1", &journal)],
            ChainOrder::Ordered,
        );

        assert!(chain.execute(&mut ctx).await.is_interrupted());
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_draining_marks_connection_close() {
        let signal = ConnectionSignal::new();
        signal.drain();
        let mut ctx = ExecutionContext::builder().connection(signal).build();
        let mut chain = PolicyChain::noop("api", ExecutionPhase::Response);

        assert!(chain.execute(&mut ctx).await.is_completed());
        assert_eq!(ctx.response().headers()[CONNECTION], "close");
    }
}
