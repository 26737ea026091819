//! End-to-end scenarios against the in-memory store.

use flowstate_engine::{
    ApprovalRule, EngineError, InMemoryStore, InstanceKey, Principal, StateId, StoreSession,
    Transition, TransitionFilter, TransitionStatus, WorkflowBuilder, WorkflowEngine,
    WorkflowEntity, WorkflowStore,
};
use flowstate_testing::{
    init_tracing, lead, outsider, releaser, review_workflow, reviewer, DenyAllOracle, Harness,
    Ticket,
};
use std::sync::Arc;

async fn transitions_of(store: &Arc<InMemoryStore>, key: &InstanceKey) -> Vec<Transition> {
    let mut session = store.begin(key).await.unwrap();
    session.transitions(&TransitionFilter::default()).await.unwrap()
}

#[tokio::test]
async fn ticket_lifecycle_happy_path() -> anyhow::Result<()> {
    init_tracing();
    let harness = Harness::new(review_workflow(), "T-1").await?;
    let engine = &harness.engine;
    let mut ticket = Ticket::new("T-1");

    assert_eq!(
        engine.available_states(&ticket, "status", &reviewer()).await?,
        vec![StateId::new("in_review")]
    );
    assert!(
        engine
            .available_states(&ticket, "status", &outsider())
            .await?
            .is_empty()
    );

    // Two-tier review gate: the reviewer alone does not advance the ticket.
    let first = engine.approve(&mut ticket, "status", &reviewer(), None).await?;
    assert!(!first.transitioned);
    assert_eq!(ticket.state_of("status"), Some(StateId::new("open")));

    let second = engine.approve(&mut ticket, "status", &lead(), None).await?;
    assert!(second.transitioned);
    assert_eq!(second.new_state, Some(StateId::new("in_review")));
    assert_eq!(second.approval.previous, Some(first.approval.id));

    // The review outcome is a branch; a destination must be named.
    let err = engine
        .approve(&mut ticket, "status", &lead(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AmbiguousDestination { .. }));

    let third = engine
        .approve(&mut ticket, "status", &lead(), Some(StateId::new("approved")))
        .await?;
    assert!(third.transitioned);
    assert!(!third.completed);

    let fourth = engine.approve(&mut ticket, "status", &releaser(), None).await?;
    assert!(fourth.completed);
    assert!(engine.is_on_final_state(&ticket, "status").await?);
    assert_eq!(fourth.approval.previous, Some(third.approval.id));

    // Exactly one completion scope fired, around the releasing decision.
    let completions: Vec<_> = harness
        .sink
        .sequence()
        .into_iter()
        .filter(|(_, kind)| matches!(kind, flowstate_engine::SignalKind::Completion))
        .collect();
    assert_eq!(completions.len(), 2);
    Ok(())
}

#[tokio::test]
async fn rejected_ticket_reopens_through_the_cycle() -> anyhow::Result<()> {
    init_tracing();
    let harness = Harness::new(review_workflow(), "T-2").await?;
    let engine = &harness.engine;
    let mut ticket = Ticket::new("T-2");

    engine.approve(&mut ticket, "status", &reviewer(), None).await?;
    engine.approve(&mut ticket, "status", &lead(), None).await?;
    engine
        .approve(&mut ticket, "status", &lead(), Some(StateId::new("rejected")))
        .await?;

    // Choosing the rejection branch cancels the release path.
    let transitions = transitions_of(&harness.store, &harness.key).await;
    let released = transitions
        .iter()
        .find(|t| t.destination == StateId::new("released"))
        .unwrap();
    assert_eq!(released.status, TransitionStatus::Cancelled);

    // Walking rejected -> open closes the cycle and regenerates the path.
    let reopened = engine.approve(&mut ticket, "status", &reviewer(), None).await?;
    assert_eq!(reopened.new_state, Some(StateId::new("open")));

    let transitions = transitions_of(&harness.store, &harness.key).await;
    let pending: Vec<&Transition> = transitions
        .iter()
        .filter(|t| t.status == TransitionStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 5);
    assert!(pending.iter().all(|t| t.iteration >= 3));

    // The regenerated gate works like the original one.
    let again = engine.approve(&mut ticket, "status", &reviewer(), None).await?;
    assert!(!again.transitioned);
    assert_eq!(again.approval.priority, 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_approvers_decide_exactly_once() -> anyhow::Result<()> {
    init_tracing();
    let workflow = WorkflowBuilder::new("ticket", "status", "open")
        .add_transition("open", "done", vec![ApprovalRule::new(0).permission("ticket.review")])
        .build()?;
    let harness = Harness::new(workflow, "T-3").await?;

    let mut tasks = Vec::new();
    for name in ["ana", "ben"] {
        let engine = harness.engine.clone();
        let principal = Principal::new(name).with_permission("ticket.review");
        tasks.push(tokio::spawn(async move {
            let mut ticket = Ticket::new("T-3");
            engine.approve(&mut ticket, "status", &principal, None).await
        }));
    }

    let mut successes = 0;
    let mut losers = 0;
    for task in tasks {
        match task.await? {
            Ok(outcome) => {
                assert!(outcome.transitioned);
                successes += 1;
            }
            Err(EngineError::NoAvailableApproval { .. }) => losers += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((successes, losers), (1, 1));

    let transitions = transitions_of(&harness.store, &harness.key).await;
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].status, TransitionStatus::Done);
    Ok(())
}

#[tokio::test]
async fn jump_skips_the_review_gate() -> anyhow::Result<()> {
    init_tracing();
    let harness = Harness::new(review_workflow(), "T-4").await?;
    let engine = &harness.engine;
    let mut ticket = Ticket::new("T-4");

    engine
        .jump_to(&mut ticket, "status", StateId::new("approved"))
        .await?;
    assert_eq!(ticket.state_of("status"), Some(StateId::new("approved")));

    let transitions = transitions_of(&harness.store, &harness.key).await;
    let jumped = transitions
        .iter()
        .filter(|t| t.status == TransitionStatus::Jumped)
        .count();
    assert_eq!(jumped, 3);

    // Administrative jumps are silent.
    assert!(harness.sink.events().is_empty());

    // The remaining path is live.
    let outcome = engine.approve(&mut ticket, "status", &releaser(), None).await?;
    assert!(outcome.completed);
    Ok(())
}

#[tokio::test]
async fn deny_all_oracle_blocks_every_principal() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let engine = WorkflowEngine::new(store, Arc::new(DenyAllOracle));
    engine.register(review_workflow()).await?;
    let mut ticket = Ticket::new("T-5");

    let err = engine
        .approve(&mut ticket, "status", &lead(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoAvailableApproval { .. }));
    assert!(
        engine
            .available_states(&ticket, "status", &lead())
            .await?
            .is_empty()
    );
    Ok(())
}
