//! Integration tests for Store action broadcasting
//!
//! Renderers observe the actions that effects feed back into a store (probe
//! results, timer expiries). These tests pin down what is broadcast, in which
//! order, and how cancellation and lagging receivers behave.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use promptbus_core::{
    SmallVec,
    effect::{Effect, EffectId},
    reducer::Reducer,
    smallvec,
};
use promptbus_runtime::{Store, StoreConfig, StoreError};
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start a three-step chain
    Start { id: u64 },
    /// One step of a chain finished
    Step { id: u64, step: u32 },
    /// Chain finished (terminal action)
    Done { id: u64 },
    /// Arm a cancellable timer
    Arm { id: u64, after: Duration },
    /// Cancel the timer of `id`
    Disarm { id: u64 },
    /// Timer fired
    Fired { id: u64 },
    /// Two tasks in parallel
    FanOut,
    /// Two tasks in sequence
    Sequence,
    /// Produced by fan-out / sequence
    Leaf { value: u32 },
}

#[derive(Debug, Clone, Default)]
struct TestState {
    steps: Vec<u32>,
    fired: Vec<u64>,
}

#[derive(Clone)]
struct TestEnvironment;

#[derive(Clone)]
struct TestReducer;

fn timer_id(id: u64) -> EffectId {
    EffectId::new(format!("timer-{id}"))
}

fn leaf(value: u32) -> Effect<TestAction> {
    Effect::task(async move { Some(TestAction::Leaf { value }) })
}

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::Start { id } => {
                state.steps.clear();
                smallvec![Effect::task(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(TestAction::Step { id, step: 1 })
                })]
            },
            TestAction::Step { id, step } => {
                state.steps.push(step);
                if step < 3 {
                    smallvec![Effect::task(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Some(TestAction::Step { id, step: step + 1 })
                    })]
                } else {
                    smallvec![Effect::task(async move { Some(TestAction::Done { id }) })]
                }
            },
            TestAction::Arm { id, after } => smallvec![
                Effect::Delay {
                    duration: after,
                    action: Box::new(TestAction::Fired { id }),
                }
                .cancellable(timer_id(id))
            ],
            TestAction::Disarm { id } => smallvec![Effect::Cancel(timer_id(id))],
            TestAction::Fired { id } => {
                state.fired.push(id);
                SmallVec::new()
            },
            TestAction::FanOut => smallvec![Effect::merge(vec![leaf(1), leaf(2)])],
            TestAction::Sequence => smallvec![Effect::chain(vec![leaf(1), leaf(2)])],
            TestAction::Done { .. } | TestAction::Leaf { .. } => SmallVec::new(),
        }
    }
}

fn store() -> Store<TestState, TestAction, TestEnvironment, TestReducer> {
    Store::new(TestState::default(), TestReducer, TestEnvironment)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<TestAction>) -> Vec<TestAction> {
    let mut actions = Vec::new();
    while let Ok(action) = rx.try_recv() {
        actions.push(action);
    }
    actions
}

// ============================================================================
// Tests
// ============================================================================

/// Every action fed back by a chain of effects is broadcast, in order
#[tokio::test(start_paused = true)]
async fn test_chain_is_broadcast_in_order() {
    let store = store();
    let mut rx = store.subscribe_actions();

    let mut handle = store.send_cascading(TestAction::Start { id: 7 }).await.unwrap();
    handle.wait().await;

    assert_eq!(
        drain(&mut rx),
        vec![
            TestAction::Step { id: 7, step: 1 },
            TestAction::Step { id: 7, step: 2 },
            TestAction::Step { id: 7, step: 3 },
            TestAction::Done { id: 7 },
        ]
    );
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);
}

/// Actions passed to `send` are not broadcast
#[tokio::test(start_paused = true)]
async fn test_initial_actions_not_broadcast() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(TestAction::Done { id: 1 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

/// Subscribers each get their own copy
#[tokio::test(start_paused = true)]
async fn test_multiple_independent_subscribers() {
    let store = store();
    let mut first = store.subscribe_actions();
    let mut second = store.subscribe_actions();

    let mut handle = store.send(TestAction::FanOut).await.unwrap();
    handle.wait().await;

    let mut a = drain(&mut first);
    let mut b = drain(&mut second);
    a.sort_by_key(|action| format!("{action:?}"));
    b.sort_by_key(|action| format!("{action:?}"));
    assert_eq!(a, vec![TestAction::Leaf { value: 1 }, TestAction::Leaf { value: 2 }]);
    assert_eq!(a, b);
}

/// Sequential effects feed back in declaration order
#[tokio::test(start_paused = true)]
async fn test_sequential_effects_broadcast_in_order() {
    let store = store();
    let mut rx = store.subscribe_actions();

    let mut handle = store.send(TestAction::Sequence).await.unwrap();
    handle.wait().await;

    assert_eq!(
        drain(&mut rx),
        vec![TestAction::Leaf { value: 1 }, TestAction::Leaf { value: 2 }]
    );
}

/// A delayed action is broadcast when the delay elapses
#[tokio::test(start_paused = true)]
async fn test_effect_delay_broadcasting() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store
        .send(TestAction::Arm {
            id: 3,
            after: Duration::from_secs(6),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5_999)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(rx.try_recv().unwrap(), TestAction::Fired { id: 3 });
    assert_eq!(store.state(|s| s.fired.clone()).await, vec![3]);
    assert_eq!(store.cancellable_in_flight(), 0);
}

/// A cancelled timer never produces its action
#[tokio::test(start_paused = true)]
async fn test_cancelled_delay_is_not_broadcast() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store
        .send(TestAction::Arm {
            id: 1,
            after: Duration::from_secs(6),
        })
        .await
        .unwrap();
    store
        .send(TestAction::Arm {
            id: 2,
            after: Duration::from_secs(6),
        })
        .await
        .unwrap();
    assert_eq!(store.cancellable_in_flight(), 2);

    store.send(TestAction::Disarm { id: 1 }).await.unwrap();
    // Cancelling twice is harmless
    store.send(TestAction::Disarm { id: 1 }).await.unwrap();

    tokio::time::sleep(Duration::from_secs(7)).await;

    assert_eq!(drain(&mut rx), vec![TestAction::Fired { id: 2 }]);
    assert_eq!(store.state(|s| s.fired.clone()).await, vec![2]);
}

/// A slow subscriber skips old actions but keeps receiving new ones
#[tokio::test(start_paused = true)]
async fn test_lagging_subscriber() {
    let store = Store::with_config(
        TestState::default(),
        TestReducer,
        TestEnvironment,
        StoreConfig::default().with_broadcast_capacity(2),
    );
    let mut rx = store.subscribe_actions();

    let mut handle = store.send_cascading(TestAction::Start { id: 1 }).await.unwrap();
    handle.wait().await;

    assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
    assert_eq!(rx.recv().await.unwrap(), TestAction::Step { id: 1, step: 3 });
    assert_eq!(rx.recv().await.unwrap(), TestAction::Done { id: 1 });
}

/// Direct handles do not wait for feedback effects; cascading handles do
#[tokio::test(start_paused = true)]
async fn test_cascading_handle_outlives_direct_handle() {
    let store = store();

    let mut direct = store.send(TestAction::Start { id: 1 }).await.unwrap();
    direct.wait().await;
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1]);

    // Let the rest of the first chain finish before restarting
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);

    let mut cascading = store.send_cascading(TestAction::Start { id: 2 }).await.unwrap();
    cascading.wait().await;
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![1, 2, 3]);
}

/// Waiting on a long timer with a short timeout fails with `Timeout`
#[tokio::test(start_paused = true)]
async fn test_wait_with_timeout() {
    let store = store();

    let mut handle = store
        .send(TestAction::Arm {
            id: 9,
            after: Duration::from_secs(60),
        })
        .await
        .unwrap();

    let result = handle.wait_with_timeout(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(StoreError::Timeout)));
}

/// Subscribers see the channel close once every store clone is gone
#[tokio::test(start_paused = true)]
async fn test_channel_closed_on_store_drop() {
    let store = store();
    let mut rx = store.subscribe_actions();

    drop(store);

    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
}
