//! Unit tests for the subscription state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use ciborium::Value;
use rstest::{fixture, rstest};
use tokio::sync::mpsc;

use super::*;
use crate::builtin;
use crate::protocol::{Action, FrameBuilder, Header, PullSequence, StreamExhaustedError};
use crate::reactive::{HandlerError, Reactive, Signal};
use crate::registry::{HandlerKind, Registry, SubscriptionHandler};
use crate::tests::support::Gate;

struct Faulty(Signal<u8>);

impl SubscriptionHandler for Faulty {
    type Request = ();
    type Response = u8;

    async fn subscribe(
        &self,
        (): (),
        _context: &InvocationContext,
    ) -> Result<Reactive<u8>, HandlerError> {
        Ok(self.0.reactive())
    }
}

struct Harness {
    state: Arc<ConnectionState>,
    frames: mpsc::Receiver<Bytes>,
    faulty: Signal<u8>,
    gate: Gate,
}

fn harness_with_queue(capacity: usize) -> Harness {
    let faulty = Signal::new(1);
    let gate = Gate::new();
    let registry = builtin::register(Registry::builder(), Duration::from_millis(10))
        .and_then(|builder| builder.subscription("faulty", Faulty(faulty.clone())))
        .and_then(|builder| builder.subscription("gate", gate.clone()))
        .expect("register handlers")
        .build();
    let (peer, frames) = PeerSender::channel(capacity);
    Harness {
        state: ConnectionState::new(1, peer, HandlerRouter::new(registry)),
        frames,
        faulty,
        gate,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with_queue(64)
}

fn encode(action: Action, id: &str, handler: &str, chunks: &[Value]) -> Bytes {
    let header = Header::new(id, action).with_handler(handler);
    chunks
        .iter()
        .try_fold(FrameBuilder::new(&header).expect("header"), |frame, chunk| {
            frame.chunk(chunk)
        })
        .expect("encode frame")
        .finish()
}

async fn subscribe(
    state: &Arc<ConnectionState>,
    id: &str,
    handler: &str,
    chunks: &[Value],
) -> Result<Transition, GatewayError> {
    let raw = encode(Action::Subscribe, id, handler, chunks);
    let frame = InboundFrame::read(PullSequence::from_bytes(raw.clone()))
        .await
        .expect("read frame");
    state.subscribe(frame, raw).await
}

async fn next_frame(frames: &mut mpsc::Receiver<Bytes>) -> (Header, Option<Value>) {
    let bytes = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("frame within timeout")
        .expect("peer queue open");
    let mut pull = PullSequence::from_bytes(bytes);
    let header = Header::from_value(pull.pull().await.expect("header")).expect("decode header");
    let value = pull.pull().await.ok();
    (header, value)
}

async fn settle(state: &ConnectionState, loops: usize) {
    for _ in 0..1_000 {
        if state.running_push_loops() == loops {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {loops} push loops, found {}",
        state.running_push_loops()
    );
}

fn count_closes(context: &InvocationContext) -> Arc<AtomicUsize> {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    context.scope().add_finalizer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    closes
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

#[rstest]
#[tokio::test]
async fn subscribe_installs_state_and_pushes_updates(mut harness: Harness) {
    let transition = subscribe(&harness.state, "s1", "ping", &[])
        .await
        .expect("subscribe");
    assert_eq!(transition, Transition::Installed);

    let (header, value) = next_frame(&mut harness.frames).await;
    assert_eq!(header.action(), Action::Update);
    assert_eq!(header.id(), "s1");
    assert_eq!(header.handler(), Some("ping"));
    assert_eq!(value, Some(Value::Text("pong".to_owned())));
    assert_eq!(harness.state.len().await, 1);
}

#[rstest]
#[tokio::test]
async fn failed_subscribes_leave_no_state(harness: Harness) {
    let error = subscribe(&harness.state, "s1", "missing", &[])
        .await
        .expect_err("unknown handler");
    assert_eq!(
        error,
        GatewayError::handler_not_found(HandlerKind::Subscription, "missing")
    );
    assert!(harness.state.is_empty().await);
    assert_eq!(harness.state.running_push_loops(), 0);
}

#[rstest]
#[tokio::test]
async fn concurrent_duplicates_install_one_push_loop(harness: Harness) {
    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let state = Arc::clone(&harness.state);
            tokio::spawn(async move { subscribe(&state, "dup", "counter", &[]).await })
        })
        .collect();
    let mut installed = 0;
    for attempt in attempts {
        match attempt.await.expect("join").expect("subscribe") {
            Transition::Installed => installed += 1,
            Transition::Replaced => {}
            other => panic!("unexpected transition {other}"),
        }
    }
    assert_eq!(installed, 1);
    assert_eq!(harness.state.len().await, 1);
    settle(&harness.state, 1).await;
}

#[rstest]
#[tokio::test]
async fn resubscribe_replaces_the_context_and_closes_the_old_one_once(mut harness: Harness) {
    subscribe(&harness.state, "s1", "echo", &[int(1)])
        .await
        .expect("first subscribe");
    let (_, first) = next_frame(&mut harness.frames).await;
    assert_eq!(first, Some(int(1)));

    let original = harness.state.context("s1").await.expect("first context");
    let closes = count_closes(&original);

    let transition = subscribe(&harness.state, "s1", "echo", &[int(2)])
        .await
        .expect("second subscribe");
    assert_eq!(transition, Transition::Replaced);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!original.close());

    let current = harness.state.context("s1").await.expect("second context");
    assert!(!Arc::ptr_eq(&current, &original));

    let (header, second) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "s1");
    assert_eq!(second, Some(int(2)));
    settle(&harness.state, 1).await;
    assert!(harness.frames.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn invalid_resubscribe_keeps_the_running_subscription(mut harness: Harness) {
    subscribe(&harness.state, "s1", "echo", &[int(1)])
        .await
        .expect("first subscribe");
    next_frame(&mut harness.frames).await;
    let original = harness.state.context("s1").await.expect("context");

    let error = subscribe(&harness.state, "s1", "echo", &[])
        .await
        .expect_err("missing chunk");
    assert_eq!(
        error,
        GatewayError::StreamExhausted(StreamExhaustedError { pulled: 0 })
    );

    let current = harness.state.context("s1").await.expect("context kept");
    assert!(Arc::ptr_eq(&current, &original));
    assert!(!original.scope().is_closed());
}

#[rstest]
#[tokio::test]
async fn unsubscribing_an_unknown_id_is_a_no_op(harness: Harness) {
    assert_eq!(harness.state.unsubscribe("ghost").await, Transition::Ignored);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unsubscribe_stops_clock_updates(mut harness: Harness) {
    subscribe(&harness.state, "s1", "clock", &[])
        .await
        .expect("subscribe");
    let (_, first) = next_frame(&mut harness.frames).await;
    let (_, second) = next_frame(&mut harness.frames).await;
    assert_eq!((first, second), (Some(int(0)), Some(int(1))));

    let context = harness.state.context("s1").await.expect("context");
    assert_eq!(harness.state.unsubscribe("s1").await, Transition::Removed);
    assert!(context.scope().is_closed());
    assert!(harness.state.is_empty().await);
    settle(&harness.state, 0).await;

    while harness.frames.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.frames.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn closing_schedules_one_cleanup_per_subscription(harness: Harness) {
    for (id, handler) in [("a", "ping"), ("b", "clock"), ("c", "counter")] {
        subscribe(&harness.state, id, handler, &[])
            .await
            .expect("subscribe");
    }
    let mut contexts = Vec::new();
    for id in ["a", "b", "c"] {
        contexts.push(harness.state.context(id).await.expect("context"));
    }
    settle(&harness.state, 3).await;

    assert_eq!(harness.state.close().await, 3);
    assert!(harness.state.is_empty().await);
    assert!(contexts.iter().all(|context| context.scope().is_closed()));
    settle(&harness.state, 0).await;

    let refused = subscribe(&harness.state, "d", "ping", &[])
        .await
        .expect_err("closed connection");
    assert_eq!(refused, GatewayError::Cancelled);
}

#[rstest]
#[tokio::test]
async fn handler_failures_end_the_subscription(mut harness: Harness) {
    subscribe(&harness.state, "f1", "faulty", &[])
        .await
        .expect("subscribe");
    let (_, value) = next_frame(&mut harness.frames).await;
    assert_eq!(value, Some(int(1)));

    harness.faulty.fail(HandlerError::new("sensor unplugged"));
    let (header, value) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "f1");
    assert!(header.payload().contains_key("error"));
    assert_eq!(value, None);

    settle(&harness.state, 0).await;
    assert!(harness.state.is_empty().await);
}

#[tokio::test]
async fn failure_behind_a_full_queue_yields_to_a_resubscribe() {
    let mut harness = harness_with_queue(1);
    subscribe(&harness.state, "f1", "faulty", &[])
        .await
        .expect("subscribe");
    while harness.frames.is_empty() {
        tokio::task::yield_now().await;
    }

    // The loop cannot queue its error frame until the first value is read.
    harness.faulty.fail(HandlerError::new("sensor unplugged"));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let transition = subscribe(&harness.state, "f1", "counter", &[])
        .await
        .expect("resubscribe");
    assert_eq!(transition, Transition::Replaced);

    let (_, stale) = next_frame(&mut harness.frames).await;
    assert_eq!(stale, Some(int(1)));
    let (header, value) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "f1");
    assert_eq!(header.handler(), Some("counter"));
    assert!(!header.payload().contains_key("error"));
    assert_eq!(value, Some(int(0)));

    assert_eq!(harness.state.len().await, 1);
    let context = harness.state.context("f1").await.expect("replacement kept");
    assert_eq!(context.handler(), "counter");
    assert!(!context.scope().is_closed());
    settle(&harness.state, 1).await;
}

#[rstest]
#[tokio::test]
async fn resubscribing_after_a_failure_starts_afresh(mut harness: Harness) {
    subscribe(&harness.state, "f1", "faulty", &[])
        .await
        .expect("subscribe");
    next_frame(&mut harness.frames).await;
    harness.faulty.fail(HandlerError::new("sensor unplugged"));
    let (header, _) = next_frame(&mut harness.frames).await;
    assert!(header.payload().contains_key("error"));
    assert!(harness.state.is_empty().await);

    let transition = subscribe(&harness.state, "f1", "counter", &[])
        .await
        .expect("resubscribe");
    assert_eq!(transition, Transition::Installed);
    let (header, value) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "f1");
    assert_eq!(value, Some(int(0)));
    settle(&harness.state, 1).await;
    assert_eq!(harness.state.len().await, 1);
}

#[rstest]
#[tokio::test]
async fn slow_subscribes_leave_other_ids_free(mut harness: Harness) {
    let state = Arc::clone(&harness.state);
    let slow = tokio::spawn(async move { subscribe(&state, "a", "gate", &[]).await });
    harness.gate.entered().await;

    let limit = Duration::from_secs(1);
    let fast = tokio::time::timeout(limit, subscribe(&harness.state, "b", "ping", &[]))
        .await
        .expect("subscribe on b not held up")
        .expect("subscribe b");
    assert_eq!(fast, Transition::Installed);
    let (header, _) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "b");
    let removed = tokio::time::timeout(limit, harness.state.unsubscribe("b"))
        .await
        .expect("unsubscribe on b not held up");
    assert_eq!(removed, Transition::Removed);

    harness.gate.open();
    let transition = slow.await.expect("join").expect("subscribe a");
    assert_eq!(transition, Transition::Installed);
    let (header, value) = next_frame(&mut harness.frames).await;
    assert_eq!(header.id(), "a");
    assert_eq!(value, Some(Value::Text("open".to_owned())));
}

#[rstest]
#[tokio::test]
async fn in_order_applies_same_id_transitions_in_submission_order(harness: Harness) {
    let raw = encode(Action::Subscribe, "a", "gate", &[]);
    let frame = InboundFrame::read(PullSequence::from_bytes(raw.clone()))
        .await
        .expect("read frame");
    let state = Arc::clone(&harness.state);
    harness.state.in_order("a", async move {
        state.subscribe(frame, raw).await.expect("subscribe a");
    });
    let state = Arc::clone(&harness.state);
    let unsubscribed = harness.state.in_order("a", async move {
        assert_eq!(state.unsubscribe("a").await, Transition::Removed);
    });
    harness.gate.entered().await;

    harness.gate.open();
    unsubscribed.wait().await;
    assert!(harness.state.is_empty().await);
    settle(&harness.state, 0).await;
}
