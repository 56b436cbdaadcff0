//! # Controller Messenger Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Publish | fan-out to N subscribers, selector skip path |
//! | Actions | sync call, restricted call |
//! | Controllers | update with patch diff, composed propagation |

use base_controller::{BaseController, StateMetadata, StatefulComponent};
use composable_controller::{ComposableController, COMPOSABLE_CONTROLLER_NAME};
use controller_messenger::Messenger;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map, Value};

// ============================================================================
// Publish fan-out
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("messenger-publish");

    for subscribers in [1usize, 10, 100] {
        let messenger = Messenger::new();
        for _ in 0..subscribers {
            messenger.subscribe("Bench:tick", |payload| {
                black_box(payload.len());
                Ok(())
            });
        }

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("fan_out", subscribers),
            &messenger,
            |b, messenger| b.iter(|| black_box(messenger.publish("Bench:tick", vec![json!(1)]))),
        );
    }

    let messenger = Messenger::new();
    for _ in 0..100 {
        messenger.subscribe_with_selector(
            "Bench:tick",
            |payload| payload[0]["count"].clone(),
            |_| Ok(()),
        );
    }
    let payload = vec![json!({"count": 1, "other": "x"})];
    group.bench_function("selector_skip_100", |b| {
        b.iter(|| black_box(messenger.publish("Bench:tick", payload.clone())))
    });

    group.finish();
}

// ============================================================================
// Action calls
// ============================================================================

fn bench_actions(c: &mut Criterion) {
    let mut group = c.benchmark_group("messenger-actions");

    let messenger = Messenger::new();
    messenger
        .register_action_handler("Bench:echo", |args| Ok(args.first().cloned().unwrap_or_default()))
        .expect("register");
    let view = messenger.get_restricted("Caller", ["Bench:echo"], Vec::<String>::new());

    group.bench_function("call_sync", |b| {
        b.iter(|| {
            let call = messenger.call("Bench:echo", vec![json!(7)]).expect("call");
            black_box(call.now_or_never())
        })
    });

    group.bench_function("call_restricted", |b| {
        b.iter(|| {
            let call = view.call("Bench:echo", vec![json!(7)]).expect("call");
            black_box(call.now_or_never())
        })
    });

    group.finish();
}

// ============================================================================
// Controller updates
// ============================================================================

fn bench_controllers(c: &mut Criterion) {
    let mut group = c.benchmark_group("controllers");

    let messenger = Messenger::new();
    let view = messenger.get_restricted("Tokens", Vec::<String>::new(), Vec::<String>::new());
    let tokens: Vec<_> = (0..100).map(|i| json!({"address": i, "balance": 0})).collect();
    let controller = BaseController::new(view, json!({"tokens": tokens}), StateMetadata::new())
        .expect("controller");

    let mut balance = 0u64;
    group.bench_function("update_with_diff_100_tokens", |b| {
        b.iter(|| {
            balance += 1;
            black_box(
                controller
                    .update(|state| state["tokens"][50]["balance"] = json!(balance))
                    .expect("update"),
            )
        })
    });

    let messenger = Messenger::new();
    let children: Vec<_> = (0..10)
        .map(|i| {
            let view = messenger.get_restricted(
                format!("Child{i}"),
                Vec::<String>::new(),
                Vec::<String>::new(),
            );
            let mut state = Map::new();
            state.insert(format!("value{i}"), json!(0));
            BaseController::new(view, Value::Object(state), StateMetadata::new()).expect("child")
        })
        .collect();
    let components: Vec<StatefulComponent> =
        children.iter().cloned().map(StatefulComponent::from).collect();
    let view = messenger.get_restricted(
        COMPOSABLE_CONTROLLER_NAME,
        Vec::<String>::new(),
        ComposableController::required_events(&components),
    );
    let composable = ComposableController::new(components, view).expect("composable");

    let mut tick = 0u64;
    group.bench_function("composed_propagation_10_children", |b| {
        b.iter(|| {
            tick += 1;
            children[3]
                .update(|state| state["value3"] = json!(tick))
                .expect("update");
            black_box(composable.flat_state().len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_publish, bench_actions, bench_controllers);

criterion_main!(benches);
