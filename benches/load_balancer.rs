#![allow(clippy::all)]
//! Benchmarks for the provider balancer.
//!
//! Tests: scheduler selection (round-robin, random) with mixed availability,
//! availability event application, registration churn, facade dispatch.

mod common;
use common::generators;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use provider_balancer::config::HeartbeatConfig;
use provider_balancer::event::{
    AvailabilityChanged, AvailabilityObserver, RegistryEvent, RegistryObserver,
};
use provider_balancer::scheduler::Scheduler;
use provider_balancer::{
    LoadBalancer, LoadBalancerConfig, Provider, SchedulerType, StaticProvider,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler with `count` nodes, every `stride`-th one unavailable.
fn make_scheduler(kind: SchedulerType, count: usize, stride: usize) -> Scheduler {
    let scheduler = Scheduler::new(kind);
    for (i, id) in generators::provider_ids(count).into_iter().enumerate() {
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::with_id(id.clone()));
        scheduler
            .on_registry_event(&RegistryEvent::registered(provider, 1))
            .unwrap();
        scheduler.on_availability_changed(&AvailabilityChanged {
            provider_id: id,
            generation: 1,
            available: i % stride != 0,
            sequence: i as u64 + 1,
        });
    }
    scheduler
}

// ---------------------------------------------------------------------------
// Strategy selection benchmarks
// ---------------------------------------------------------------------------

fn bench_round_robin(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_balancer/round_robin");

    for node_count in [3, 10, 50, 200] {
        let scheduler = make_scheduler(SchedulerType::RoundRobin, node_count, 4);

        group.bench_with_input(BenchmarkId::new("next", node_count), &node_count, |b, _| {
            b.iter(|| {
                black_box(scheduler.next().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_balancer/random");

    for node_count in [3, 10, 50, 200] {
        let scheduler = make_scheduler(SchedulerType::Random, node_count, 4);

        group.bench_with_input(BenchmarkId::new("next", node_count), &node_count, |b, _| {
            b.iter(|| {
                black_box(scheduler.next().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_availability_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_balancer/availability_events");
    let scheduler = make_scheduler(SchedulerType::RoundRobin, 100, 2);
    let ids = generators::provider_ids(100);
    let mut sequence = 1_000u64;

    group.bench_function("apply", |b| {
        b.iter(|| {
            sequence += 1;
            scheduler.on_availability_changed(&AvailabilityChanged {
                provider_id: ids[(sequence % 100) as usize].clone(),
                generation: 1,
                available: sequence % 2 == 0,
                sequence,
            });
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Facade operations
// ---------------------------------------------------------------------------

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_balancer/registration");
    let rt = common::harness::bench_runtime();

    group.bench_function("register_unregister", |b| {
        let lb = LoadBalancer::with_runtime(
            LoadBalancerConfig::with_capacity(16),
            rt.handle().clone(),
        )
        .unwrap();
        b.iter(|| {
            let provider = Arc::new(StaticProvider::new());
            let id = provider.id().to_string();
            lb.register(provider).unwrap();
            lb.unregister(&id).unwrap();
        });
    });

    for batch in [10, 100] {
        group.bench_with_input(BenchmarkId::new("register_all", batch), &batch, |b, &batch| {
            b.iter_with_setup(
                || {
                    let lb = LoadBalancer::with_runtime(
                        LoadBalancerConfig::with_capacity(batch),
                        rt.handle().clone(),
                    )
                    .unwrap();
                    let providers: Vec<Arc<dyn Provider>> = generators::provider_ids(batch)
                        .into_iter()
                        .map(|id| Arc::new(StaticProvider::with_id(id)) as Arc<dyn Provider>)
                        .collect();
                    (lb, providers)
                },
                |(lb, providers)| {
                    lb.register_all(providers).unwrap();
                    black_box(&lb);
                },
            );
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_balancer/dispatch");
    let rt = common::harness::bench_runtime();

    let config = LoadBalancerConfig::with_capacity(20).heartbeat(HeartbeatConfig::new(
        Duration::from_millis(1),
        Duration::from_millis(50),
    ));
    let lb = LoadBalancer::with_runtime(config, rt.handle().clone()).unwrap();
    for id in generators::provider_ids(20) {
        lb.register(Arc::new(StaticProvider::with_id(id))).unwrap();
    }
    rt.block_on(tokio::time::sleep(Duration::from_millis(100)));

    group.bench_function("get", |b| {
        b.iter(|| {
            black_box(lb.get().unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_round_robin,
    bench_random,
    bench_availability_events,
    bench_registration,
    bench_dispatch,
);
criterion_main!(benches);
