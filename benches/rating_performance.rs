//! Performance benchmarks for rating calculations and queue operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ladder_room::amqp::publisher::MockEventPublisher;
use ladder_room::matchmaking::{MatchQueue, MatchmakingManager};
use ladder_room::rating::{compute_delta, EloRatingCalculator, InMemoryPlayerStore, RatingCalculator};
use ladder_room::types::QueueKind;
use std::sync::Arc;

fn bench_rating_calculations(c: &mut Criterion) {
    let calculator = EloRatingCalculator::new();

    c.bench_function("elo_delta_equal_ratings", |b| {
        b.iter(|| compute_delta(black_box(500), black_box(500), black_box(true)))
    });

    c.bench_function("elo_delta_rating_spread", |b| {
        b.iter(|| {
            let mut total = 0;
            for gap in (-400..=400).step_by(50) {
                total += calculator.rating_delta(black_box(500 + gap), black_box(500), gap % 100 == 0);
            }
            total
        })
    });
}

fn bench_queue_operations(c: &mut Criterion) {
    let player_ids: Vec<String> = (0..1000).map(|i| format!("bench_player_{}", i)).collect();

    c.bench_function("queue_enqueue_and_pair_1000", |b| {
        b.iter(|| {
            let mut queue = MatchQueue::new(QueueKind::Ranked);
            let mut pairs = 0;
            for player_id in &player_ids {
                queue.enqueue(black_box(player_id));
                if queue.try_extract_pair().is_some() {
                    pairs += 1;
                }
            }
            pairs
        })
    });
}

fn bench_ranked_round_trip(c: &mut Criterion) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => panic!("Failed to create runtime: {}", e),
    };

    c.bench_function("ranked_join_join_report", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let manager = MatchmakingManager::new(
                    Arc::new(InMemoryPlayerStore::new()),
                    Arc::new(MockEventPublisher::new()),
                );
                let _ = manager.join_ranked("x").await;
                let _ = manager.join_ranked("y").await;
                let _ = manager.report_result("x", "y", true).await;
            })
        })
    });
}

criterion_group!(
    benches,
    bench_rating_calculations,
    bench_queue_operations,
    bench_ranked_round_trip
);
criterion_main!(benches);
