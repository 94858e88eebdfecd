use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use courtside::engine::{Engine, EngineError};
use courtside::model::{day_start, ResourceUnit, TimeRange, HOUR_MS, MINUTE_MS};
use courtside::store::LocalStore;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

/// The `slot`-th one-hour slot counted from 08:00 on the first day, 14 slots per day.
fn hour_slot(slot: i64) -> TimeRange {
    let start = day_start(first_day()) + (slot / 14) * 24 * HOUR_MS + (8 + slot % 14) * HOUR_MS;
    TimeRange::new(start, start + HOUR_MS).unwrap()
}

async fn setup(engine: &Engine, courts: usize) -> Vec<ResourceUnit> {
    let facility = engine.create_facility("Bench Hall", "badminton").await.unwrap();
    let mut units = Vec::new();
    for i in 0..courts {
        units.push(engine.create_unit(facility.id, &format!("Court {i}")).await.unwrap());
    }
    println!("  created {} courts", units.len());
    units
}

async fn phase1_sequential(engine: &Engine, unit: &ResourceUnit) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine
            .create_booking(unit.id, "bench", hour_slot(i as i64), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    println!(
        "  {n} bookings in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("create_booking", &mut latencies);
}

async fn phase2_contended(engine: Arc<Engine>, units: &[ResourceUnit]) {
    let n_tasks = 16;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        let unit_id = units[i % units.len()].id;
        handles.push(tokio::spawn(async move {
            let mut confirmed = 0usize;
            let mut conflicts = 0usize;
            for j in 0..n_per_task {
                // Tasks sharing a court race for the same slots.
                match engine
                    .create_booking(unit_id, &format!("user{i}"), hour_slot(j as i64), None)
                    .await
                {
                    Ok(_) => confirmed += 1,
                    Err(EngineError::SlotConflict { .. }) => conflicts += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            (confirmed, conflicts)
        }));
    }

    let (mut confirmed, mut conflicts) = (0, 0);
    for h in handles {
        let (c, x) = h.await.unwrap();
        confirmed += c;
        conflicts += x;
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts = {total} total in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    println!("  confirmed={confirmed}, conflicts={conflicts}");
    assert_eq!(
        confirmed,
        units.len() * n_per_task,
        "every slot of every court must be confirmed exactly once"
    );
}

async fn phase3_availability_under_load(engine: Arc<Engine>, unit: &ResourceUnit) {
    let unit_id = unit.id;
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for j in 0..1000 {
                let _ = engine
                    .create_booking(unit_id, "writer", hour_slot(j), None)
                    .await;
            }
        })
    };

    let mut latencies = Vec::with_capacity(500);
    for i in 0..500u64 {
        let day = first_day() + chrono::Days::new(i % 60);
        let t = Instant::now();
        engine
            .availability_by_kind("badminton", day, 30 * MINUTE_MS)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }
    writer.await.unwrap();
    print_latency("availability_by_kind", &mut latencies);
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join("courtside_bench");
    std::fs::create_dir_all(&dir).unwrap();

    println!("=== courtside stress benchmark ===\n");

    println!("[phase 1] sequential bookings, durable store");
    let path = dir.join("phase1.wal");
    let _ = std::fs::remove_file(&path);
    let engine = Engine::new(Arc::new(LocalStore::open(&path).unwrap()));
    let units = setup(&engine, 1).await;
    phase1_sequential(&engine, &units[0]).await;

    println!("\n[phase 2] contended bookings, durable store");
    let path = dir.join("phase2.wal");
    let _ = std::fs::remove_file(&path);
    let engine = Arc::new(Engine::new(Arc::new(LocalStore::open(&path).unwrap())));
    let units = setup(&engine, 4).await;
    phase2_contended(engine, &units).await;

    println!("\n[phase 3] availability latency under write load, in memory");
    let engine = Arc::new(Engine::new(Arc::new(LocalStore::in_memory())));
    let units = setup(&engine, 8).await;
    phase3_availability_under_load(engine, &units[0]).await;

    println!("\n=== benchmark complete ===");
}
