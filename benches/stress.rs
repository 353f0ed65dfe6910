use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use roombook::engine::{Engine, NewBooking, NewRoom};
use roombook::model::Span;

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn bench_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roombook_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}_{}.wal", name, ulid::Ulid::new()));
    let _ = std::fs::remove_file(&path);
    path
}

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

fn booking(room_id: &str, i: i64) -> NewBooking {
    let start = i * HOUR;
    NewBooking {
        room_id: room_id.into(),
        title: format!("slot {i}"),
        start,
        end: start + HOUR,
        booked_by: "bench".into(),
        ..Default::default()
    }
}

async fn setup(engine: &Engine, n_rooms: usize) -> Vec<String> {
    let mut rooms = Vec::with_capacity(n_rooms);
    for i in 0..n_rooms {
        let id = engine
            .add_room(NewRoom {
                name: format!("Room {i}"),
                capacity: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        rooms.push(id);
    }
    println!("  created {} rooms", rooms.len());
    rooms
}

async fn phase1_sequential(engine: &Engine, room: &str) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine.create_booking(booking(room, i as i64)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(engine: &Arc<Engine>, rooms: &[String]) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        // One room per task: no conflicts, pure write contention on the WAL.
        let room = rooms[i % rooms.len()].clone();

        handles.push(tokio::spawn(async move {
            // Offset per task so two tasks sharing a room never collide.
            let base = (i as i64) * 10_000;
            for j in 0..n_per_task {
                engine.create_booking(booking(&room, base + j as i64)).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(engine: &Arc<Engine>, rooms: &[String]) {
    let read_room = rooms[0].clone();
    let write_room = rooms[1].clone();

    // Writer task: continuous booking churn in the background.
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer = {
        let engine = engine.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut i = 100_000i64;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let _ = engine.create_booking(booking(&write_room, i)).await;
                i += 1;
            }
        })
    };

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let engine = engine.clone();
        let room = read_room.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let probe = ((r * reads_per_reader + i) as i64) * HOUR;
                let t = Instant::now();
                let _ = engine.is_room_available(&room, probe, probe + HOUR, None);
                let _ = engine.room_free_windows(&room, Span::new(0, 365 * 24 * HOUR));
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = writer.await;

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_contended_slot(engine: &Arc<Engine>, room: &str) {
    // Every task fights for the same slot; exactly one should win per round.
    let n_tasks = 50;
    let n_rounds = 20;

    let start = Instant::now();
    let mut won = 0usize;

    for round in 0..n_rounds {
        let mut handles = Vec::new();
        for _ in 0..n_tasks {
            let engine = engine.clone();
            let room = room.to_string();
            handles.push(tokio::spawn(async move {
                engine
                    .create_booking(booking(&room, 500_000 + round as i64))
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "slot admitted more than one booking");
        won += winners;
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_rounds} rounds x {n_tasks} contenders: {won} admitted in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    println!("=== roombook stress benchmark ===\n");

    println!("[setup]");
    let engine = Arc::new(Engine::open(bench_wal_path("stress")).unwrap());
    let rooms = setup(&engine, 10).await;

    println!("\n[phase 1] sequential write throughput");
    phase1_sequential(&engine, &rooms[0]).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&engine, &rooms[1..]).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&engine, &rooms).await;

    println!("\n[phase 4] contended slot");
    phase4_contended_slot(&engine, &rooms[2]).await;

    println!("\n=== benchmark complete ===");
}
