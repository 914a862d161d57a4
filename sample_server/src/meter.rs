//! Throughput and latency bookkeeping for the frame pipeline.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

use crate::utils::median;

pub static METER: Meter = Meter::new();

/// Counters and recorded inference latencies, drained periodically by the
/// meter logger.
#[derive(Default)]
pub struct Meter {
    incoming_frames: AtomicU64,
    processed_frames: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            incoming_frames: AtomicU64::new(0),
            processed_frames: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn tick_incoming(&self) {
        self.incoming_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_processed(&self) {
        self.processed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: Duration) {
        self.latencies.lock().unwrap().push(latency);
    }

    pub fn get_reset_incoming(&self) -> u64 {
        self.incoming_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_processed(&self) -> u64 {
        self.processed_frames.swap(0, Ordering::Relaxed)
    }

    /// Drain the recorded latencies, in milliseconds.
    pub fn get_reset_latencies_ms(&self) -> Vec<f32> {
        let drained = std::mem::take(&mut *self.latencies.lock().unwrap());
        drained
            .iter()
            .map(|latency| latency.as_secs_f32() * 1000.0)
            .collect()
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let incoming_frames = METER.get_reset_incoming();
            let processed_frames = METER.get_reset_processed();
            let mut latencies_ms = METER.get_reset_latencies_ms();
            let elapsed = start.elapsed().as_secs_f32();

            if incoming_frames > 0 {
                log::info!(
                    "Incoming frames per second: {:.2}",
                    incoming_frames as f32 / elapsed
                );
            }
            if processed_frames > 0 {
                log::info!(
                    "Processed frames per second: {:.2}",
                    processed_frames as f32 / elapsed
                );
            }
            if !latencies_ms.is_empty() {
                log::info!("Median inference latency: {:.1} ms", median(&mut latencies_ms));
            }
        }
    })
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_counters_reset_on_read() {
        let meter = Meter::new();
        meter.tick_incoming();
        meter.tick_incoming();
        meter.tick_processed();

        assert_eq!(meter.get_reset_incoming(), 2);
        assert_eq!(meter.get_reset_incoming(), 0);
        assert_eq!(meter.get_reset_processed(), 1);
    }

    #[test]
    fn test_latencies_drain() {
        let meter = Meter::new();
        meter.record_latency(Duration::from_millis(10));
        meter.record_latency(Duration::from_millis(30));

        let drained = meter.get_reset_latencies_ms();
        assert_eq!(drained.len(), 2);
        assert!(meter.get_reset_latencies_ms().is_empty());
    }
}
