// src/metrics.rs

//! Per-run resource measurement.
//!
//! Wall-clock time is measured by the runner itself. Peak resident memory is
//! sampled from a background thread with `sysinfo`, so it is best-effort:
//! short spikes between samples are missed, and if the process cannot be
//! inspected the peak is simply `None`.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, System};

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Samples the RSS of one child process until stopped or the process exits.
pub struct PeakRssSampler {
    stop: Arc<AtomicBool>,
    peak_kb: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeakRssSampler {
    pub fn start(pid: u32, every: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let peak_kb = Arc::new(AtomicU64::new(0));

        let handle = {
            let stop = Arc::clone(&stop);
            let peak_kb = Arc::clone(&peak_kb);

            thread::spawn(move || {
                let pid = Pid::from_u32(pid);
                let mut system = System::new();

                while !stop.load(Ordering::Relaxed) {
                    if !system.refresh_process(pid) {
                        break;
                    }
                    let Some(process) = system.process(pid) else {
                        break;
                    };

                    // sysinfo 0.30 reports memory in bytes
                    let kb = process.memory() / 1024;
                    peak_kb.fetch_max(kb, Ordering::Relaxed);

                    thread::sleep(every);
                }
            })
        };

        Self {
            stop,
            peak_kb,
            handle: Some(handle),
        }
    }

    /// Stop sampling and return the peak RSS in KB, if any sample was taken.
    pub fn finish(mut self) -> Option<u64> {
        self.halt();
        match self.peak_kb.load(Ordering::Relaxed) {
            0 => None,
            kb => Some(kb),
        }
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeakRssSampler {
    fn drop(&mut self) {
        self.halt();
    }
}
