/// Periodic workers. Each process runs its body at a fixed period on a dedicated named thread.
pub mod output_process;
pub mod user_input_process;
pub mod view_process;

use core::mem;
use core::ops::ControlFlow;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Body of a periodic worker. Returning `ControlFlow::Break` ends the worker's loop.
pub trait Process: Send + 'static {
    fn process(&mut self) -> ControlFlow<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    Normal,
    /// SCHED_FIFO at the given level. Needs the privilege to raise scheduling priority; without
    /// it the worker logs a warning and runs at normal priority.
    Realtime(i32),
}

/// Type-erased handle the engine keeps for each worker.
pub trait Runnable: Send {
    fn name(&self) -> &str;
    fn run(&mut self);
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

enum Worker<P> {
    Idle(P),
    Running {
        handle: JoinHandle<P>,
        stop: Arc<AtomicBool>,
    },
    // thread panicked or never started, taking the process with it
    Lost,
}

pub struct PeriodicProcess<P: Process> {
    name: String,
    period: Duration,
    priority: Priority,
    worker: Worker<P>,
}

impl<P: Process> PeriodicProcess<P> {
    pub fn new(name: &str, period: Duration, process: P) -> PeriodicProcess<P> {
        PeriodicProcess {
            name: name.into(),
            period,
            priority: Priority::Normal,
            worker: Worker::Idle(process),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> PeriodicProcess<P> {
        self.priority = priority;
        self
    }

    /// Start the worker thread. Does nothing if it is already running.
    pub fn run(&mut self) {
        let mut process = match mem::replace(&mut self.worker, Worker::Lost) {
            Worker::Idle(process) => process,
            running @ Worker::Running { .. } => {
                self.worker = running;
                return;
            }
            Worker::Lost => {
                warn!("[{}] cannot run, worker was lost", self.name);
                return;
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_requested = stop.clone();
        let name = self.name.clone();
        let period = self.period;
        let priority = self.priority;
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                apply_priority(&name, priority);
                debug!("[{}] started", name);
                while !stop_requested.load(Ordering::Acquire) {
                    if process.process().is_break() {
                        info!("[{}] finished", name);
                        break;
                    }
                    thread::sleep(period);
                }
                process
            });
        match spawned {
            Ok(handle) => self.worker = Worker::Running { handle, stop },
            Err(error) => error!("[{}] could not spawn thread: {}", self.name, error),
        }
    }

    /// Signal the worker and wait for it to finish. Safe to call at any time.
    pub fn stop(&mut self) {
        match mem::replace(&mut self.worker, Worker::Lost) {
            Worker::Running { handle, stop } => {
                stop.store(true, Ordering::Release);
                match handle.join() {
                    Ok(process) => {
                        debug!("[{}] stopped", self.name);
                        self.worker = Worker::Idle(process);
                    }
                    Err(_) => error!("[{}] worker panicked", self.name),
                }
            }
            other => self.worker = other,
        }
    }

    pub fn is_running(&self) -> bool {
        match &self.worker {
            Worker::Running { handle, .. } => !handle.is_finished(),
            _ => false,
        }
    }
}

impl<P: Process> Runnable for PeriodicProcess<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) {
        PeriodicProcess::run(self)
    }

    fn stop(&mut self) {
        PeriodicProcess::stop(self)
    }

    fn is_running(&self) -> bool {
        PeriodicProcess::is_running(self)
    }
}

impl<P: Process> Drop for PeriodicProcess<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
fn apply_priority(name: &str, priority: Priority) {
    let Priority::Realtime(level) = priority else {
        return;
    };
    // sched_param has private padding fields on some libcs
    let mut param: libc::sched_param = unsafe { mem::zeroed() };
    param.sched_priority = level;
    let result = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if result == 0 {
        debug!("[{}] running at realtime priority {}", name, level);
    } else {
        warn!(
            "[{}] could not set realtime priority {}: {}",
            name,
            level,
            std::io::Error::from_raw_os_error(result)
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(name: &str, priority: Priority) {
    if let Priority::Realtime(level) = priority {
        warn!("[{}] realtime priority {} unsupported on this platform", name, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        count: Arc<AtomicUsize>,
        limit: Option<usize>,
    }

    impl Process for Counter {
        fn process(&mut self) -> ControlFlow<()> {
            let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            match self.limit {
                Some(limit) if count >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    fn counter(limit: Option<usize>) -> (Arc<AtomicUsize>, PeriodicProcess<Counter>) {
        let count = Arc::new(AtomicUsize::new(0));
        let process = PeriodicProcess::new(
            "counter",
            Duration::from_millis(1),
            Counter {
                count: count.clone(),
                limit,
            },
        );
        (count, process)
    }

    #[test]
    fn periodic_process_should_run_until_stopped() {
        let (count, mut process) = counter(None);
        process.run();
        assert!(process.is_running());
        thread::sleep(Duration::from_millis(50));
        process.stop();
        assert!(!process.is_running());
        let stopped_at = count.load(Ordering::SeqCst);
        assert!(stopped_at > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(stopped_at, count.load(Ordering::SeqCst));
    }

    #[test]
    fn periodic_process_should_tolerate_repeated_run_and_stop() {
        let (count, mut process) = counter(None);
        process.stop();
        process.run();
        process.run();
        thread::sleep(Duration::from_millis(10));
        process.stop();
        process.stop();
        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn periodic_process_should_restart_after_stop() {
        let (count, mut process) = counter(None);
        process.run();
        thread::sleep(Duration::from_millis(10));
        process.stop();
        let first_run = count.load(Ordering::SeqCst);
        process.run();
        thread::sleep(Duration::from_millis(10));
        process.stop();
        assert!(count.load(Ordering::SeqCst) > first_run);
    }

    #[test]
    fn periodic_process_should_end_when_body_breaks() {
        let (count, mut process) = counter(Some(3));
        process.run();
        thread::sleep(Duration::from_millis(50));
        assert!(!process.is_running());
        assert_eq!(3, count.load(Ordering::SeqCst));
        process.stop();
    }

    #[test]
    fn realtime_priority_failure_should_not_stop_worker() {
        let (count, process) = counter(None);
        let mut process = process.with_priority(Priority::Realtime(90));
        process.run();
        thread::sleep(Duration::from_millis(20));
        drop(process);
        assert!(count.load(Ordering::SeqCst) > 0);
    }
}
