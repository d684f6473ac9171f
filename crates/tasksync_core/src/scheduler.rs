//! Recurring background jobs keyed by a unique work name.
//!
//! Each name owns one thread. The thread runs the job once when scheduled,
//! then every `interval`, and additionally whenever [`RecurringRunner::trigger_now`]
//! is called. Runs of one name never overlap.

use crate::error::AppError;
use crate::sync::CancelToken;
use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const SYNC_WORK_NAME: &str = "task_sync";
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub type Job = Box<dyn FnMut(&CancelToken) + Send>;

pub trait RecurringRunner {
    /// Registers `job` under `name`. An existing registration is kept and
    /// `false` is returned.
    fn schedule_periodic(
        &mut self,
        name: &str,
        interval: Duration,
        job: Job,
    ) -> Result<bool, AppError>;

    /// Requests an extra run. Requests made while one is pending collapse into it.
    fn trigger_now(&self, name: &str) -> Result<(), AppError>;

    /// Cancels in-flight runs and joins every worker thread.
    fn shutdown(&mut self);
}

/// Preconditions checked before each run; an unmet one skips that run.
pub trait RunConstraints: Send + Sync {
    fn satisfied(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoConstraints;

impl RunConstraints for NoConstraints {
    fn satisfied(&self) -> bool {
        true
    }
}

/// Met when a TCP connection to the server host can be opened.
#[derive(Debug, Clone)]
pub struct ServerReachable {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ServerReachable {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let url = crate::remote::http::parse_server_url(server_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::invalid_input("server_url has no host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AppError::invalid_input("server_url has no port"))?;
        Ok(Self {
            host,
            port,
            timeout,
        })
    }
}

impl RunConstraints for ServerReachable {
    fn satisfied(&self) -> bool {
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                log::info!("cannot resolve {}: {err}", self.host);
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Clamps a configured interval to the supported minimum.
pub fn periodic_interval(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60)).max(MIN_PERIODIC_INTERVAL)
}

#[derive(Debug, Default)]
struct SlotState {
    trigger_pending: bool,
    stopping: bool,
}

#[derive(Debug, Default)]
struct SlotSignal {
    state: Mutex<SlotState>,
    wake: Condvar,
}

impl SlotSignal {
    fn update(&self, apply: impl FnOnce(&mut SlotState)) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut state);
        self.wake.notify_all();
    }
}

struct Slot {
    signal: Arc<SlotSignal>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

enum Wakeup {
    Periodic,
    OnDemand,
    Stop,
}

/// [`RecurringRunner`] backed by one OS thread per work name.
pub struct ThreadScheduler {
    constraints: Arc<dyn RunConstraints>,
    slots: HashMap<String, Slot>,
}

impl ThreadScheduler {
    pub fn new(constraints: Arc<dyn RunConstraints>) -> Self {
        Self {
            constraints,
            slots: HashMap::new(),
        }
    }

    pub fn unconstrained() -> Self {
        Self::new(Arc::new(NoConstraints))
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}

impl RecurringRunner for ThreadScheduler {
    fn schedule_periodic(
        &mut self,
        name: &str,
        interval: Duration,
        mut job: Job,
    ) -> Result<bool, AppError> {
        if self.slots.contains_key(name) {
            log::debug!("{name} already scheduled; keeping existing work");
            return Ok(false);
        }
        if interval.is_zero() {
            return Err(AppError::invalid_input("interval must be positive"));
        }

        let signal = Arc::new(SlotSignal::default());
        let cancel = CancelToken::new();
        let constraints = Arc::clone(&self.constraints);
        let thread_signal = Arc::clone(&signal);
        let thread_cancel = cancel.clone();
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("tasksync-{name}"))
            .spawn(move || {
                let mut next_due = Instant::now();
                loop {
                    let wakeup = wait_for_wakeup(&thread_signal, next_due);
                    match wakeup {
                        Wakeup::Stop => break,
                        Wakeup::Periodic => next_due = Instant::now() + interval,
                        Wakeup::OnDemand => {}
                    }

                    if constraints.satisfied() {
                        log::debug!("running {thread_name}");
                        job(&thread_cancel);
                    } else {
                        log::info!("constraints not met; skipping {thread_name}");
                    }
                }
                log::debug!("{thread_name} stopped");
            })?;

        self.slots.insert(
            name.to_string(),
            Slot {
                signal,
                cancel,
                handle: Some(handle),
            },
        );
        Ok(true)
    }

    fn trigger_now(&self, name: &str) -> Result<(), AppError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("no work named {name}")))?;
        slot.signal.update(|state| state.trigger_pending = true);
        Ok(())
    }

    fn shutdown(&mut self) {
        for slot in self.slots.values() {
            slot.cancel.cancel();
            slot.signal.update(|state| state.stopping = true);
        }
        for (name, mut slot) in self.slots.drain() {
            if let Some(handle) = slot.handle.take()
                && handle.join().is_err()
            {
                log::error!("worker thread for {name} panicked");
            }
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn wait_for_wakeup(signal: &SlotSignal, next_due: Instant) -> Wakeup {
    let mut state = signal
        .state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    loop {
        if state.stopping {
            return Wakeup::Stop;
        }
        if state.trigger_pending {
            state.trigger_pending = false;
            return Wakeup::OnDemand;
        }
        let now = Instant::now();
        if now >= next_due {
            return Wakeup::Periodic;
        }
        state = match signal.wake.wait_timeout(state, next_due - now) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}
