use crossbeam_channel::{Receiver, SendError, Sender};
use parking_lot::Mutex;
use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

const WORKER_THREAD_NAME: &str = "kvcore-lazyfree";

/// A unit of deferred deletion work: typically a closure owning a value, which
/// drops it when called.
pub type LazyFreeJob = Box<dyn FnOnce() + Send + 'static>;

/// A sink for deferred deletion work.
pub trait LazyFree {
    /// Queues `job` to run off the calling thread.
    fn submit(&self, job: LazyFreeJob);

    /// Returns the number of submitted jobs that have not finished yet.
    fn pending_jobs(&self) -> usize;
}

/// A [`LazyFree`] sink backed by a single background thread.
///
/// Jobs run in submission order. If a job panics, the panic is logged and the
/// worker moves on to the next job. Dropping the worker waits for the queued
/// jobs to finish.
///
/// ```rust
/// use kvcore::evict::{LazyFree, LazyFreeWorker};
///
/// let worker = LazyFreeWorker::spawn().unwrap();
/// let big = vec![0u8; 1 << 20];
/// worker.submit(Box::new(move || drop(big)));
///
/// worker.shutdown();
/// assert_eq!(worker.pending_jobs(), 0);
/// ```
pub struct LazyFreeWorker {
    sender: Mutex<Option<Sender<LazyFreeJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl LazyFreeWorker {
    /// Starts the background thread.
    pub fn spawn() -> io::Result<Self> {
        let (snd, rcv) = crossbeam_channel::unbounded();
        let pending = Arc::new(AtomicUsize::default());
        let worker_pending = Arc::clone(&pending);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_jobs(rcv, worker_pending))?;

        #[cfg(feature = "logging")]
        log::debug!("Started the lazy free worker");

        Ok(Self {
            sender: Mutex::new(Some(snd)),
            handle: Mutex::new(Some(handle)),
            pending,
        })
    }

    /// Stops accepting jobs and waits for the queued ones to finish. Jobs
    /// submitted afterwards run on the calling thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            // Job panics are caught inside the worker, so it only fails to join
            // if the thread itself died.
            let _ = handle.join();
        }
    }
}

impl LazyFree for LazyFreeWorker {
    fn submit(&self, job: LazyFreeJob) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let job = match &*self.sender.lock() {
            Some(snd) => match snd.send(job) {
                Ok(()) => return,
                Err(SendError(job)) => job,
            },
            None => job,
        };
        job();
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    fn pending_jobs(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Drop for LazyFreeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_jobs(rcv: Receiver<LazyFreeJob>, pending: Arc<AtomicUsize>) {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    for job in rcv {
        let result = catch_unwind(AssertUnwindSafe(job));
        pending.fetch_sub(1, Ordering::AcqRel);
        if let Err(_payload) = result {
            #[cfg(feature = "logging")]
            log_panic(&*_payload);
        }
    }

    #[cfg(feature = "logging")]
    log::debug!("Stopped the lazy free worker");
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static)) {
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    if let Some(m) = message {
        log::error!("A lazy free job panicked at '{m}'");
    } else {
        log::error!("A lazy free job panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::{LazyFree, LazyFreeWorker};

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn jobs_run_on_the_worker_thread() {
        let worker = LazyFreeWorker::spawn().unwrap();
        let ran = Arc::new(AtomicUsize::default());
        for _ in 0..100 {
            let ran = Arc::clone(&ran);
            worker.submit(Box::new(move || {
                assert_eq!(std::thread::current().name(), Some("kvcore-lazyfree"));
                ran.fetch_add(1, Ordering::AcqRel);
            }));
        }
        worker.shutdown();
        assert_eq!(ran.load(Ordering::Acquire), 100);
        assert_eq!(worker.pending_jobs(), 0);
    }

    #[test]
    fn a_panicking_job_does_not_stop_the_worker() {
        let worker = LazyFreeWorker::spawn().unwrap();
        let ran = Arc::new(AtomicUsize::default());
        worker.submit(Box::new(|| panic!("boom")));
        let ran2 = Arc::clone(&ran);
        worker.submit(Box::new(move || {
            ran2.fetch_add(1, Ordering::AcqRel);
        }));
        worker.shutdown();
        assert_eq!(ran.load(Ordering::Acquire), 1);
        assert_eq!(worker.pending_jobs(), 0);
    }

    #[test]
    fn jobs_run_inline_after_shutdown() {
        let worker = LazyFreeWorker::spawn().unwrap();
        worker.shutdown();
        let ran = Arc::new(AtomicUsize::default());
        let ran2 = Arc::clone(&ran);
        worker.submit(Box::new(move || {
            ran2.fetch_add(1, Ordering::AcqRel);
        }));
        assert_eq!(ran.load(Ordering::Acquire), 1);
        assert_eq!(worker.pending_jobs(), 0);
    }
}
