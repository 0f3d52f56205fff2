use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named worker threads fed through a bounded queue.
///
/// When the queue is full the submitting thread runs the job itself, so
/// nothing is ever rejected.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize, queue: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (1..=threads.max(1))
            .map(|n| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new().name(format!("{name}-{n}")).spawn(move || work(&receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        log::debug!("[pool] started {} {name} threads, queue capacity {queue}", workers.len());

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn execute<F: FnOnce() + Send + 'static>(&self, job: F) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let job: Job = Box::new(job);

        let Some(sender) = sender else {
            log::debug!("[pool] {} is shut down, running job on caller thread", self.name);
            return job();
        };

        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                log::debug!("[pool] {} queue full, running job on caller thread", self.name);
                job();
            }
            Err(TrySendError::Disconnected(job)) => job(),
        }
    }

    /// Lets queued jobs finish, then joins every worker. Later calls do nothing.
    pub fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                log::warn!("[pool] {name} exited with a panic");
            }
        }
    }
}

fn work(receiver: &Mutex<Receiver<Job>>) {
    loop {
        let next = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = next else { break };

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("[pool] job panicked on {}", thread::current().name().unwrap_or("worker"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_runs_jobs_on_workers() {
        let pool = WorkerPool::new("test-pool", 2, 8).unwrap();
        let (tx, rx) = channel();

        for i in 0..4 {
            let tx = tx.clone();
            pool.execute(move || tx.send((i, thread::current().name().map(String::from))).unwrap());
        }

        let mut seen: Vec<_> = (0..4).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        seen.sort();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(seen.iter().all(|(_, name)| name.as_deref().unwrap().starts_with("test-pool-")));
        pool.shutdown();
    }

    #[test]
    fn test_caller_runs_when_queue_full() {
        let pool = WorkerPool::new("busy-pool", 1, 1).unwrap();
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&done);
        pool.execute(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            d.fetch_add(1, Ordering::SeqCst);
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // fills the single queue slot
        let d = Arc::clone(&done);
        pool.execute(move || {
            d.fetch_add(1, Ordering::SeqCst);
        });

        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let r = Arc::clone(&ran_on);
        let d = Arc::clone(&done);
        pool.execute(move || {
            *r.lock().unwrap() = Some(thread::current().id());
            d.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(*ran_on.lock().unwrap(), Some(caller));
        assert_eq!(done.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new("panic-pool", 1, 4).unwrap();
        let (tx, rx) = channel();

        pool.execute(|| panic!("handler blew up"));
        pool.execute(move || tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new("idle-pool", 2, 2).unwrap();
        pool.shutdown();
        pool.shutdown();

        let (tx, rx) = channel();
        pool.execute(move || tx.send(thread::current().id()).unwrap());
        assert_eq!(rx.recv().unwrap(), thread::current().id());
    }
}
