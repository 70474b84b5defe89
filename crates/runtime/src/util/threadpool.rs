use std::{
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread::{JoinHandle, available_parallelism, spawn},
};

type JobRunner<'a> = dyn Fn(*const (), usize) + Send + Sync + 'a;

/// A fixed set of worker threads. The thread calling [`ThreadPool::execute`] works as thread `0`.
pub struct ThreadPool {
    inner: Arc<Inner>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new() -> Self {
        Self::with_threads(available_parallelism().map(|x| x.get()).unwrap_or(1))
    }

    pub fn with_threads(threads: usize) -> Self {
        let inner = Arc::new(Inner::new());

        Self {
            threads: (0..threads.max(1) - 1)
                .map(|thread_idx| {
                    let inner = inner.clone();
                    spawn(move || {
                        while !inner.is_closed() {
                            if !inner.run_job(thread_idx + 1) {
                                std::thread::park();
                            }
                        }
                    })
                })
                .collect(),
            inner,
        }
    }

    pub fn num_threads(&self) -> usize {
        1 + self.threads.len()
    }

    /// Runs `func` once for every job and returns after all of them have finished.
    ///
    /// `func` receives the job and the index of the pool thread running it, in `0..num_threads()`.
    pub fn execute<'a, T: 'a + Sync>(
        &mut self,
        jobs: impl IntoIterator<Item = &'a T>,
        func: impl Fn(&'a T, usize) + Send + Sync,
    ) {
        let job_runner = |job: *const (), i: usize| {
            func(unsafe { &*(job as *const T) }, i);
        };

        self.inner.with_runner(&job_runner, || {
            let num_jobs = self
                .inner
                .push_jobs(jobs.into_iter().map(|job| job as *const _ as *const _));

            self.threads
                .iter()
                .take(num_jobs.max(1) - 1)
                .for_each(|t| t.thread().unpark());

            while self.inner.run_job(0) {}
        });
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.close();
        self.threads.iter().for_each(|t| t.thread().unpark());
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

struct Inner {
    closed: AtomicBool,
    job_list: Mutex<Vec<*const ()>>,
    job_runner: RwLock<Option<&'static JobRunner<'static>>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            job_list: Mutex::new(Vec::new()),
            job_runner: RwLock::new(None),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn pop_job(&self) -> Option<*const ()> {
        let mut stack = self.job_list.lock().unwrap();
        stack.pop()
    }

    fn push_jobs(&self, jobs: impl IntoIterator<Item = *const ()>) -> usize {
        let mut stack = self.job_list.lock().unwrap();
        stack.extend(jobs);
        stack.len()
    }

    /// Pops and runs one job. The runner lock is held while the job runs,
    /// so `with_runner` cannot return while a popped job is still in flight.
    fn run_job(&self, thread: usize) -> bool {
        let runner = self.job_runner.read().unwrap();
        match *runner {
            Some(runner) => match self.pop_job() {
                Some(job) => {
                    runner(job, thread);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn with_runner<'r>(&self, runner: &'r JobRunner<'r>, f: impl FnOnce()) {
        {
            // SAFETY: the runner is removed below, before the borrow it was created from ends
            let runner = unsafe { std::mem::transmute::<&'r JobRunner<'r>, &'static JobRunner<'static>>(runner) };
            let mut task = self.job_runner.write().unwrap();
            *task = Some(runner);
        }

        f();

        {
            let mut task = self.job_runner.write().unwrap();
            *task = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::atomic::AtomicUsize, thread, time::Duration};

    #[test]
    fn test_thread_pool() {
        let mut pool = ThreadPool::new();
        let counter = AtomicUsize::new(0);

        let data = (1..=1000).collect::<Vec<_>>();
        pool.execute(&data, |x, _| {
            thread::sleep(Duration::from_micros(50));
            counter.fetch_add(*x, Ordering::Relaxed);
        });

        assert_eq!(counter.load(Ordering::Relaxed), 500500);
    }

    #[test]
    fn thread_indices_are_in_range() {
        let mut pool = ThreadPool::with_threads(4);
        let seen = Mutex::new(HashSet::new());

        let data = (0..64).collect::<Vec<_>>();
        pool.execute(&data, |_, thread| {
            thread::sleep(Duration::from_millis(1));
            seen.lock().unwrap().insert(thread);
        });

        let seen = seen.into_inner().unwrap();
        assert!(seen.iter().all(|&thread| thread < pool.num_threads()));
        assert!(!seen.is_empty());
    }

    #[test]
    fn reuse_between_batches() {
        let mut pool = ThreadPool::with_threads(3);
        for batch in 0..10 {
            let counter = AtomicUsize::new(0);
            let data = vec![batch; 7];
            pool.execute(&data, |_, _| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
            assert_eq!(counter.load(Ordering::Relaxed), 7);
        }
    }

    #[test]
    fn single_thread_runs_inline() {
        let mut pool = ThreadPool::with_threads(1);
        assert_eq!(pool.num_threads(), 1);

        let caller = thread::current().id();
        let data = [1, 2, 3];
        pool.execute(&data, |_, index| {
            assert_eq!(index, 0);
            assert_eq!(thread::current().id(), caller);
        });
    }
}
