use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Scope};

use tracing::{debug, warn};

use crate::error::{Result, StackerError};

type Task<'scope> = Box<dyn FnOnce() -> Result<()> + Send + 'scope>;

/// Runs tasks on OS threads under a budget of N orthogonal resources
/// (CPU slots, memory units, ...).
///
/// A task launches as soon as its requirement vector fits next to the
/// running tasks; otherwise it is buffered and launched first-fit, in
/// submission order, when resources are released. A CPU limit of 1 runs
/// every task inline on the submitting thread.
#[derive(Clone, Debug)]
pub struct TaskScheduler {
    limits: Vec<usize>,
    ignore_failures: bool,
}

impl TaskScheduler {
    pub fn new(limits: Vec<usize>) -> Result<Self> {
        if limits.is_empty() || limits.contains(&0) {
            return Err(StackerError::InvalidResourceRequest(format!(
                "resource limits must be non-empty and positive, got {limits:?}"
            )));
        }
        Ok(Self {
            limits,
            ignore_failures: false,
        })
    }

    /// Drop failed tasks silently instead of reporting the first failure.
    pub fn ignore_task_failures(mut self, ignore: bool) -> Self {
        self.ignore_failures = ignore;
        self
    }

    pub fn limits(&self) -> &[usize] {
        &self.limits
    }

    /// Open a task scope. Tasks may borrow anything that outlives this call;
    /// all of them have finished when `scope` returns.
    pub fn scope<'env, F, R>(&self, f: F) -> Result<R>
    where
        F: for<'scope> FnOnce(&TaskScope<'scope, 'env>) -> Result<R>,
    {
        let limits = self.limits.clone();
        let ignore_failures = self.ignore_failures;
        thread::scope(move |scope| {
            let tasks = TaskScope {
                scope,
                state: Arc::new(SchedulerState::new(limits, ignore_failures)),
            };
            let result = f(&tasks);
            let waited = tasks.wait_for_tasks();
            let value = result?;
            waited.map(|_| value)
        })
    }
}

struct SchedulerState<'scope> {
    limits: Vec<usize>,
    ignore_failures: bool,
    inner: Mutex<SchedulerInner<'scope>>,
    finished: Condvar,
}

struct SchedulerInner<'scope> {
    usage: Vec<usize>,
    running: usize,
    pending: VecDeque<(Task<'scope>, Vec<usize>)>,
    first_error: Option<StackerError>,
    failures: usize,
    draining: bool,
}

impl<'scope> SchedulerState<'scope> {
    fn new(limits: Vec<usize>, ignore_failures: bool) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                usage: vec![0; limits.len()],
                running: 0,
                pending: VecDeque::new(),
                first_error: None,
                failures: 0,
                draining: false,
            }),
            limits,
            ignore_failures,
            finished: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner<'scope>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fits(&self, inner: &SchedulerInner<'scope>, requirements: &[usize]) -> bool {
        inner
            .usage
            .iter()
            .zip(requirements)
            .zip(&self.limits)
            .all(|((used, req), limit)| used + req <= *limit)
    }

    fn record_outcome(&self, inner: &mut SchedulerInner<'scope>, outcome: Result<()>) {
        if let Err(err) = outcome {
            inner.failures += 1;
            warn!(error = %err, "Task failed");
            if !self.ignore_failures {
                inner.first_error.get_or_insert(err);
                inner.draining = true;
                inner.pending.clear();
            }
        }
    }
}

/// Handle for submitting tasks inside [`TaskScheduler::scope`].
pub struct TaskScope<'scope, 'env: 'scope> {
    scope: &'scope Scope<'scope, 'env>,
    state: Arc<SchedulerState<'scope>>,
}

impl<'scope, 'env> Clone for TaskScope<'scope, 'env> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope,
            state: Arc::clone(&self.state),
        }
    }
}

impl<'scope, 'env> TaskScope<'scope, 'env> {
    /// Launch `task` now if `requirements` fit, otherwise buffer it.
    ///
    /// Requirement vectors must match the configured dimensionality and no
    /// single requirement may exceed its limit. After a failure (unless
    /// failures are ignored) new tasks are discarded until the next
    /// [`TaskScope::wait_for_tasks`].
    pub fn submit<T>(&self, task: T, requirements: &[usize]) -> Result<()>
    where
        T: FnOnce() -> Result<()> + Send + 'scope,
    {
        let limits = &self.state.limits;
        if requirements.len() != limits.len() {
            return Err(StackerError::InvalidResourceRequest(format!(
                "expected {} resource dimensions, got {}",
                limits.len(),
                requirements.len()
            )));
        }
        if let Some(dim) = (0..limits.len()).find(|&i| requirements[i] > limits[i]) {
            return Err(StackerError::InvalidResourceRequest(format!(
                "requirement {} exceeds limit {} in dimension {}",
                requirements[dim], limits[dim], dim
            )));
        }

        if limits[0] == 1 {
            if self.state.lock().draining {
                return Ok(());
            }
            let outcome = run_task(Box::new(task));
            let mut inner = self.state.lock();
            self.state.record_outcome(&mut inner, outcome);
            return Ok(());
        }

        let mut inner = self.state.lock();
        if inner.draining {
            debug!("Discarding task submitted after a failure");
            return Ok(());
        }
        if self.state.fits(&inner, requirements) {
            reserve(&mut inner, requirements);
            drop(inner);
            self.launch(Box::new(task), requirements.to_vec());
        } else {
            inner.pending.push_back((Box::new(task), requirements.to_vec()));
        }
        Ok(())
    }

    /// Block until every submitted and buffered task has finished.
    ///
    /// Returns the first task failure unless failures are ignored, and
    /// leaves the draining state so the scope can run another batch.
    pub fn wait_for_tasks(&self) -> Result<()> {
        let mut inner = self.state.lock();
        while inner.running > 0 || (!inner.pending.is_empty() && !inner.draining) {
            inner = self
                .state
                .finished
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.pending.clear();
        inner.draining = false;
        match inner.first_error.take() {
            Some(err) if !self.state.ignore_failures => Err(err),
            _ => Ok(()),
        }
    }

    /// Number of tasks that failed so far, in both failure modes.
    pub fn failure_count(&self) -> usize {
        self.state.lock().failures
    }

    fn launch(&self, task: Task<'scope>, requirements: Vec<usize>) {
        let this = self.clone();
        self.scope.spawn(move || {
            let outcome = run_task(task);
            this.on_task_finished(&requirements, outcome);
        });
    }

    fn on_task_finished(&self, requirements: &[usize], outcome: Result<()>) {
        let mut ready = Vec::new();
        {
            let mut inner = self.state.lock();
            for (used, req) in inner.usage.iter_mut().zip(requirements) {
                *used -= req;
            }
            inner.running -= 1;
            self.state.record_outcome(&mut inner, outcome);

            if !inner.draining {
                let mut still_pending = VecDeque::with_capacity(inner.pending.len());
                while let Some((task, req)) = inner.pending.pop_front() {
                    if self.state.fits(&inner, &req) {
                        reserve(&mut inner, &req);
                        ready.push((task, req));
                    } else {
                        still_pending.push_back((task, req));
                    }
                }
                inner.pending = still_pending;
            }
        }
        for (task, req) in ready {
            self.launch(task, req);
        }
        self.state.finished.notify_all();
    }
}

fn reserve(inner: &mut SchedulerInner<'_>, requirements: &[usize]) {
    for (used, req) in inner.usage.iter_mut().zip(requirements) {
        *used += req;
    }
    inner.running += 1;
}

/// Run a task, turning a panic into a `TaskFailed` error.
fn run_task(task: Task<'_>) -> Result<()> {
    catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string());
        Err(StackerError::TaskFailed(message))
    })
}
