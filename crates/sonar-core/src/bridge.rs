//! Command bridge: foreground threads post jobs to one worker thread.
//!
//! The worker thread owns a state value `W` and a current-thread tokio
//! runtime. Jobs are async closures over `&mut W`; the worker runs them one
//! at a time to completion, so a job that awaits several round trips is
//! never interleaved with another job. Between jobs the worker waits on the
//! state's own event source ([`Worker::next_event`]).
//!
//! ```text
//! host thread ──exec_sync──▶ [job queue] ──▶ worker thread
//!      ▲                                        │ job(&mut W).await
//!      └──────────── reply (blocking) ◀─────────┘
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, warn};

/// Boxed future borrowing the worker state
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

type Job<W> = Box<dyn for<'a> FnOnce(&'a mut W) -> LocalBoxFuture<'a, ()> + Send>;

fn job<W, F>(f: F) -> Job<W>
where
    F: for<'a> FnOnce(&'a mut W) -> LocalBoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// State owned by the worker thread.
pub trait Worker: 'static {
    /// Background event type
    type Event;

    /// Wait for the next background event. Must be cancel-safe: the worker
    /// drops this future whenever a job arrives first.
    fn next_event(&mut self) -> impl Future<Output = Self::Event>;

    /// React to a background event.
    fn handle_event(&mut self, event: Self::Event) -> impl Future<Output = ()>;

    /// Called once after the job queue closed.
    fn on_shutdown(&mut self) -> impl Future<Output = ()> {
        async {}
    }
}

enum Step<J, E> {
    Job(J),
    Event(E),
}

/// Handle to a worker thread.
pub struct Bridge<W: Worker> {
    jobs: Option<UnboundedSender<Job<W>>>,
    thread: Option<JoinHandle<()>>,
}

impl<W: Worker> Bridge<W> {
    /// Start the worker thread; `init` builds the state on that thread,
    /// inside its runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the runtime or thread cannot be
    /// created.
    pub fn spawn<I>(name: &str, init: I) -> Result<Self>
    where
        I: FnOnce() -> W + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(e.into()))?;
        let (tx, rx) = unbounded_channel();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runtime.block_on(run(init, rx)))
            .map_err(|e| Error::Transport(e.into()))?;

        info!(worker = name, "Worker thread started");
        Ok(Self {
            jobs: Some(tx),
            thread: Some(thread),
        })
    }

    fn post(&self, job: Job<W>) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(Error::NoConnection)?;
        jobs.send(job).map_err(|_| Error::NoConnection)
    }

    /// Run `f` on the worker and block until it completed.
    ///
    /// Must not be called from the worker thread itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if the worker is gone, otherwise
    /// whatever `f` returned.
    pub fn exec_sync<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut W) -> LocalBoxFuture<'a, Result<R>> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.post(job(move |worker: &mut W| {
            Box::pin(async move {
                let out = f(worker).await;
                let _ = tx.send(out);
            })
        }))?;
        rx.recv().map_err(|_| Error::NoConnection)?
    }

    /// Run `f` on the worker without waiting; a failure is logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if the job could not be posted.
    pub fn exec_async<F>(&self, name: &'static str, f: F) -> Result<()>
    where
        F: for<'a> FnOnce(&'a mut W) -> LocalBoxFuture<'a, Result<()>> + Send + 'static,
    {
        self.post(job(move |worker: &mut W| {
            Box::pin(async move {
                if let Err(e) = f(worker).await {
                    warn!(job = name, error = %e, "Background job failed");
                }
            })
        }))
    }

    /// Whether the worker still accepts jobs
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Close the queue, let the worker finish queued jobs and join it.
    pub fn shutdown(&mut self) {
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Worker thread panicked");
            } else {
                info!("Worker thread stopped");
            }
        }
    }
}

impl<W: Worker> Drop for Bridge<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<W, I>(init: I, mut jobs: UnboundedReceiver<Job<W>>)
where
    W: Worker,
    I: FnOnce() -> W,
{
    let mut worker = init();
    loop {
        let step = tokio::select! {
            biased;
            job = jobs.recv() => match job {
                Some(job) => Step::Job(job),
                None => break,
            },
            event = worker.next_event() => Step::Event(event),
        };

        match step {
            Step::Job(job) => job(&mut worker).await,
            Step::Event(event) => worker.handle_event(event).await,
        }
    }
    debug!("Job queue closed");
    worker.on_shutdown().await;
}
