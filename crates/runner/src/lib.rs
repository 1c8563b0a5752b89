//! Runs the bridge's long-lived processes side by side and shuts them down
//! together.
//!
//! Every process gets the same [`CancellationToken`]. The token is cancelled
//! on SIGINT/SIGTERM or as soon as any process fails; closers then run under
//! a timeout whatever the outcome.
//!
//! # Example
//!
//! ```no_run
//! use crm_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             while !ctx.is_cancelled() {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => {}
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process. Must return once the token is cancelled.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup run after all processes stopped
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with no processes and a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a process identified by `name` in shutdown and failure logs
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Add an already boxed process, as produced by the workers
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Closers run concurrently; one failing does not stop the others.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Share cancellation with code outside the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run to completion, then exit the process: code 1 if a process failed,
    /// 0 otherwise.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Ok(()) => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!(error = %format!("{:#}", err), "Application exiting with error");
                std::process::exit(1);
            }
        }
    }

    /// Run all processes until a signal, external cancellation, or the first
    /// failure, then run the closers. Returns the first process error.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::debug!(process = %name, "starting process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "process stopped");
                }
                Ok((name, Err(err))) => {
                    if token.is_cancelled() {
                        tracing::warn!(process = %name, error = %format!("{:#}", err), "process failed during shutdown");
                    } else {
                        tracing::error!(process = %name, error = %format!("{:#}", err), "process failed, shutting down");
                        first_error = Some(err.context(format!("process {} failed", name)));
                        token.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "process panicked, shutting down");
                    if first_error.is_none() && !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("process panicked: {}", err));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                if let Ok((name, _)) = joined {
                    tracing::debug!(process = %name, "process stopped");
                }
            }
        };
        if tokio::time::timeout(self.closer_timeout, drain).await.is_err() {
            tracing::warn!("processes did not stop in time, aborting them");
        }
        join_set.shutdown().await;

        run_closers(self.closers, self.closer_timeout).await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("Received SIGINT");
                    ctrl_c_token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to listen for SIGINT");
                }
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                return;
            }
        };

        tokio::select! {
            _ = token.cancelled() => {}
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                token.cancel();
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    tracing::info!(timeout_secs = timeout.as_secs_f64(), closers = closers.len(), "running closers");

    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    let drain = async {
        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => tracing::debug!("closer completed"),
                Ok(Err(err)) => tracing::error!(error = %format!("{:#}", err), "closer failed"),
                Err(err) => tracing::error!(error = %err, "closer panicked"),
            }
        }
    };

    match tokio::time::timeout(timeout, drain).await {
        Ok(()) => tracing::info!("All closers completed"),
        Err(_) => tracing::error!(timeout_secs = timeout.as_secs_f64(), "closers timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn wait_for_cancel(ctx: CancellationToken) -> Result<(), anyhow::Error> {
        ctx.cancelled().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_processes_and_runs_closers() {
        let token = CancellationToken::new();
        let closer_called = Arc::new(AtomicBool::new(false));
        let flag = closer_called.clone();

        let runner = Runner::new()
            .with_named_process("first", wait_for_cancel)
            .with_named_process("second", wait_for_cancel)
            .with_closer(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token.clone());

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        assert!(runner.run_until_stopped().await.is_ok());
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_process_failure_cancels_the_rest() {
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_named_process("healthy", wait_for_cancel)
            .with_named_process("broken", |_ctx| async move {
                Err(anyhow::anyhow!("delivery stream ended"))
            })
            .with_cancellation_token(token.clone());

        let err = runner.run_until_stopped().await.unwrap_err();

        assert!(token.is_cancelled());
        assert!(format!("{:#}", err).contains("process broken failed"));
        assert!(format!("{:#}", err).contains("delivery stream ended"));
    }

    #[tokio::test]
    async fn test_boxed_process_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let process: AppProcess = Box::new(move |_ctx| {
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Err(anyhow::anyhow!("done"))
            })
        });

        let result = Runner::new()
            .with_boxed_process("boxed", process)
            .run_until_stopped()
            .await;

        assert!(result.is_err());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_closer_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = counter.clone();
        let second = counter.clone();

        let closers: Vec<Closer> = vec![
            Box::new(move || {
                Box::pin(async move {
                    first.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("close failed"))
                })
            }),
            Box::new(move || {
                Box::pin(async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        ];

        run_closers(closers, Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closers_time_out() {
        let closers: Vec<Closer> = vec![Box::new(|| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        })];

        let start = tokio::time::Instant::now();
        run_closers(closers, Duration::from_secs(2)).await;
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
