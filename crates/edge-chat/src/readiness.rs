//! Backend readiness monitor
//!
//! Polls the health endpoint from a background task and publishes one of
//! `loading | ready | setup | error` on a watch channel. `loading` is the only
//! state that can change; the task exits as soon as any other state is
//! reached. Probe failures are tolerated: only the startup timeout can force
//! `error`.

use crate::transport::HealthProbe;
use edge_api::HealthReport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Application-wide backend readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessState {
    /// Waiting for the backend to report a definitive answer
    Loading,
    /// The language model is loaded
    Ready,
    /// The model file has not been downloaded
    Setup,
    /// The backend did not become ready within the startup budget
    Error,
}

impl ReadinessState {
    /// Whether the monitor stops once this state is reached
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessState::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReadinessState::Loading => "loading",
            ReadinessState::Ready => "ready",
            ReadinessState::Setup => "setup",
            ReadinessState::Error => "error",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Readiness monitor configuration
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Delay between probes
    pub poll_interval: Duration,
    /// How long to stay in `loading` before forcing `error`
    pub startup_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Map one probe outcome to a new state. `None` means stay where we are.
pub fn classify(result: &edge_api::Result<HealthReport>) -> Option<ReadinessState> {
    match result {
        Err(e) => {
            tracing::debug!(error = %e, "health probe failed");
            None
        }
        Ok(report) if report.model_missing() => Some(ReadinessState::Setup),
        Ok(report) if report.is_ready() => Some(ReadinessState::Ready),
        Ok(report) => {
            tracing::debug!(status = ?report.status, "backend still loading");
            None
        }
    }
}

/// Polls backend health until it settles
pub struct ReadinessMonitor {
    state_rx: watch::Receiver<ReadinessState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    started_at: Instant,
}

impl ReadinessMonitor {
    /// Spawn the polling task. The first probe runs immediately.
    pub fn start(probe: Arc<dyn HealthProbe>, config: ReadinessConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ReadinessState::Loading);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(probe, config, state_tx, cancel.clone()));

        Self {
            state_rx,
            cancel,
            task: Some(task),
            started_at: Instant::now(),
        }
    }

    /// Current state
    pub fn state(&self) -> ReadinessState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_rx.clone()
    }

    /// Time since the monitor was started
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wait until the state leaves `loading`. If the monitor is shut down
    /// first, returns the state it was left in.
    pub async fn wait_for_settled(&self) -> ReadinessState {
        let mut rx = self.state_rx.clone();
        let settled = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        settled.unwrap_or_else(|_| *rx.borrow())
    }

    /// Stop polling and wait for the task to exit
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReadinessMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    probe: Arc<dyn HealthProbe>,
    config: ReadinessConfig,
    state_tx: watch::Sender<ReadinessState>,
    cancel: CancellationToken,
) {
    let deadline = tokio::time::sleep(config.startup_timeout);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("readiness monitor stopped");
                return;
            }
            _ = &mut deadline => {
                tracing::warn!(
                    "backend not ready after {}s, giving up",
                    config.startup_timeout.as_secs()
                );
                state_tx.send_replace(ReadinessState::Error);
                return;
            }
            result = async {
                ticker.tick().await;
                probe.probe().await
            } => {
                if let Some(state) = classify(&result) {
                    tracing::info!("backend is {}", state);
                    state_tx.send_replace(state);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script = Box<dyn Fn(usize) -> edge_api::Result<HealthReport> + Send + Sync>;

    /// Answers each probe from a closure of the call index
    struct ScriptedProbe {
        calls: AtomicUsize,
        script: Script,
    }

    impl ScriptedProbe {
        fn new(
            script: impl Fn(usize) -> edge_api::Result<HealthReport> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self) -> edge_api::Result<HealthReport> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(n)
        }
    }

    /// Never answers
    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self) -> edge_api::Result<HealthReport> {
            std::future::pending().await
        }
    }

    fn unreachable() -> edge_api::Result<HealthReport> {
        Err(edge_api::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    fn loading() -> edge_api::Result<HealthReport> {
        Ok(HealthReport {
            status: Some("loading".into()),
            llm_loaded: Some(false),
            model_exists: Some(true),
        })
    }

    fn ready() -> edge_api::Result<HealthReport> {
        Ok(HealthReport {
            status: Some("ok".into()),
            llm_loaded: Some(true),
            model_exists: Some(true),
        })
    }

    fn start(probe: Arc<dyn HealthProbe>) -> ReadinessMonitor {
        ReadinessMonitor::start(probe, ReadinessConfig::default())
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&unreachable()), None);
        assert_eq!(classify(&loading()), None);
        assert_eq!(classify(&ready()), Some(ReadinessState::Ready));
        assert_eq!(
            classify(&Ok(HealthReport {
                status: Some("ok".into()),
                ..Default::default()
            })),
            Some(ReadinessState::Ready)
        );
        // A missing model wins over a generic ok
        assert_eq!(
            classify(&Ok(HealthReport {
                status: Some("ok".into()),
                llm_loaded: Some(false),
                model_exists: Some(false),
            })),
            Some(ReadinessState::Setup)
        );
        assert_eq!(classify(&Ok(HealthReport::default())), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ReadinessState::Loading.is_terminal());
        assert!(ReadinessState::Ready.is_terminal());
        assert!(ReadinessState::Setup.is_terminal());
        assert!(ReadinessState::Error.is_terminal());
        assert_eq!(ReadinessState::Setup.to_string(), "setup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_times_out_at_deadline() {
        let probe = ScriptedProbe::new(|_| unreachable());
        let monitor = start(probe.clone());
        let rx = monitor.subscribe();

        // Record every state the subscriber sees until the sender goes away
        let seen = tokio::spawn(async move {
            let mut rx = rx;
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                seen.push(*rx.borrow_and_update());
            }
            seen
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(monitor.state(), ReadinessState::Loading);

        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Error);
        assert!(monitor.elapsed() >= Duration::from_secs(30));

        let calls = probe.calls();
        assert!((14..=16).contains(&calls), "probe ran {} times", calls);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls(), calls);
        assert_eq!(monitor.state(), ReadinessState::Error);

        // The task exited after a single transition
        assert_eq!(seen.await.unwrap(), vec![ReadinessState::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_model_is_setup_immediately() {
        let probe = ScriptedProbe::new(|_| {
            Ok(HealthReport {
                model_exists: Some(false),
                ..Default::default()
            })
        });
        let monitor = start(probe.clone());

        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Setup);
        assert_eq!(monitor.elapsed(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(monitor.state(), ReadinessState::Setup);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_stops_polling() {
        let probe = ScriptedProbe::new(|n| if n < 3 { loading() } else { ready() });
        let monitor = start(probe.clone());

        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Ready);
        assert_eq!(monitor.elapsed(), Duration::from_secs(6));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls(), 4);
        assert_eq!(monitor.state(), ReadinessState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_tolerated() {
        let probe = ScriptedProbe::new(|n| {
            if n < 5 {
                Err(edge_api::Error::Status {
                    endpoint: "/health",
                    status: 503,
                    body: "warming up".into(),
                })
            } else {
                ready()
            }
        });
        let monitor = start(probe.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.state(), ReadinessState::Loading);
        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ready_is_not_overridden() {
        let probe = ScriptedProbe::new(|n| if n < 14 { unreachable() } else { ready() });
        let monitor = start(probe.clone());

        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Ready);
        assert_eq!(monitor.elapsed(), Duration::from_secs(28));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(monitor.state(), ReadinessState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_still_times_out() {
        let monitor = start(Arc::new(HangingProbe));

        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Error);
        assert_eq!(monitor.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_settled_after_settling() {
        let probe = ScriptedProbe::new(|_| ready());
        let monitor = start(probe.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Sender is gone by now; the settled value is still reported
        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Ready);
        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let probe = ScriptedProbe::new(|_| loading());
        let mut monitor = start(probe.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        monitor.shutdown().await;

        let calls = probe.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls(), calls);
        // The timeout died with the task
        assert_eq!(monitor.state(), ReadinessState::Loading);
        assert_eq!(monitor.wait_for_settled().await, ReadinessState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let probe = ScriptedProbe::new(|_| loading());
        let monitor = start(probe.clone());
        let rx = monitor.subscribe();

        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(monitor);
        tokio::task::yield_now().await;

        let calls = probe.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls(), calls);
        assert_eq!(*rx.borrow(), ReadinessState::Loading);
    }
}
