use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use common::{Error, RejectionReason, Result};

use crate::governor::{ExposureId, RiskGovernor, RiskStatus, TradeRequest};

enum Command {
    Validate {
        request: TradeRequest,
        reply: oneshot::Sender<Result<(), RejectionReason>>,
    },
    RegisterOpen {
        request: TradeRequest,
        reply: oneshot::Sender<Result<ExposureId, RejectionReason>>,
    },
    RecordClose {
        id: ExposureId,
        pnl: f64,
        reply: oneshot::Sender<bool>,
    },
    RecordResult {
        pnl: f64,
    },
    DailyReset,
    WeeklyReset,
    ResetEmergencyStop,
    Status {
        reply: oneshot::Sender<RiskStatus>,
    },
}

/// Cloneable handle to the single task that owns the [`RiskGovernor`].
///
/// Every read-modify-write of the risk state happens inside that task, in
/// the order commands arrive, so concurrent signal paths can never race on
/// the emergency-stop check.
#[derive(Clone)]
pub struct GovernorHandle {
    tx: mpsc::Sender<Command>,
}

/// Spawn the governor task. The task ends, returning the governor, once
/// every handle has been dropped.
pub fn spawn_governor(governor: RiskGovernor, queue_depth: usize) -> (GovernorHandle, JoinHandle<RiskGovernor>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let task = tokio::spawn(run(governor, rx));
    (GovernorHandle { tx }, task)
}

async fn run(mut governor: RiskGovernor, mut rx: mpsc::Receiver<Command>) -> RiskGovernor {
    info!("RiskGovernor task running");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Validate { request, reply } => {
                let _ = reply.send(governor.validate_trade(&request));
            }
            Command::RegisterOpen { request, reply } => {
                let _ = reply.send(governor.register_open(request));
            }
            Command::RecordClose { id, pnl, reply } => {
                let _ = reply.send(governor.record_close(id, pnl));
            }
            Command::RecordResult { pnl } => governor.record_trade_result(pnl),
            Command::DailyReset => governor.daily_reset(),
            Command::WeeklyReset => governor.weekly_reset(),
            Command::ResetEmergencyStop => governor.reset_emergency_stop(),
            Command::Status { reply } => {
                let _ = reply.send(governor.status());
            }
        }
    }
    warn!("All governor handles dropped, RiskGovernor task exiting");
    governor
}

impl GovernorHandle {
    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::Other("risk governor task stopped".into()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await
            .map_err(|_| Error::Other("risk governor dropped the reply".into()))
    }

    pub async fn validate_trade(&self, request: TradeRequest) -> Result<Result<(), RejectionReason>> {
        self.request(|reply| Command::Validate { request, reply }).await
    }

    pub async fn register_open(
        &self,
        request: TradeRequest,
    ) -> Result<Result<ExposureId, RejectionReason>> {
        self.request(|reply| Command::RegisterOpen { request, reply }).await
    }

    pub async fn record_close(&self, id: ExposureId, pnl: f64) -> Result<bool> {
        self.request(|reply| Command::RecordClose { id, pnl, reply }).await
    }

    pub async fn record_trade_result(&self, pnl: f64) -> Result<()> {
        self.send(Command::RecordResult { pnl }).await
    }

    pub async fn daily_reset(&self) -> Result<()> {
        self.send(Command::DailyReset).await
    }

    pub async fn weekly_reset(&self) -> Result<()> {
        self.send(Command::WeeklyReset).await
    }

    pub async fn reset_emergency_stop(&self) -> Result<()> {
        self.send(Command::ResetEmergencyStop).await
    }

    pub async fn status(&self) -> Result<RiskStatus> {
        self.request(|reply| Command::Status { reply }).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
