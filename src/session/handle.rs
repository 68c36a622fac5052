use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::manager::LiveSession;
use super::stats::SessionSnapshot;
use crate::error::LiveResult;

/// Start/stop triggers sent to the coordinator
#[derive(Debug)]
pub enum Command {
    Start(oneshot::Sender<LiveResult<SessionSnapshot>>),
    Stop(oneshot::Sender<SessionSnapshot>),
}

/// Cloneable front end to a running [`LiveSession`]
#[derive(Clone)]
pub struct LiveAgentHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl LiveAgentHandle {
    /// Move `session` onto its own task
    pub fn spawn(session: LiveSession) -> (Self, JoinHandle<()>) {
        let (commands, commands_rx) = mpsc::channel(16);
        let snapshots = session.subscribe();
        let task = tokio::spawn(session.run(commands_rx));
        (Self { commands, snapshots }, task)
    }

    pub async fn start(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start(reply))
            .await
            .context("Live session task is not running")?;

        let snapshot = rx.await.context("Live session task dropped the start request")??;
        Ok(snapshot)
    }

    pub async fn stop(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .await
            .context("Live session task is not running")?;

        rx.await.context("Live session task dropped the stop request")
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}
