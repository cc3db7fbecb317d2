use crate::error::DeviceError;
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::session::{SessionOptions, SessionState, SwitchSession};
use crate::p4rt::transport::Connector;
use crate::representation::SwitchIdentity;
use crate::util::Shutdown;
use futures::future::join_all;
use log::{error, info, warn};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Where the startup of a switch stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum StartupStage {
    Connect,
    Arbitration,
    PipelineInstall,
    Streaming,
}

impl Display for StartupStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StartupStage::Connect => "connect",
            StartupStage::Arbitration => "arbitration",
            StartupStage::PipelineInstall => "pipeline install",
            StartupStage::Streaming => "start streaming",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct StartupFailure {
    pub switch: String,
    pub stage: StartupStage,
    pub error: DeviceError,
}

#[derive(Debug, Default)]
pub struct StartupReport {
    pub failures: Vec<StartupFailure>,
    /// The shutdown signal fired before every switch finished starting.
    pub interrupted: bool,
}

enum Startup {
    Ready,
    Failed(StartupStage, DeviceError),
    Interrupted,
}

/// The sessions of every configured switch. Sessions that fail to start are
/// closed and dropped from the pool; the rest keep going.
pub struct SessionPool {
    sessions: Vec<SwitchSession>,
    connector: Arc<dyn Connector>,
    pipeconf: Arc<Pipeconf>,
}

impl SessionPool {
    pub fn new(
        switches: Vec<SwitchIdentity>,
        options: SessionOptions,
        pipeconf: Arc<Pipeconf>,
        connector: Arc<dyn Connector>,
    ) -> SessionPool {
        SessionPool {
            sessions: switches
                .into_iter()
                .map(|identity| SwitchSession::new(identity, options))
                .collect(),
            connector,
            pipeconf,
        }
    }

    /// Connects, arbitrates and installs the pipeline on every switch concurrently.
    pub async fn start_all(&mut self, shutdown: &Shutdown) -> StartupReport {
        let connector = self.connector.as_ref();
        let pipeconf = &self.pipeconf;
        let outcomes = join_all(
            self.sessions
                .iter_mut()
                .map(|session| start(session, connector, pipeconf.clone(), shutdown)),
        )
        .await;

        let mut report = StartupReport::default();
        let mut kept = Vec::with_capacity(self.sessions.len());
        for (mut session, outcome) in self.sessions.drain(..).zip(outcomes) {
            match outcome {
                Startup::Ready => kept.push(session),
                Startup::Failed(stage, error) => {
                    error!("switch {} failed at {}: {}", session.name(), stage, error);
                    session.close();
                    report.failures.push(StartupFailure {
                        switch: session.name().to_owned(),
                        stage,
                        error,
                    });
                }
                Startup::Interrupted => {
                    report.interrupted = true;
                    session.close();
                }
            }
        }
        self.sessions = kept;
        if report.interrupted {
            warn!("startup interrupted, {} switch(es) were ready", self.sessions.len());
            self.close_all();
        } else {
            info!("{} switch(es) ready", self.sessions.len());
        }
        report
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SwitchSession> {
        self.sessions.iter()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut SwitchSession> {
        self.sessions.iter_mut()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SwitchSession> {
        self.sessions.iter_mut().find(|s| s.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn close_all(&mut self) {
        for session in self.sessions.iter_mut() {
            if session.state() != SessionState::Closed {
                session.close();
            }
        }
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.close_all();
    }
}

async fn start(
    session: &mut SwitchSession,
    connector: &dyn Connector,
    pipeconf: Arc<Pipeconf>,
    shutdown: &Shutdown,
) -> Startup {
    if shutdown.is_triggered() {
        return Startup::Interrupted;
    }
    if let Err(e) = session.connect(connector).await {
        return Startup::Failed(StartupStage::Connect, e);
    }
    if shutdown.is_triggered() {
        return Startup::Interrupted;
    }
    if let Err(e) = session.establish_mastership().await {
        return Startup::Failed(StartupStage::Arbitration, e);
    }
    if shutdown.is_triggered() {
        return Startup::Interrupted;
    }
    if let Err(e) = session.install_pipeline(pipeconf).await {
        return Startup::Failed(StartupStage::PipelineInstall, e);
    }
    Startup::Ready
}
