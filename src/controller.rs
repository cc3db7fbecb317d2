use crate::config::{ControllerConfig, SwitchConfig};
use crate::entity::{ReplicationSpec, TableEntrySpec};
use crate::error::{ConfigError, ControllerError, DeviceError, ValidationError};
use crate::monitor::{write_reports, Monitor, MonitorStats};
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::pool::{SessionPool, StartupFailure, StartupStage};
use crate::p4rt::schema::SchemaIndex;
use crate::p4rt::session::{SwitchSession, WriteOutcome};
use crate::p4rt::transport::{Connector, GrpcConnector};
use crate::report::Reporter;
use crate::rules::{
    build_congestion_threshold_rule, build_forwarding_rule, build_mirror_session,
    build_switch_id_rule,
};
use crate::util::Shutdown;
use futures::future::join_all;
use futures::StreamExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error(transparent)]
    Invalid(ValidationError),
    #[error(transparent)]
    Rejected(DeviceError),
    #[error("Blocked by failed {}", prerequisite)]
    Blocked { prerequisite: String },
}

#[derive(Debug)]
pub struct RuleFailure {
    pub switch: String,
    pub rule: String,
    pub cause: RuleError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Switches that completed startup.
    pub started: Vec<String>,
    pub switch_failures: Vec<StartupFailure>,
    pub rule_failures: Vec<RuleFailure>,
    pub monitored: Vec<MonitorStats>,
    /// Stream channels that ended while monitoring, before any shutdown.
    pub lost_streams: Vec<DeviceError>,
    pub interrupted_during_startup: bool,
}

impl RunSummary {
    pub fn is_degraded(&self) -> bool {
        !self.switch_failures.is_empty()
            || !self.rule_failures.is_empty()
            || !self.lost_streams.is_empty()
    }

    pub fn ensure_started(&self) -> Result<(), ControllerError> {
        if self.started.is_empty() && !self.interrupted_during_startup {
            Err(ControllerError::NoSwitchStarted)
        } else {
            Ok(())
        }
    }

    /// 0 for a clean run, 1 when no switch came up, 2 when anything failed on the way,
    /// including a stream channel lost before shutdown.
    pub fn exit_code(&self) -> i32 {
        if self.ensure_started().is_err() {
            1
        } else if self.is_degraded() {
            2
        } else {
            0
        }
    }
}

#[derive(Clone, Debug)]
enum PlannedEntry {
    Table(TableEntrySpec),
    Replication(ReplicationSpec),
}

#[derive(Clone, Debug)]
struct PlannedRule {
    label: String,
    entry: PlannedEntry,
    /// Index of a rule in the same plan that must be installed first.
    depends_on: Option<usize>,
}

#[derive(Debug, Default)]
struct SwitchPlan {
    rules: Vec<PlannedRule>,
    invalid: Vec<RuleFailure>,
}

/// Builds every rule of one switch. Invalid rules are recorded and left out,
/// along with anything depending on them.
fn plan_switch(
    schema: &SchemaIndex,
    config: &ControllerConfig,
    switch: &SwitchConfig,
) -> SwitchPlan {
    let name = &switch.identity.name;
    let mut plan = SwitchPlan::default();
    let invalid = |rule: String, cause: RuleError| {
        warn!("switch {}: skipping {}: {}", name, rule, cause);
        RuleFailure {
            switch: name.clone(),
            rule,
            cause,
        }
    };

    // (index in plan, label), or Err(label) when it failed validation
    let mut mirror: Option<Result<usize, String>> = None;
    if let Some(m) = switch.mirror {
        let label = format!("mirror session {}", m.session_id);
        match build_mirror_session(m.session_id, m.port) {
            Ok(spec) => {
                mirror = Some(Ok(plan.rules.len()));
                plan.rules.push(PlannedRule {
                    label,
                    entry: PlannedEntry::Replication(spec),
                    depends_on: None,
                });
            }
            Err(e) => {
                plan.invalid.push(invalid(label.clone(), RuleError::Invalid(e)));
                mirror = Some(Err(label));
            }
        }
    }

    if let Some(swid) = switch.switch_id {
        let label = format!("switch id {}", swid);
        match build_switch_id_rule(schema, &config.program, swid) {
            Ok(spec) => plan.rules.push(PlannedRule {
                label,
                entry: PlannedEntry::Table(spec),
                depends_on: None,
            }),
            Err(e) => plan.invalid.push(invalid(label, RuleError::Invalid(e))),
        }
    }

    for f in &switch.forwarding {
        let label = format!("forward {}/{} to port {}", f.prefix, f.prefix_len, f.port);
        match build_forwarding_rule(schema, &config.program, f.prefix, f.prefix_len, f.mac, f.port) {
            Ok(spec) => plan.rules.push(PlannedRule {
                label,
                entry: PlannedEntry::Table(spec),
                depends_on: None,
            }),
            Err(e) => plan.invalid.push(invalid(label, RuleError::Invalid(e))),
        }
    }

    if let Some(port) = switch.congestion_port {
        // checked when the controller is built
        let threshold = config.threshold.unwrap_or_default();
        let label = format!("threshold {} on port {}", threshold, port);
        match (build_congestion_threshold_rule(schema, &config.program, port, threshold), mirror) {
            (Err(e), _) => plan.invalid.push(invalid(label, RuleError::Invalid(e))),
            (Ok(_), Some(Err(prerequisite))) => plan
                .invalid
                .push(invalid(label, RuleError::Blocked { prerequisite })),
            (Ok(spec), mirror) => plan.rules.push(PlannedRule {
                label,
                entry: PlannedEntry::Table(spec),
                depends_on: mirror.and_then(|m| m.ok()),
            }),
        }
    }
    plan
}

/// Writes a plan in order, stopping dependents of anything that failed.
async fn install_plan(session: &mut SwitchSession, rules: &[PlannedRule]) -> Vec<RuleFailure> {
    let mut failures = Vec::new();
    let mut installed = vec![false; rules.len()];
    for (i, rule) in rules.iter().enumerate() {
        let failure = |cause| RuleFailure {
            switch: session.name().to_owned(),
            rule: rule.label.clone(),
            cause,
        };
        if let Some(dep) = rule.depends_on {
            if !installed[dep] {
                let f = failure(RuleError::Blocked {
                    prerequisite: rules[dep].label.clone(),
                });
                warn!("switch {}: {} {}", f.switch, f.rule, f.cause);
                failures.push(f);
                continue;
            }
        }
        let result = match &rule.entry {
            PlannedEntry::Table(spec) => session.write_table_entry(spec).await,
            PlannedEntry::Replication(spec) => session.write_replication_entry(spec).await,
        };
        match result {
            Ok(WriteOutcome::Installed) => {
                debug!("switch {}: installed {}", session.name(), rule.label);
                installed[i] = true;
            }
            Ok(WriteOutcome::AlreadyPresent) => {
                info!("switch {}: {} was already installed", session.name(), rule.label);
                installed[i] = true;
            }
            Err(e) => {
                error!("switch {}: {} failed: {}", session.name(), rule.label, e);
                failures.push(RuleFailure {
                    switch: session.name().to_owned(),
                    rule: rule.label.clone(),
                    cause: RuleError::Rejected(e),
                });
            }
        }
    }
    failures
}

async fn dump_tables(session: &mut SwitchSession) {
    let pipeconf = match session.pipeconf() {
        Some(pipeconf) => pipeconf.clone(),
        None => return,
    };
    let name = session.name().to_owned();
    let mut entries = match session.read_table_entries(None).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("switch {}: cannot read tables: {}", name, e);
            return;
        }
    };
    info!("switch {} table entries:", name);
    while let Some(entry) = entries.next().await {
        match entry {
            Ok(entry) => info!("  {}", entry.describe(pipeconf.schema())),
            Err(e) => warn!("  {}", e),
        }
    }
}

/// Sequences a whole run: startup, rule installation, then monitoring until shutdown.
pub struct Controller {
    config: ControllerConfig,
    pipeconf: Arc<Pipeconf>,
    connector: Arc<dyn Connector>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        pipeconf: Arc<Pipeconf>,
        connector: Arc<dyn Connector>,
    ) -> Result<Controller, ControllerError> {
        config.validate()?;
        if config.threshold.is_none() {
            if let Some(s) = config.switches.iter().find(|s| s.congestion_port.is_some()) {
                return Err(ConfigError::Invalid(format!(
                    "{} has a congestion port but no threshold is set",
                    s.identity.name
                ))
                .into());
            }
        }
        Ok(Controller {
            config,
            pipeconf,
            connector,
        })
    }

    /// Loads the pipeline files named by `config` and talks gRPC to the switches.
    pub fn from_config(config: ControllerConfig) -> Result<Controller, ControllerError> {
        let pipeconf = Pipeconf::load("ecn", &config.p4info, &config.device_config)?;
        let connector = GrpcConnector::new(Duration::from_millis(config.rpc_timeout_ms));
        Controller::new(config, Arc::new(pipeconf), Arc::new(connector))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub async fn run<R: Reporter>(&self, reporter: R, shutdown: Shutdown) -> RunSummary {
        let mut summary = RunSummary::default();
        let schema = self.pipeconf.schema();

        let mut plans: Vec<(String, SwitchPlan)> = self
            .config
            .switches
            .iter()
            .map(|s| (s.identity.name.clone(), plan_switch(schema, &self.config, s)))
            .collect();
        for (_, plan) in plans.iter_mut() {
            summary.rule_failures.append(&mut plan.invalid);
        }

        let mut pool = SessionPool::new(
            self.config.identities(),
            self.config.session_options(),
            self.pipeconf.clone(),
            self.connector.clone(),
        );
        let startup = pool.start_all(&shutdown).await;
        summary.switch_failures = startup.failures;
        summary.started = pool.sessions().map(|s| s.name().to_owned()).collect();
        if startup.interrupted {
            summary.interrupted_during_startup = true;
            return summary;
        }
        if pool.is_empty() {
            error!("no switch completed startup");
            return summary;
        }

        let installs = join_all(pool.sessions_mut().map(|session| {
            let rules = plans
                .iter()
                .find(|(name, _)| name == session.name())
                .map(|(_, plan)| plan.rules.as_slice())
                .unwrap_or(&[]);
            install_plan(session, rules)
        }))
        .await;
        for mut failures in installs {
            summary.rule_failures.append(&mut failures);
        }
        info!("rules installed, {} failure(s)", summary.rule_failures.len());

        if self.config.dump_tables {
            for session in pool.sessions_mut() {
                dump_tables(session).await;
            }
        }

        if shutdown.is_triggered() {
            info!("shutdown requested before monitoring");
            pool.close_all();
            return summary;
        }

        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let writer = tokio::spawn(write_reports(reporter, receiver));
        let mut monitors = Vec::new();
        let mut streaming_failures = Vec::new();
        for session in pool.sessions_mut() {
            match session.start_streaming() {
                Ok(events) => {
                    let monitor = Monitor::new(
                        session.name(),
                        events,
                        self.config.telemetry_ether_type,
                        sender.clone(),
                    );
                    monitors.push(tokio::spawn(monitor.run(shutdown.clone())));
                }
                Err(error) => {
                    error!("switch {} cannot stream events: {}", session.name(), error);
                    streaming_failures.push(StartupFailure {
                        switch: session.name().to_owned(),
                        stage: StartupStage::Streaming,
                        error,
                    });
                }
            }
        }
        summary.switch_failures.append(&mut streaming_failures);
        drop(sender);
        info!("waiting for reports from {} switch(es)", monitors.len());

        for stats in join_all(monitors).await {
            match stats {
                Ok(stats) => {
                    if stats.stream_ended {
                        let lost = match pool.get_mut(&stats.switch) {
                            Some(session) => session.stream_failure().await,
                            None => None,
                        };
                        summary.lost_streams.extend(lost);
                    }
                    summary.monitored.push(stats);
                }
                Err(e) => error!("monitor task failed: {}", e),
            }
        }
        if let Err(e) = writer.await {
            error!("report writer failed: {}", e);
        }
        pool.close_all();
        info!("all sessions closed");
        summary
    }
}
