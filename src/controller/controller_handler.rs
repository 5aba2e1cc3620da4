//! # Controller
//!
//! Owns the scan session and drives it from a single event loop.
//!
//! ```text
//!  ConnectionRegistry ──ConnectionEvent──┐
//!  ImageCorrelator ──CorrelationOutcome──┼──▶ Controller::run (select!) ──▶ ScanSession
//!  ControllerHandle ──OperatorCommand────┘              │
//!                                                       └──▶ spawn(UploadOrchestrator::dispatch)
//! ```
//!
//! Every mutation of the session happens inside the loop. Reader tasks, deferred artifact
//! reads and uploads only talk to it through channels.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::types::*;
use crate::configuration::config::Config;
use crate::error_handling::types::{ConfigError, ConnectionError, ControllerError};
use crate::image_correlation::correlator::{
    CorrelationOutcome, DirectoryArtifactSource, ImageCorrelator,
};
use crate::network::connection_registry::ConnectionRegistry;
use crate::network::types::ConnectionEvent;
use crate::session_management::session_store::SessionStore;
use crate::upload::bundle::{SinkKind, UploadReport};
use crate::upload::orchestrator::{Sinks, UploadOrchestrator};

const COMMAND_QUEUE: usize = 32;

/// Lifecycle notes recorded in the session log.
pub const NOTE_CONNECTED: &str = "Connection connected";
pub const NOTE_USER_DISCONNECT: &str = "Disconnected by user";
pub const NOTE_REMOTE_DISCONNECT: &str = "Disconnected";

/// The mutable state of one operator session.
///
/// # Fields Overview
///
/// - `registry`: scanner links, at most one active
/// - `store`: bounded event log and current regime
/// - `correlator`: current capture and its artifact pair
pub struct ScanSession {
    pub registry: ConnectionRegistry,
    pub store: SessionStore,
    pub correlator: ImageCorrelator,
}

/// Delivery policy: the warehouse and the log must both have accepted the bundle.
pub fn delivery_succeeded(report: &UploadReport) -> bool {
    report.succeeded(SinkKind::Warehouse) && report.succeeded(SinkKind::LogStore)
}

/// Cloneable front of the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: Sender<OperatorCommand>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> OperatorCommand,
    ) -> Result<T, ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<StatusView, ControllerError> {
        self.request(OperatorCommand::Status).await
    }

    pub async fn image(&self) -> Result<Option<ImageView>, ControllerError> {
        self.request(OperatorCommand::Image).await
    }

    pub async fn connect(&self, target: ConnectTarget) -> Result<Uuid, ControllerError> {
        self.request(|reply| OperatorCommand::Connect { target, reply })
            .await?
    }

    pub async fn disconnect(&self) -> Result<bool, ControllerError> {
        self.request(OperatorCommand::Disconnect).await
    }

    /// Sends free text to the active station.
    pub async fn send_command(&self, text: impl Into<String>) -> Result<(), ControllerError> {
        let text = text.into();
        self.request(|reply| OperatorCommand::Send { text, reply })
            .await?
    }

    /// Asks the active station to take a photo.
    pub async fn capture(&self) -> Result<(), ControllerError> {
        self.request(OperatorCommand::Capture).await?
    }

    pub async fn set_regime(&self, regime: Option<u32>) -> Result<(), ControllerError> {
        self.request(|reply| OperatorCommand::SetRegime { regime, reply })
            .await
    }

    pub async fn add_entry(&self, text: impl Into<String>) -> Result<bool, ControllerError> {
        let text = text.into();
        self.request(|reply| OperatorCommand::AddEntry { text, reply })
            .await
    }

    pub async fn upload(&self) -> Result<UploadOutcome, ControllerError> {
        self.request(OperatorCommand::Upload).await?
    }

    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.tx
            .send(OperatorCommand::Shutdown)
            .await
            .map_err(|_| ControllerError::ChannelClosed)
    }
}

pub struct Controller {
    config: Config,
    session: ScanSession,
    orchestrator: UploadOrchestrator,
    events: UnboundedReceiver<ConnectionEvent>,
    outcomes: UnboundedReceiver<CorrelationOutcome>,
    commands: Receiver<OperatorCommand>,
    handle: ControllerHandle,
}

impl Controller {
    /// Builds a controller delivering to the HTTP sinks named in `config`.
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        let sinks = Sinks::http(&config.sinks)
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;
        Ok(Self::with_sinks(config, sinks))
    }

    pub fn with_sinks(config: Config, sinks: Sinks) -> Self {
        let registry = ConnectionRegistry::new(config.scanner.connect_timeout());
        let events = registry.subscribe();
        let source = Arc::new(DirectoryArtifactSource::new(
            config.imagery.root_path.clone(),
        ));
        let (correlator, outcomes) = ImageCorrelator::new(source, config.session.read_delay());
        let session = ScanSession {
            registry,
            store: SessionStore::new(config.session.capacity),
            correlator,
        };
        let orchestrator = UploadOrchestrator::with_config(sinks, &config.sinks);
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE);

        Self {
            config,
            session,
            orchestrator,
            events,
            outcomes,
            commands,
            handle: ControllerHandle { tx },
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Runs until a shutdown command or Ctrl-C.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("controller started");
        self.auto_connect().await;

        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.on_connection_event(event),
                Some(outcome) = self.outcomes.recv() => {
                    self.session.correlator.apply(outcome);
                }
                command = self.commands.recv() => match command {
                    Some(OperatorCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                _ = &mut interrupted => {
                    info!("interrupted");
                    break;
                }
            }
        }

        if let Some(id) = self.session.registry.active_id() {
            self.session.registry.disconnect(id);
        }
        info!("controller stopped");
        Ok(())
    }

    async fn auto_connect(&mut self) {
        let Some(entry) = self
            .config
            .scanner
            .selected()
            .filter(|entry| entry.auto_connect)
            .cloned()
        else {
            return;
        };
        info!("auto-connecting to {} ({}:{})", entry.name, entry.host, entry.port);
        if let Err(e) = self.connect_to(&entry.host, entry.port).await {
            warn!("auto-connect to {} failed: {}", entry.name, e);
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Scan {
                connection_id,
                scan,
                received_at,
            } => {
                if let Some(trigger) = &scan.image {
                    self.session
                        .correlator
                        .on_trigger(trigger, scan.codes.clone());
                }
                let event = self
                    .session
                    .store
                    .append_event(connection_id, scan, received_at);
                debug!(
                    "[{}] scan event {} with {} codes",
                    connection_id,
                    event.id(),
                    event.content().len()
                );
            }
            ConnectionEvent::Disconnected { connection_id } => {
                self.session.registry.disconnect(connection_id);
                self.session
                    .store
                    .record_lifecycle(connection_id, NOTE_REMOTE_DISCONNECT);
            }
        }
    }

    async fn on_command(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::Status(reply) => {
                let _ = reply.send(self.status_view());
            }
            OperatorCommand::Image(reply) => {
                let view = self.session.correlator.current_pair().map(ImageView::from);
                let _ = reply.send(view);
            }
            OperatorCommand::Connect { target, reply } => {
                let result = match self.resolve(target) {
                    Ok((host, port)) => self.connect_to(&host, port).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            OperatorCommand::Disconnect(reply) => {
                let _ = reply.send(self.disconnect());
            }
            OperatorCommand::Send { text, reply } => {
                let _ = reply.send(self.send_text(&text).await);
            }
            OperatorCommand::Capture(reply) => {
                let _ = reply.send(self.trigger_capture().await);
            }
            OperatorCommand::SetRegime { regime, reply } => {
                self.session.store.set_regime(regime);
                let _ = reply.send(());
            }
            OperatorCommand::AddEntry { text, reply } => {
                let _ = reply.send(self.session.store.add_manual_entry(&text));
            }
            OperatorCommand::Upload(reply) => self.upload(reply),
            OperatorCommand::Shutdown => {}
        }
    }

    fn resolve(&self, target: ConnectTarget) -> Result<(String, u16), ControllerError> {
        match target {
            ConnectTarget::Saved(id) => {
                let entry = self
                    .config
                    .scanner
                    .host(&id)
                    .ok_or(ConfigError::UnknownHost(id))?;
                Ok((entry.host.clone(), entry.port))
            }
            ConnectTarget::Address { host, port } => Ok((host, port)),
        }
    }

    async fn connect_to(&mut self, host: &str, port: u16) -> Result<Uuid, ControllerError> {
        match self.session.registry.connect(host, port).await {
            Ok(id) => {
                self.session.store.record_lifecycle(id, NOTE_CONNECTED);
                Ok(id)
            }
            Err(e) => {
                error!("connection to {}:{} failed: {}", host, port, e);
                self.session
                    .store
                    .record_lifecycle(Uuid::nil(), format!("Error: {}", e));
                Err(e.into())
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        let Some(id) = self.session.registry.active_id() else {
            return false;
        };
        self.session.registry.disconnect(id);
        self.session.store.record_lifecycle(id, NOTE_USER_DISCONNECT);
        true
    }

    fn active(&self) -> Result<Uuid, ControllerError> {
        self.session
            .registry
            .active_id()
            .ok_or_else(|| ConnectionError::NotConnected(Uuid::nil()).into())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ControllerError> {
        let id = self.active()?;
        self.session.registry.send(id, text).await?;
        info!("[{}] command sent: {:?}", id, text.trim_end());
        Ok(())
    }

    /// Clears the current pair and asks the station for a new photo.
    async fn trigger_capture(&mut self) -> Result<(), ControllerError> {
        let id = self.active()?;
        self.session.correlator.begin_capture();
        let command = self.config.scanner.capture_command.clone();
        self.session.registry.send(id, &command).await?;
        info!("[{}] capture requested", id);
        Ok(())
    }

    /// Builds the bundle here and leaves the fan-out to its own task.
    fn upload(&mut self, reply: oneshot::Sender<Result<UploadOutcome, ControllerError>>) {
        let prepared = UploadOrchestrator::prepare_bundle(
            &mut self.session.store,
            &mut self.session.correlator,
            Utc::now(),
        );
        let bundle = match prepared {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("upload refused: {}", e);
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let report = orchestrator.dispatch(bundle).await;
            let delivered = delivery_succeeded(&report);
            if !delivered {
                warn!("bundle was not delivered to the warehouse and the log");
            }
            let _ = reply.send(Ok(UploadOutcome { report, delivered }));
        });
    }

    fn status_view(&self) -> StatusView {
        let session = &self.session;
        StatusView {
            connections: session.registry.connections(),
            active_connection: session.registry.active_id(),
            regime: session.store.regime(),
            regime_presets: self.config.scanner.regime_presets(),
            total_captures: session.store.total_captures(),
            pending_capture: session.correlator.current_pair().map(|p| p.key.clone()),
            events: session.store.events().map(EventView::from).collect(),
        }
    }
}
