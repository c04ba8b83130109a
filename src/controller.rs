use crate::browser::automation::{self, CHANGED_BINDING, SUBMIT_BINDING};
use crate::browser::chrome;
use crate::browser::page::CdpHostPage;
use crate::config::{InjectorConfig, PickerMode};
use crate::dom::fragments::{TipMount, UploadControlMount, CONTAINER_ID};
use crate::dom::{HostPage, MountPolicy, Reconciler};
use crate::groups::{GroupDirectory, MembershipSource};
use crate::session::SessionResolver;
use crate::upload::transport::{api_url, HttpUploadTransport};
use crate::upload::{FileDescriptor, Orchestrator, StatusIndicator, UploadTarget};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{stream, Stream, StreamExt};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CHROME_READY_TIMEOUT_SECS: u64 = 30;
/// Upper bound on events folded into one pass.
const EVENT_BATCH: usize = 64;

#[derive(Debug, Deserialize)]
pub struct EncodedFile {
    pub name: String,
    /// Base64 file content.
    pub data: String,
}

/// What the page sends after the user picked a target and files.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub target: String,
    #[serde(default = "default_mode")]
    pub mode: PickerMode,
    #[serde(default)]
    pub files: Vec<EncodedFile>,
}

fn default_mode() -> PickerMode {
    PickerMode::Batch
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("malformed submission: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("file '{name}' is not valid base64: {source}")]
    Encoding {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("'{0}' is not a selectable target")]
    UnknownTarget(String),
}

impl SubmitRequest {
    pub fn parse(payload: &str) -> Result<Self, SubmitError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn decode_files(&self) -> Result<Vec<FileDescriptor>, SubmitError> {
        self.files
            .iter()
            .map(|f| {
                STANDARD
                    .decode(f.data.as_bytes())
                    .map(|content| FileDescriptor::new(f.name.clone(), content))
                    .map_err(|source| SubmitError::Encoding {
                        name: f.name.clone(),
                        source,
                    })
            })
            .collect()
    }
}

/// Routes page submissions to the orchestrator, accepting only offered targets.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    targets: Vec<UploadTarget>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>, targets: Vec<UploadTarget>) -> Self {
        Self {
            orchestrator,
            targets,
        }
    }

    fn resolve_target(&self, name: &str) -> Result<UploadTarget, SubmitError> {
        self.targets
            .iter()
            .find(|t| t.as_str() == name)
            .cloned()
            .ok_or_else(|| SubmitError::UnknownTarget(name.to_string()))
    }

    /// Handle one submission end to end. Nothing here is allowed to fail loudly.
    pub async fn handle(&self, payload: &str) {
        let prepared = SubmitRequest::parse(payload).and_then(|req| {
            let target = self.resolve_target(&req.target)?;
            let files = req.decode_files()?;
            Ok((req.mode, target, files))
        });
        let (mode, target, files) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("[Dispatch] submission dropped: {}", e);
                return;
            }
        };

        let outcome = match mode {
            PickerMode::Batch => self.orchestrator.run_batch(files, target).await.map(|_| ()),
            PickerMode::Single => self.orchestrator.upload_single(files, target).await.map(|_| ()),
        };
        if let Err(e) = outcome {
            info!("[Dispatch] submission not started: {}", e);
        }
    }
}

/// What the page reports to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Structure changed somewhere; re-check the watches.
    Changed,
    /// A new document loaded in the tab.
    Loaded,
    /// Files picked through the upload button.
    Submitted(String),
}

/// Per-document wiring: group gating, injected fragments and who accepts submissions.
pub struct PageSession {
    config: InjectorConfig,
    reconciler: Reconciler,
    groups: Arc<dyn MembershipSource>,
    orchestrator: Arc<Orchestrator>,
    indicator: Arc<StatusIndicator>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl PageSession {
    pub fn new(
        config: InjectorConfig,
        page: Arc<dyn HostPage>,
        groups: Arc<dyn MembershipSource>,
        orchestrator: Arc<Orchestrator>,
        indicator: Arc<StatusIndicator>,
    ) -> Self {
        let mut reconciler = Reconciler::new(page);
        reconciler.watch(TipMount::new(&config), MountPolicy::OneShot);
        Self {
            config,
            reconciler,
            groups,
            orchestrator,
            indicator,
            dispatcher: None,
        }
    }

    /// Take the current document as freshly loaded, then follow `events` until they end.
    pub async fn run<S>(&mut self, events: S)
    where
        S: Stream<Item = PageEvent> + Unpin,
    {
        self.load_document().await;
        self.pump(events).await;
    }

    /// Events already queued together are handled as one pass.
    async fn pump<S>(&mut self, events: S)
    where
        S: Stream<Item = PageEvent> + Unpin,
    {
        let mut batches = events.ready_chunks(EVENT_BATCH);
        while let Some(batch) = batches.next().await {
            self.handle_batch(batch).await;
        }
        info!("[Page] event stream closed");
    }

    async fn handle_batch(&mut self, batch: Vec<PageEvent>) {
        let mut loaded = false;
        let mut changed = false;
        for event in batch {
            match event {
                PageEvent::Changed => changed = true,
                PageEvent::Loaded => loaded = true,
                PageEvent::Submitted(payload) => self.submit(payload),
            }
        }

        if loaded {
            info!("[Page] new document loaded");
            self.load_document().await;
        } else if changed {
            self.reconcile().await;
        }
    }

    /// Re-derive group gating for the document in the tab, then reconcile.
    async fn load_document(&mut self) {
        self.reconciler.rearm_one_shots();

        let membership = self.groups.membership().await;
        if membership.contains(&self.config.admin_group) {
            let targets = membership.selectable_targets(&self.config.excluded_targets());
            self.enable_upload(targets).await;
        } else {
            info!("User is not {}; skipping upload button.", self.config.admin_group);
            self.disable_upload().await;
        }

        self.reconcile().await;
    }

    async fn enable_upload(&mut self, targets: Vec<UploadTarget>) {
        if self.dispatcher.as_ref().is_some_and(|d| d.targets == targets) {
            return;
        }
        info!("[Upload] enabled with {} target(s)", targets.len());

        // The markup carries the target list.
        self.reconciler.unwatch(CONTAINER_ID).await;
        self.reconciler.watch(
            UploadControlMount::new(&self.config, &targets, self.indicator.clone()),
            MountPolicy::Persistent,
        );
        self.dispatcher = Some(Arc::new(Dispatcher::new(self.orchestrator.clone(), targets)));
    }

    async fn disable_upload(&mut self) {
        if self.dispatcher.take().is_some() {
            info!("[Upload] disabled");
            self.reconciler.unwatch(CONTAINER_ID).await;
        }
    }

    async fn reconcile(&mut self) {
        if !self.reconciler.is_watching() {
            return;
        }
        self.reconciler.reconcile().await;
        if !self.reconciler.is_watching() {
            info!("[Reconciler] all watches retired until the next document");
        }
    }

    fn submit(&self, payload: String) {
        match &self.dispatcher {
            Some(dispatcher) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.handle(&payload).await });
            }
            None => warn!("[Dispatch] submission ignored: upload is not enabled"),
        }
    }
}

/// Attach to Chrome, inject the controls, and serve the tab until interrupted.
pub async fn run_injector(config: InjectorConfig) -> Result<()> {
    let profile_dir = config.resolve_profile_dir()?;
    let session = chrome::prepare_session(
        config.debug_port,
        config.chrome_path.as_deref(),
        &profile_dir,
        &config.app_url,
    )
    .await?;
    info!("[Chrome session] {:?} on port {}", session.mode, session.port);
    chrome::wait_for_chrome_ready(session.port, Duration::from_secs(CHROME_READY_TIMEOUT_SECS)).await?;

    let (_browser, page) = automation::connect_to_chrome(session.port, &config.app_url).await?;
    let changes = automation::binding_payloads(&page, CHANGED_BINDING)
        .await?
        .map(|_| PageEvent::Changed);
    let submissions = automation::binding_payloads(&page, SUBMIT_BINDING)
        .await?
        .map(PageEvent::Submitted);
    let loads = automation::document_loads(&page)
        .await?
        .map(|_| PageEvent::Loaded);
    automation::install_page_helper(&page).await?;

    let host = Arc::new(CdpHostPage::new(page));
    let client = Client::new();
    let groups = Arc::new(GroupDirectory::new(
        client.clone(),
        api_url(&config.app_url, &config.groups_path)?,
        host.clone(),
    ));
    let indicator = Arc::new(StatusIndicator::new(host.clone()));
    let transport = Arc::new(HttpUploadTransport::new(
        client,
        api_url(&config.app_url, &config.upload_path)?,
        host.clone(),
    ));
    let sessions = SessionResolver::new(host.clone(), config.session_cookie.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        transport,
        sessions,
        indicator.clone(),
        &config.timings,
    ));

    let mut page_session = PageSession::new(config, host, groups, orchestrator, indicator);
    let events = stream::select(stream::select(changes, loads), submissions);

    tokio::select! {
        _ = page_session.run(events) => info!("Page binding stream closed, stopping"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
    }
    Ok(())
}
