use super::HostPage;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;

/// Something the reconciler keeps injected once its anchor exists.
#[async_trait]
pub trait Mount: Send + Sync {
    /// Stable DOM id of the injected fragment's root.
    fn fragment_id(&self) -> &str;

    /// Host element whose presence makes mounting possible.
    fn anchor_id(&self) -> &str;

    /// Insert the fragment. `Ok(false)` means the anchor vanished mid-way.
    async fn mount(&self, page: &Arc<dyn HostPage>) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPolicy {
    /// Re-mount every time the host destroys the fragment.
    Persistent,
    /// Mount once per document.
    OneShot,
}

/// What the reconciler last learned about one fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountRecord {
    /// Fragment was present at the last check.
    pub present: bool,
    /// Successful mounts so far.
    pub mounts: u32,
    /// Watch cancelled until the next document.
    pub retired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    AlreadyPresent,
    Mounted,
    AnchorMissing,
    Retired,
    Failed,
}

struct Watch {
    mount: Box<dyn Mount>,
    policy: MountPolicy,
    record: MountRecord,
}

/// Keeps injected fragments in the host page, exactly one per id.
pub struct Reconciler {
    page: Arc<dyn HostPage>,
    watches: Vec<Watch>,
}

impl Reconciler {
    pub fn new(page: Arc<dyn HostPage>) -> Self {
        Self {
            page,
            watches: Vec::new(),
        }
    }

    /// Start watching for `mount`'s anchor. A second watch for the same fragment id is ignored.
    pub fn watch(&mut self, mount: impl Mount + 'static, policy: MountPolicy) {
        if self.position(mount.fragment_id()).is_some() {
            warn!("[Reconciler] '{}' is already watched", mount.fragment_id());
            return;
        }
        info!(
            "[Reconciler] watching '{}' under anchor '{}' ({:?})",
            mount.fragment_id(),
            mount.anchor_id(),
            policy
        );
        self.watches.push(Watch {
            mount: Box::new(mount),
            policy,
            record: MountRecord::default(),
        });
    }

    /// Stop watching `fragment_id` and take it out of the page. Returns whether it was watched.
    pub async fn unwatch(&mut self, fragment_id: &str) -> bool {
        let Some(index) = self.position(fragment_id) else {
            return false;
        };
        self.watches.remove(index);
        if let Err(e) = self.page.remove(fragment_id).await {
            debug!("[Reconciler] removing '{}' failed: {:#}", fragment_id, e);
        }
        info!("[Reconciler] stopped watching '{}'", fragment_id);
        true
    }

    /// A new document replaced the page: nothing injected survived, one-shots may show again.
    pub fn rearm_one_shots(&mut self) {
        for watch in &mut self.watches {
            watch.record.present = false;
            if watch.policy == MountPolicy::OneShot && watch.record.retired {
                watch.record.retired = false;
                debug!("[Reconciler] one-shot '{}' re-armed", watch.mount.fragment_id());
            }
        }
    }

    pub fn record(&self, fragment_id: &str) -> Option<&MountRecord> {
        self.position(fragment_id).map(|i| &self.watches[i].record)
    }

    /// Whether any watch still wants change notices.
    pub fn is_watching(&self) -> bool {
        self.watches.iter().any(|w| !w.record.retired)
    }

    /// Check the live page and mount `fragment_id` if its anchor is there and it is not.
    pub async fn ensure_mounted(&mut self, fragment_id: &str) -> MountOutcome {
        let Some(index) = self.position(fragment_id) else {
            warn!("[Reconciler] '{}' is not watched", fragment_id);
            return MountOutcome::Failed;
        };
        let page = self.page.clone();
        let watch = &mut self.watches[index];
        if watch.record.retired {
            return MountOutcome::Retired;
        }

        match page.exists(fragment_id).await {
            Ok(true) => {
                watch.record.present = true;
                return MountOutcome::AlreadyPresent;
            }
            Ok(false) => watch.record.present = false,
            Err(e) => {
                debug!("[Reconciler] presence check for '{}' failed: {:#}", fragment_id, e);
                return MountOutcome::Failed;
            }
        }

        match page.exists(watch.mount.anchor_id()).await {
            Ok(true) => {}
            Ok(false) => return MountOutcome::AnchorMissing,
            Err(e) => {
                debug!(
                    "[Reconciler] anchor check '{}' failed: {:#}",
                    watch.mount.anchor_id(),
                    e
                );
                return MountOutcome::Failed;
            }
        }

        match watch.mount.mount(&page).await {
            Ok(true) => {
                watch.record.present = true;
                watch.record.mounts += 1;
                info!(
                    "[Reconciler] mounted '{}' (mount #{})",
                    fragment_id, watch.record.mounts
                );
                if watch.policy == MountPolicy::OneShot {
                    watch.record.retired = true;
                    info!("[Reconciler] one-shot '{}' retired", fragment_id);
                }
                MountOutcome::Mounted
            }
            Ok(false) => MountOutcome::AnchorMissing,
            Err(e) => {
                warn!("[Reconciler] mounting '{}' failed: {:#}", fragment_id, e);
                MountOutcome::Failed
            }
        }
    }

    /// Re-evaluate every watch against the live page.
    pub async fn reconcile(&mut self) -> Vec<MountOutcome> {
        let ids: Vec<String> = self
            .watches
            .iter()
            .map(|w| w.mount.fragment_id().to_string())
            .collect();
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(self.ensure_mounted(&id).await);
        }
        outcomes
    }

    fn position(&self, fragment_id: &str) -> Option<usize> {
        self.watches
            .iter()
            .position(|w| w.mount.fragment_id() == fragment_id)
    }
}
