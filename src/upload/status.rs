use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Idle,
    InProgress,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Glyph {
    Checkmark,
    Cross,
}

/// Everything the indicator element shows at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorSnapshot {
    pub visible: bool,
    pub spinner: bool,
    pub glyph: Option<Glyph>,
    pub counter: Option<String>,
}

impl IndicatorSnapshot {
    fn hidden() -> Self {
        Self {
            visible: false,
            spinner: false,
            glyph: None,
            counter: None,
        }
    }
}

/// Where indicator snapshots are drawn.
#[async_trait]
pub trait StatusView: Send + Sync {
    async fn render(&self, snapshot: &IndicatorSnapshot) -> Result<()>;
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("status indicator is busy ({0:?})")]
pub struct IndicatorBusy(pub StatusState);

struct Inner {
    state: StatusState,
    snapshot: IndicatorSnapshot,
}

/// Four-state status icon. State lives here; the view is only a projection of it,
/// so a freshly mounted element can be redrawn with [`StatusIndicator::refresh`].
pub struct StatusIndicator {
    view: Arc<dyn StatusView>,
    inner: Mutex<Inner>,
}

impl StatusIndicator {
    pub fn new(view: Arc<dyn StatusView>) -> Self {
        Self {
            view,
            inner: Mutex::new(Inner {
                state: StatusState::Idle,
                snapshot: IndicatorSnapshot::hidden(),
            }),
        }
    }

    pub async fn state(&self) -> StatusState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> IndicatorSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    /// Idle -> InProgress. With `total` the counter label starts at `0/total`.
    pub async fn begin(&self, total: Option<usize>) -> Result<(), IndicatorBusy> {
        let mut inner = self.inner.lock().await;
        if inner.state != StatusState::Idle {
            return Err(IndicatorBusy(inner.state));
        }
        inner.state = StatusState::InProgress;
        inner.snapshot = IndicatorSnapshot {
            visible: true,
            spinner: true,
            glyph: None,
            counter: total.map(|t| format!("0/{}", t)),
        };
        self.draw(&inner.snapshot).await;
        Ok(())
    }

    pub async fn update_counter(&self, label: String) {
        let mut inner = self.inner.lock().await;
        if inner.state != StatusState::InProgress {
            debug!("[Status] counter update ignored in {:?}", inner.state);
            return;
        }
        inner.snapshot.counter = Some(label);
        self.draw(&inner.snapshot).await;
    }

    /// InProgress -> Success or Failure. The spinner goes away and exactly one glyph shows.
    pub async fn finish(&self, success: bool) {
        let mut inner = self.inner.lock().await;
        if inner.state != StatusState::InProgress {
            debug!("[Status] finish ignored in {:?}", inner.state);
            return;
        }
        let (state, glyph) = if success {
            (StatusState::Success, Glyph::Checkmark)
        } else {
            (StatusState::Failure, Glyph::Cross)
        };
        inner.state = state;
        inner.snapshot.spinner = false;
        inner.snapshot.glyph = Some(glyph);
        self.draw(&inner.snapshot).await;
    }

    /// Back to Idle: hidden, no glyph, no label.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = StatusState::Idle;
        inner.snapshot = IndicatorSnapshot::hidden();
        self.draw(&inner.snapshot).await;
    }

    /// Redraw the current state, e.g. after the host rebuilt the element.
    pub async fn refresh(&self) {
        let inner = self.inner.lock().await;
        self.draw(&inner.snapshot).await;
    }

    async fn draw(&self, snapshot: &IndicatorSnapshot) {
        if let Err(e) = self.view.render(snapshot).await {
            debug!("[Status] render failed: {:#}", e);
        }
    }
}
