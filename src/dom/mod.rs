pub mod fragments;
pub mod reconciler;

use anyhow::Result;
use async_trait::async_trait;

pub use reconciler::{Mount, MountOutcome, MountPolicy, MountRecord, Reconciler};

/// A piece of markup injected into the host page, rooted at an element with id `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: String,
    pub html: String,
}

/// Where a fragment goes relative to an existing host element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Before(String),
    After(String),
    AppendTo(String),
}

impl Placement {
    pub fn reference_id(&self) -> &str {
        match self {
            Self::Before(id) | Self::After(id) | Self::AppendTo(id) => id,
        }
    }
}

/// The host page's DOM as seen from the controller.
#[async_trait]
pub trait HostPage: Send + Sync {
    async fn exists(&self, element_id: &str) -> Result<bool>;

    /// Insert `fragment` unless an element with its id already exists.
    /// Returns `false` when the placement reference is gone.
    async fn insert(&self, fragment: &Fragment, placement: &Placement) -> Result<bool>;

    async fn set_style(&self, element_id: &str, property: &str, value: &str) -> Result<()>;

    async fn remove(&self, element_id: &str) -> Result<()>;
}
