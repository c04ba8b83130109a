//! In-memory stand-ins for the browser, the cookie jar and the upload endpoint.

use crate::dom::{Fragment, HostPage, Placement};
use crate::groups::{Membership, MembershipSource};
use crate::session::CookieSource;
use crate::upload::status::{IndicatorSnapshot, StatusView};
use crate::upload::transport::{TransportError, UploadForm, UploadResponse, UploadTransport};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Shared ordered log so transport and view events can be checked against each other.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct StaticCookies {
    header: Mutex<Option<String>>,
}

impl StaticCookies {
    pub fn new(header: &str) -> Self {
        Self {
            header: Mutex::new(Some(header.to_string())),
        }
    }

    pub fn failing() -> Self {
        Self {
            header: Mutex::new(None),
        }
    }

    pub fn set(&self, header: &str) {
        *self.header.lock().unwrap() = Some(header.to_string());
    }
}

#[async_trait]
impl CookieSource for StaticCookies {
    async fn cookie_header(&self) -> Result<String> {
        match self.header.lock().unwrap().clone() {
            Some(header) => Ok(header),
            None => bail!("no cookie jar"),
        }
    }
}

#[derive(Default)]
pub struct RecordingView {
    snapshots: Mutex<Vec<IndicatorSnapshot>>,
    log: Option<EventLog>,
    failing: bool,
}

impl RecordingView {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn snapshots(&self) -> Vec<IndicatorSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    /// Counter labels shown while the spinner was up.
    pub fn counter_labels(&self) -> Vec<String> {
        self.snapshots()
            .into_iter()
            .filter(|s| s.spinner)
            .filter_map(|s| s.counter)
            .collect()
    }
}

#[async_trait]
impl StatusView for RecordingView {
    async fn render(&self, snapshot: &IndicatorSnapshot) -> Result<()> {
        if self.failing {
            bail!("indicator element is gone");
        }
        if let Some(log) = &self.log {
            let what = if !snapshot.visible {
                "hidden".to_string()
            } else if snapshot.glyph.is_some() {
                "glyph".to_string()
            } else {
                snapshot.counter.clone().unwrap_or_else(|| "spinner".into())
            };
            log.push(format!("render {}", what));
        }
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

pub enum Reply {
    Success,
    Rejected(&'static str),
    Transport(&'static str),
}

pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    forms: Mutex<Vec<UploadForm>>,
    log: EventLog,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>, log: EventLog) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            forms: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn forms(&self) -> Vec<UploadForm> {
        self.forms.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn send(&self, form: UploadForm) -> Result<UploadResponse, TransportError> {
        self.log.push(format!("send {}", form.file.name));
        self.forms.lock().unwrap().push(form);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Success);
        match reply {
            Reply::Success => Ok(UploadResponse {
                success: true,
                message: None,
                error: None,
            }),
            Reply::Rejected(reason) => Ok(UploadResponse {
                success: false,
                message: None,
                error: Some(reason.into()),
            }),
            Reply::Transport(reason) => Err(TransportError::Request(reason.into())),
        }
    }
}

/// Hands out memberships in order; the last one repeats.
pub struct ScriptedGroups {
    answers: Mutex<VecDeque<Membership>>,
}

impl ScriptedGroups {
    pub fn new(answers: Vec<Membership>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl MembershipSource for ScriptedGroups {
    async fn membership(&self) -> Membership {
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap_or_default()
        } else {
            answers.front().cloned().unwrap_or_default()
        }
    }
}

#[derive(Clone)]
struct Node {
    id: String,
    parent: Option<String>,
}

#[derive(Default)]
struct PageState {
    nodes: Vec<Node>,
    inserts: HashMap<String, usize>,
    exists_calls: usize,
    styles: HashMap<(String, String), String>,
    failing: bool,
}

/// A flat DOM: ordered nodes with parent links, enough for placement and teardown checks.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn with_roots(ids: &[&str]) -> Self {
        let page = Self::default();
        for id in ids {
            page.add_root(id);
        }
        page
    }

    pub fn add_root(&self, id: &str) {
        self.state.lock().unwrap().nodes.push(Node {
            id: id.into(),
            parent: None,
        });
    }

    pub fn add_child(&self, parent: &str, id: &str) {
        self.state.lock().unwrap().nodes.push(Node {
            id: id.into(),
            parent: Some(parent.into()),
        });
    }

    /// Remove a node and everything under it, like the host re-rendering a region.
    pub fn remove_subtree(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        let mut doomed = vec![id.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i].clone();
            for node in &state.nodes {
                if node.parent.as_deref() == Some(current.as_str()) {
                    doomed.push(node.id.clone());
                }
            }
            i += 1;
        }
        state.nodes.retain(|n| !doomed.contains(&n.id));
    }

    /// Throw away every node, as a full reload does, and start over with `ids`.
    pub fn replace_document(&self, ids: &[&str]) {
        self.state.lock().unwrap().nodes.clear();
        for id in ids {
            self.add_root(id);
        }
    }

    pub fn exists_calls(&self) -> usize {
        self.state.lock().unwrap().exists_calls
    }

    pub fn count(&self, id: &str) -> usize {
        self.state.lock().unwrap().nodes.iter().filter(|n| n.id == id).count()
    }

    pub fn insert_calls(&self, id: &str) -> usize {
        self.state.lock().unwrap().inserts.get(id).copied().unwrap_or(0)
    }

    pub fn children(&self, parent: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|n| n.parent.as_deref() == Some(parent))
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn style(&self, id: &str, property: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .styles
            .get(&(id.to_string(), property.to_string()))
            .cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }
}

#[async_trait]
impl HostPage for FakePage {
    async fn exists(&self, element_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.exists_calls += 1;
        if state.failing {
            bail!("page detached");
        }
        Ok(state.nodes.iter().any(|n| n.id == element_id))
    }

    async fn insert(&self, fragment: &Fragment, placement: &Placement) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            bail!("page detached");
        }
        *state.inserts.entry(fragment.id.clone()).or_default() += 1;
        if state.nodes.iter().any(|n| n.id == fragment.id) {
            return Ok(true);
        }

        let reference = placement.reference_id();
        let Some(index) = state.nodes.iter().position(|n| n.id == reference) else {
            return Ok(false);
        };
        let (at, parent) = match placement {
            Placement::Before(_) => (index, state.nodes[index].parent.clone()),
            Placement::After(_) => (index + 1, state.nodes[index].parent.clone()),
            Placement::AppendTo(_) => (state.nodes.len(), Some(reference.to_string())),
        };
        state.nodes.insert(
            at,
            Node {
                id: fragment.id.clone(),
                parent,
            },
        );
        Ok(true)
    }

    async fn set_style(&self, element_id: &str, property: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .styles
            .insert((element_id.to_string(), property.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, element_id: &str) -> Result<()> {
        self.remove_subtree(element_id);
        Ok(())
    }
}
