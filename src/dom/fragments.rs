use super::reconciler::Mount;
use super::{Fragment, HostPage, Placement};
use crate::config::{AnchorIds, InjectorConfig};
use crate::upload::{StatusIndicator, UploadTarget};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

pub const CONTAINER_ID: &str = "upload-button-container";
pub const STATUS_ICON_ID: &str = "upload-status-icon";
pub const BUTTON_ID: &str = "upload-document-button";
pub const DROPDOWN_ID: &str = "user-group-dropdown";
pub const TIP_ID: &str = "org-switch-tip";

const BUTTON_CLASS: &str = "inline-flex items-center px-4 py-2 text-sm font-medium rounded-md text-gray-700 bg-white hover:bg-gray-50 focus:outline-none border border-gray-300 shadow-sm";

const STATUS_STYLE: &str = r#"
.loading-spinner { position: absolute; width: 100%; height: 100%; border: 2px solid #e0e0e0; border-top-color: #3b82f6; border-radius: 50%; animation: spinner 0.8s cubic-bezier(0.5, 0, 0.5, 1) infinite; }
.success-check, .error-cross { position: absolute; font-size: 20px; opacity: 0; transform: scale(0.5); transition: all 0.3s ease-out; }
.success-check { color: #22c55e; }
.error-cross { color: #ef4444; }
.success-check.show, .error-cross.show { opacity: 1; transform: scale(1); }
@keyframes spinner { 0% { transform: rotate(0deg); } 100% { transform: rotate(360deg); } }
@keyframes checkmark-pop { 0% { transform: scale(0.5); opacity: 0; } 70% { transform: scale(1.2); opacity: 0.7; } 100% { transform: scale(1); opacity: 1; } }
@keyframes cross-pop { 0% { transform: scale(0.5); opacity: 0; } 70% { transform: scale(1.2); opacity: 0.7; } 100% { transform: scale(1); opacity: 1; } }
.progress-text { display: flex; align-items: center; justify-content: center; min-width: 24px; height: 24px; margin-left: 8px; padding: 0 4px; border-radius: 12px; background-color: #3b82f6; color: white; font-family: system-ui, sans-serif; font-size: 0.75rem; font-weight: 500; }
"#;

/// Escape text for use inside a double- or single-quoted HTML attribute or element body.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Container holding the status icon and the upload button.
/// Targets, accept list and picker mode ride along as data attributes for the page helper.
pub fn upload_control_fragment(config: &InjectorConfig, targets: &[UploadTarget]) -> Fragment {
    let names: Vec<&str> = targets.iter().map(UploadTarget::as_str).collect();
    let targets_json = serde_json::to_string(&names).unwrap_or_else(|_| "[]".into());
    let accept = config.accepted_extensions.join(",");

    let html = format!(
        r#"<div id="{container}" style="display:flex;align-items:center;margin-right:10px;gap:8px;">
  <div id="{icon}" style="display:none;align-items:center;">
    <div class="status-container" style="position:relative;width:20px;height:20px;display:flex;align-items:center;justify-content:center;">
      <style>{style}</style>
      <div class="loading-spinner"></div>
      <div class="success-check">✓</div>
      <div class="error-cross">✗</div>
    </div>
  </div>
  <button id="{button}" type="button" class="{class}" style="cursor:pointer;" data-targets="{targets}" data-accept="{accept}" data-mode="{mode}" data-dropdown="{dropdown}">{label}</button>
</div>"#,
        container = CONTAINER_ID,
        icon = STATUS_ICON_ID,
        style = STATUS_STYLE,
        button = BUTTON_ID,
        class = BUTTON_CLASS,
        targets = escape_html(&targets_json),
        accept = escape_html(&accept),
        mode = config.picker_mode.as_str(),
        dropdown = DROPDOWN_ID,
        label = escape_html(&config.button_label),
    );

    Fragment {
        id: CONTAINER_ID.into(),
        html,
    }
}

pub fn tip_fragment(text: &str) -> Fragment {
    Fragment {
        id: TIP_ID.into(),
        html: format!(
            r#"<span id="{}" style="margin-left:8px;color:#22c55e;transition:opacity 1s;">{}</span>"#,
            TIP_ID,
            escape_html(text)
        ),
    }
}

/// The upload button + status icon, re-mounted whenever the host rebuilds its header.
pub struct UploadControlMount {
    fragment: Fragment,
    anchors: AnchorIds,
    indicator: Arc<StatusIndicator>,
}

impl UploadControlMount {
    pub fn new(config: &InjectorConfig, targets: &[UploadTarget], indicator: Arc<StatusIndicator>) -> Self {
        Self {
            fragment: upload_control_fragment(config, targets),
            anchors: config.anchors.clone(),
            indicator,
        }
    }
}

#[async_trait]
impl Mount for UploadControlMount {
    fn fragment_id(&self) -> &str {
        &self.fragment.id
    }

    fn anchor_id(&self) -> &str {
        &self.anchors.header
    }

    async fn mount(&self, page: &Arc<dyn HostPage>) -> Result<bool> {
        let placement = if page.exists(&self.anchors.readme_button).await? {
            Placement::Before(self.anchors.readme_button.clone())
        } else {
            Placement::AppendTo(self.anchors.header.clone())
        };

        let inserted = page.insert(&self.fragment, &placement).await?;
        if inserted {
            // A batch may be mid-flight; draw its state into the fresh icon.
            self.indicator.refresh().await;
        }
        Ok(inserted)
    }
}

/// Informational tip next to the settings button; fades out and removes itself.
pub struct TipMount {
    fragment: Fragment,
    anchor: String,
    visible_for: Duration,
    fade_for: Duration,
}

impl TipMount {
    pub fn new(config: &InjectorConfig) -> Self {
        Self {
            fragment: tip_fragment(&config.tip_text),
            anchor: config.anchors.settings_button.clone(),
            visible_for: config.timings.tip_visible(),
            fade_for: config.timings.tip_fade(),
        }
    }
}

#[async_trait]
impl Mount for TipMount {
    fn fragment_id(&self) -> &str {
        &self.fragment.id
    }

    fn anchor_id(&self) -> &str {
        &self.anchor
    }

    async fn mount(&self, page: &Arc<dyn HostPage>) -> Result<bool> {
        let inserted = page
            .insert(&self.fragment, &Placement::After(self.anchor.clone()))
            .await?;
        if inserted {
            let page = page.clone();
            let id = self.fragment.id.clone();
            let (visible_for, fade_for) = (self.visible_for, self.fade_for);
            tokio::spawn(async move {
                tokio::time::sleep(visible_for).await;
                if let Err(e) = page.set_style(&id, "opacity", "0").await {
                    debug!("[Tip] fade failed: {:#}", e);
                }
                tokio::time::sleep(fade_for).await;
                if let Err(e) = page.remove(&id).await {
                    debug!("[Tip] remove failed: {:#}", e);
                }
            });
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MountOutcome, MountPolicy, Reconciler};
    use crate::testing::{FakePage, RecordingView};
    use crate::upload::StatusState;

    fn targets() -> Vec<UploadTarget> {
        vec![UploadTarget::new("finance"), UploadTarget::new("r&d \"labs\"")]
    }

    fn indicator() -> (Arc<RecordingView>, Arc<StatusIndicator>) {
        let view = Arc::new(RecordingView::default());
        (view.clone(), Arc::new(StatusIndicator::new(view)))
    }

    #[test]
    fn control_fragment_escapes_targets() {
        let fragment = upload_control_fragment(&InjectorConfig::default(), &targets());
        assert_eq!(fragment.id, CONTAINER_ID);
        assert!(fragment.html.starts_with(&format!("<div id=\"{}\"", CONTAINER_ID)));
        assert!(fragment
            .html
            .contains(r#"data-targets="[&quot;finance&quot;,&quot;r&amp;d \&quot;labs\&quot;&quot;]""#));
        assert!(fragment.html.contains(r#"data-accept=".docx""#));
        assert!(fragment.html.contains(r#"data-mode="batch""#));
        assert!(fragment.html.contains(STATUS_ICON_ID));
    }

    #[test]
    fn tip_text_is_escaped() {
        let fragment = tip_fragment("<--change organization");
        assert!(fragment.html.contains("&lt;--change organization"));
    }

    #[tokio::test]
    async fn control_goes_before_readme_button_when_present() {
        let page = Arc::new(FakePage::with_roots(&["header"]));
        page.add_child("header", "logo");
        page.add_child("header", "readme-button");
        let (_view, indicator) = indicator();

        let mut reconciler = Reconciler::new(page.clone());
        reconciler.watch(
            UploadControlMount::new(&InjectorConfig::default(), &targets(), indicator),
            MountPolicy::Persistent,
        );
        reconciler.reconcile().await;

        assert_eq!(
            page.children("header"),
            vec!["logo", CONTAINER_ID, "readme-button"]
        );
    }

    #[tokio::test]
    async fn control_appends_to_header_without_readme_button() {
        let page = Arc::new(FakePage::with_roots(&["header"]));
        page.add_child("header", "logo");
        let (_view, indicator) = indicator();

        let mut reconciler = Reconciler::new(page.clone());
        reconciler.watch(
            UploadControlMount::new(&InjectorConfig::default(), &targets(), indicator),
            MountPolicy::Persistent,
        );
        reconciler.reconcile().await;

        assert_eq!(page.children("header"), vec!["logo", CONTAINER_ID]);
    }

    #[tokio::test]
    async fn remount_redraws_in_flight_indicator() {
        let page = Arc::new(FakePage::with_roots(&["header"]));
        let (view, indicator) = indicator();
        let mut reconciler = Reconciler::new(page.clone());
        reconciler.watch(
            UploadControlMount::new(&InjectorConfig::default(), &targets(), indicator.clone()),
            MountPolicy::Persistent,
        );
        reconciler.reconcile().await;

        indicator.begin(Some(4)).await.unwrap();
        indicator.update_counter("1/4".into()).await;

        page.remove_subtree("header");
        page.add_root("header");
        assert_eq!(reconciler.reconcile().await, vec![MountOutcome::Mounted]);

        let last = view.snapshots().last().cloned().unwrap();
        assert_eq!(last.counter.as_deref(), Some("1/4"));
        assert!(last.spinner);
        assert_eq!(indicator.state().await, StatusState::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn tip_fades_then_is_gone_for_good() {
        let page = Arc::new(FakePage::with_roots(&["settings-row"]));
        page.add_child("settings-row", "chat-settings-open-modal");
        page.add_child("settings-row", "new-chat");

        let mut reconciler = Reconciler::new(page.clone());
        reconciler.watch(TipMount::new(&InjectorConfig::default()), MountPolicy::OneShot);
        reconciler.reconcile().await;

        assert_eq!(
            page.children("settings-row"),
            vec!["chat-settings-open-modal", TIP_ID, "new-chat"]
        );

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(page.style(TIP_ID, "opacity").as_deref(), Some("0"));
        assert_eq!(page.count(TIP_ID), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(page.count(TIP_ID), 0);

        assert_eq!(reconciler.reconcile().await, vec![MountOutcome::Retired]);
        assert_eq!(page.count(TIP_ID), 0);
    }
}
