use crate::dom::fragments::STATUS_ICON_ID;
use crate::dom::{Fragment, HostPage, Placement};
use crate::session::CookieSource;
use crate::upload::status::{IndicatorSnapshot, StatusView};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::page::Page;
use log::debug;

/// The live host tab, driven over CDP.
#[derive(Clone)]
pub struct CdpHostPage {
    page: Page,
}

impl CdpHostPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self
            .page
            .evaluate(script)
            .await
            .context("CDP evaluate failed")?
            .into_value()
            .context("Unexpected evaluate result")?;
        Ok(value)
    }
}

/// Quote `value` as a JS string literal.
fn js_str(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn insert_script(fragment: &Fragment, placement: &Placement) -> String {
    let place = match placement {
        Placement::Before(_) => "ref.parentNode.insertBefore(node, ref);",
        Placement::After(_) => "ref.parentNode.insertBefore(node, ref.nextSibling);",
        Placement::AppendTo(_) => "ref.appendChild(node);",
    };
    let needs_parent = !matches!(placement, Placement::AppendTo(_));

    format!(
        r#"
        (function() {{
            if (document.getElementById({id})) return 'present';
            const ref = document.getElementById({reference});
            if (!ref || ({needs_parent} && !ref.parentNode)) return 'missing';
            const tpl = document.createElement('template');
            tpl.innerHTML = {html}.trim();
            const node = tpl.content.firstElementChild;
            if (!node) return 'empty';
            {place}
            return 'inserted';
        }})()
        "#,
        id = js_str(&fragment.id),
        reference = js_str(placement.reference_id()),
        needs_parent = needs_parent,
        html = js_str(&fragment.html),
        place = place,
    )
}

fn render_script(snapshot: &IndicatorSnapshot) -> Result<String> {
    let snapshot = serde_json::to_string(snapshot)?;
    Ok(format!(
        r#"
        (function(s) {{
            const icon = document.getElementById({icon});
            if (!icon) return false;
            icon.style.display = s.visible ? 'flex' : 'none';
            icon.style.alignItems = 'center';
            const spinner = icon.querySelector('.loading-spinner');
            const check = icon.querySelector('.success-check');
            const cross = icon.querySelector('.error-cross');
            if (spinner) spinner.style.display = s.spinner ? 'block' : 'none';
            if (check) {{
                check.classList.toggle('show', s.glyph === 'checkmark');
                check.style.animation = s.glyph === 'checkmark' ? 'checkmark-pop 0.3s ease-out forwards' : '';
            }}
            if (cross) {{
                cross.classList.toggle('show', s.glyph === 'cross');
                cross.style.animation = s.glyph === 'cross' ? 'cross-pop 0.3s ease-out forwards' : '';
            }}
            let label = icon.querySelector('.progress-text');
            if (s.counter === null) {{
                if (label) label.remove();
            }} else {{
                if (!label) {{
                    label = document.createElement('span');
                    label.className = 'progress-text';
                    icon.appendChild(label);
                }}
                label.innerText = s.counter;
            }}
            return true;
        }})({snapshot})
        "#,
        icon = js_str(STATUS_ICON_ID),
        snapshot = snapshot,
    ))
}

#[async_trait]
impl HostPage for CdpHostPage {
    async fn exists(&self, element_id: &str) -> Result<bool> {
        self.eval(&format!("document.getElementById({}) !== null", js_str(element_id)))
            .await
    }

    async fn insert(&self, fragment: &Fragment, placement: &Placement) -> Result<bool> {
        let outcome: String = self.eval(&insert_script(fragment, placement)).await?;
        debug!("[Page] insert '{}': {}", fragment.id, outcome);
        Ok(matches!(outcome.as_str(), "inserted" | "present"))
    }

    async fn set_style(&self, element_id: &str, property: &str, value: &str) -> Result<()> {
        let script = format!(
            "(function() {{ const el = document.getElementById({}); if (el) el.style.setProperty({}, {}); return !!el; }})()",
            js_str(element_id),
            js_str(property),
            js_str(value)
        );
        let _found: bool = self.eval(&script).await?;
        Ok(())
    }

    async fn remove(&self, element_id: &str) -> Result<()> {
        let script = format!(
            "(function() {{ const el = document.getElementById({}); if (el) el.remove(); return !!el; }})()",
            js_str(element_id)
        );
        let _found: bool = self.eval(&script).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusView for CdpHostPage {
    async fn render(&self, snapshot: &IndicatorSnapshot) -> Result<()> {
        let drawn: bool = self.eval(&render_script(snapshot)?).await?;
        if !drawn {
            debug!("[Page] no live status icon to draw into");
        }
        Ok(())
    }
}

#[async_trait]
impl CookieSource for CdpHostPage {
    async fn cookie_header(&self) -> Result<String> {
        let cookies = self.page.get_cookies().await.context("Failed to read cookies")?;
        Ok(cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }
}
