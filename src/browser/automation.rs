use crate::dom::fragments::BUTTON_ID;
use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventDomContentEventFired,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::info;

/// Called by the page on every (coalesced) structural change.
pub const CHANGED_BINDING: &str = "__docUploadChanged";
/// Called by the page with the picked target and files.
pub const SUBMIT_BINDING: &str = "__docUploadSubmit";

/// Connect to Chrome via CDP and find the host app's tab, opening one if needed.
pub async fn connect_to_chrome(port: u16, app_url: &str) -> Result<(Browser, Page)> {
    let debug_url = format!("http://127.0.0.1:{}", port);

    let (browser, mut handler) = Browser::connect(&debug_url)
        .await
        .context(format!("Failed to connect to Chrome on port {}", port))?;

    // Spawn the handler to process CDP events
    tokio::spawn(async move {
        while let Some(_event) = handler.next().await {}
    });

    let pages = browser.pages().await.context("Failed to get pages")?;
    for page in pages {
        let url = page.url().await.ok().flatten().unwrap_or_default();
        if is_app_page(&url, app_url) {
            info!("Connected to Chrome CDP on port {}, using tab {}", port, url);
            return Ok((browser, page));
        }
    }

    info!("No tab open on {}, opening one", app_url);
    let page = browser
        .new_page(app_url)
        .await
        .context("Failed to open host app tab")?;
    Ok((browser, page))
}

fn is_app_page(page_url: &str, app_url: &str) -> bool {
    let (Ok(page), Ok(app)) = (reqwest::Url::parse(page_url), reqwest::Url::parse(app_url)) else {
        return false;
    };
    page.origin() == app.origin()
}

/// Install the bindings and the page-side helper, now and for every future document.
pub async fn install_page_helper(page: &Page) -> Result<()> {
    for name in [CHANGED_BINDING, SUBMIT_BINDING] {
        page.execute(AddBindingParams::new(name))
            .await
            .context(format!("Failed to add binding {}", name))?;
    }

    let script = page_helper_script();
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
        .await
        .context("Failed to register page helper")?;

    let state: String = page
        .evaluate(script.as_str())
        .await
        .context("Failed to run page helper")?
        .into_value()
        .unwrap_or_else(|_| "unknown".into());
    info!("Page helper: {}", state);
    Ok(())
}

/// Payloads of calls to binding `name`.
pub async fn binding_payloads(page: &Page, name: &'static str) -> Result<BoxStream<'static, String>> {
    let events = page
        .event_listener::<EventBindingCalled>()
        .await
        .context("Failed to listen for binding calls")?;

    Ok(events
        .filter_map(move |event| {
            let payload = (event.name == name).then(|| event.payload.clone());
            async move { payload }
        })
        .boxed())
}

/// One item per document in this tab that reaches DOMContentLoaded.
pub async fn document_loads(page: &Page) -> Result<BoxStream<'static, ()>> {
    let events = page
        .event_listener::<EventDomContentEventFired>()
        .await
        .context("Failed to listen for document loads")?;
    Ok(events.map(|_| ()).boxed())
}

/// Watches the DOM, coalesces change notices per microtask, and turns button
/// clicks into target selection, file picking and a submit call.
fn page_helper_script() -> String {
    format!(
        r#"
        (function() {{
            if (window.__docUploadHelper) return 'present';
            window.__docUploadHelper = true;

            let pending = false;
            const schedule = () => {{
                if (pending) return;
                pending = true;
                queueMicrotask(() => {{
                    pending = false;
                    try {{ window.{changed}(''); }} catch (_) {{}}
                }});
            }};
            const observe = () => {{
                new MutationObserver(schedule).observe(document.body, {{ childList: true, subtree: true }});
                schedule();
            }};
            if (document.body) observe(); else document.addEventListener('DOMContentLoaded', observe);

            const submit = (target, mode, files) => {{
                Promise.all(files.map(file => new Promise((resolve, reject) => {{
                    const reader = new FileReader();
                    reader.onload = () => resolve({{ name: file.name, data: String(reader.result).split(',')[1] || '' }});
                    reader.onerror = () => reject(reader.error);
                    reader.readAsDataURL(file);
                }})))
                    .then(encoded => window.{submit}(JSON.stringify({{ target, mode, files: encoded }})))
                    .catch(err => console.error('Reading picked files failed:', err));
            }};

            const pickFiles = (button, target) => {{
                const mode = button.dataset.mode || 'batch';
                const input = document.createElement('input');
                input.type = 'file';
                input.accept = button.dataset.accept || '';
                input.multiple = mode !== 'single';
                input.style.display = 'none';
                document.body.appendChild(input);
                input.addEventListener('change', () => {{
                    const files = Array.from(input.files || []);
                    input.remove();
                    submit(target, mode, files);
                }});
                input.click();
            }};

            const openPicker = (button) => {{
                const dropdownId = button.dataset.dropdown;
                const existing = document.getElementById(dropdownId);
                if (existing) existing.remove();

                let targets = [];
                try {{ targets = JSON.parse(button.dataset.targets || '[]'); }} catch (_) {{}}

                const select = document.createElement('select');
                select.id = dropdownId;
                select.style.marginLeft = '8px';
                const placeholder = document.createElement('option');
                placeholder.value = '';
                placeholder.textContent = 'Select organization...';
                placeholder.disabled = true;
                placeholder.selected = true;
                select.appendChild(placeholder);
                targets.forEach(t => {{
                    const opt = document.createElement('option');
                    opt.value = t;
                    opt.textContent = t;
                    select.appendChild(opt);
                }});

                button.parentNode.insertBefore(select, button.nextSibling);
                select.focus();
                select.addEventListener('change', () => {{
                    const target = select.value;
                    select.remove();
                    pickFiles(button, target);
                }});
            }};

            document.addEventListener('click', (event) => {{
                const button = event.target.closest && event.target.closest('#{button}');
                if (button) openPicker(button);
            }}, true);
            return 'installed';
        }})()
        "#,
        changed = CHANGED_BINDING,
        submit = SUBMIT_BINDING,
        button = BUTTON_ID,
    )
}
