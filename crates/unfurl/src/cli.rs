//! CLI commands
//!
//! Each command builds an engine from the loaded config and reports to
//! stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::Path;
use std::sync::Arc;
use unfurl_core::{
    Document, ReqwestTransport, Tenant, TenantRegistry, Transport, UnfurlConfig, UnfurlEngine,
};
use url::Url;

/// Flags shared by every engine-backed command
pub struct EngineOptions {
    pub persist: bool,
    pub api_origin: Option<Url>,
}

fn build_engine(config: &UnfurlConfig, options: &EngineOptions) -> Result<UnfurlEngine> {
    let store = UnfurlEngine::open_store(config, options.persist)?;

    let mut transport = ReqwestTransport::new();
    if let Some(origin) = &options.api_origin {
        transport = transport.with_origin(origin.clone());
    }
    let transport: Arc<dyn Transport> = Arc::new(transport);

    UnfurlEngine::from_config(config, store, transport).context("Invalid tenant configuration")
}

pub async fn run_render(
    config: &UnfurlConfig,
    options: &EngineOptions,
    file: &Path,
    page_url: Option<Url>,
    output: Option<&Path>,
) -> Result<()> {
    let html = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let base_url = match page_url {
        Some(url) => Some(url),
        None => file_url(file),
    };

    let engine = build_engine(config, options)?;
    let doc = Document::from_html(&html, base_url);
    let report = engine.unfurl_document(&doc).await;
    let rendered = doc.to_html();

    match output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", rendered),
    }

    eprintln!(
        "✓ {} link(s) found, {} title(s) applied",
        report.links, report.titles
    );
    Ok(())
}

/// `file://` URL for a local path; relative hrefs in the page resolve against it
fn file_url(file: &Path) -> Option<Url> {
    let absolute = std::fs::canonicalize(file).ok()?;
    Url::from_file_path(absolute).ok()
}

pub async fn run_title(
    config: &UnfurlConfig,
    options: &EngineOptions,
    url: &Url,
    page_url: Option<&Url>,
) -> Result<()> {
    let engine = build_engine(config, options)?;
    let page_host = page_url.and_then(|u| u.host_str());

    match engine.router().title_for(url, page_host).await {
        Some(title) => {
            println!("{}", title);
            Ok(())
        }
        None => bail!("No title for {}", url),
    }
}

pub async fn run_sweep(config: &UnfurlConfig, options: &EngineOptions) -> Result<()> {
    let engine = build_engine(config, options)?;
    let removed = engine
        .client()
        .sweep_expired(config.cache.sweep_max_age())
        .await;

    println!("✓ Removed {} expired cache entries", removed);
    Ok(())
}

pub async fn run_clear_cache(config: &UnfurlConfig, options: &EngineOptions) -> Result<()> {
    let engine = build_engine(config, options)?;
    engine
        .client()
        .clear()
        .await
        .context("Failed to clear response cache")?;

    println!("✅ Cache cleared successfully");
    Ok(())
}

pub fn run_tenants(config: &UnfurlConfig, json: bool) -> Result<()> {
    let registry = config.registry().context("Invalid tenant configuration")?;
    let tenants = registry.list();

    if json {
        let domains: Vec<&str> = tenants.iter().map(|t| t.domain.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&domains)?);
    } else {
        println!("{}", format_tenants_table(&tenants));
    }
    Ok(())
}

/// Domains only; credentials never leave the config
pub fn format_tenants_table(tenants: &[Tenant]) -> String {
    if tenants.is_empty() {
        return "No tenants configured.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::Cyan),
        Cell::new("Domain").fg(Color::Cyan),
    ]);

    for (i, tenant) in tenants.iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(&tenant.domain)]);
    }

    table.to_string()
}
