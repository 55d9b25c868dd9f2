use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use quill_config::AppConfig;
use quill_core::{DocumentId, ManuscriptIndex, ProjectId};
use quill_editor::{AgentAction, AgentPlan, agent_tool_schemas, find_range, plan};
use quill_index::{ManuscriptIndexer, merge_into};
use quill_llm::{LlmRouter, LlmTextService, Provider};
use quill_store::{DocumentStore, FsStore};

pub(crate) fn run_locate(file: &Path, quote: &str) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let Some(range) = find_range(&text, quote) else {
        bail!("quote not found in {}", file.display());
    };
    println!("{}..{}", range.start, range.end);
    println!("{}", &text[range]);
    Ok(())
}

/// Chapter files in `dir`, ordered by file name, keyed by file stem.
pub(crate) fn collect_chapters(dir: &Path) -> Result<Vec<(DocumentId, PathBuf)>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
        })
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_string_lossy().to_string();
            Some((DocumentId::new(stem), path))
        })
        .collect())
}

pub(crate) async fn run_index(config: &AppConfig, dir: &Path, project: Option<&str>) -> Result<()> {
    let project = match project {
        Some(project) => ProjectId::new(project),
        None => ProjectId::new(
            dir.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .unwrap_or_else(|| "manuscript".to_string()),
        ),
    };
    let chapters = collect_chapters(dir)?;
    if chapters.is_empty() {
        bail!("no .md or .txt chapters in {}", dir.display());
    }

    let router = LlmRouter::new(
        Provider::from_label(&config.llm.provider),
        config.active_model(),
        config.llm.ollama_base_url.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )?;
    let indexer = ManuscriptIndexer::new(
        Arc::new(LlmTextService::new(router)),
        config.indexer.min_text_chars,
    );
    let store = FsStore::new(config.data_dir());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    info!(project = %project, chapters = chapters.len(), model = config.active_model(), "rebuilding lore index");
    let mut index = ManuscriptIndex::default();
    let mut conflicts = 0usize;
    for (chapter, path) in &chapters {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let extraction = match indexer.extract(&text, chapter, &cancel).await {
            Ok(extraction) => extraction,
            Err(err) if err.is_cancelled() => bail!("indexing interrupted"),
            Err(err) => {
                warn!(chapter = %chapter, error = %err, "extraction failed; skipping chapter");
                continue;
            }
        };
        for contradiction in merge_into(&mut index, &extraction, chapter) {
            println!("conflict: {contradiction}");
            conflicts += 1;
        }
    }

    store.save_index(&project, &index).await?;
    println!(
        "indexed {} chapters: {} characters, {} conflicts",
        chapters.len(),
        index.len(),
        conflicts
    );
    Ok(())
}

pub(crate) fn run_agent(file: &Path, action: &str, params: &str, accept: bool) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let params = serde_json::from_str(params).context("params must be JSON")?;
    let action = AgentAction::parse(action, params)?;

    match plan(&action, &text)? {
        AgentPlan::Reply(message) => println!("{message}"),
        AgentPlan::Propose(diff) => {
            println!(
                "proposed: {} ({} -> {} bytes)",
                diff.description,
                diff.original.len(),
                diff.modified.len()
            );
            if accept {
                fs::write(file, &diff.modified)
                    .with_context(|| format!("write {}", file.display()))?;
                println!("wrote {}", file.display());
            } else {
                println!("{}", diff.modified);
                println!("(re-run with --accept to write the change)");
            }
        }
    }
    Ok(())
}

pub(crate) fn run_tools() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&agent_tool_schemas())?);
    Ok(())
}

pub(crate) fn run_config_show(config: &AppConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
