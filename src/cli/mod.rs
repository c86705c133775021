//! Command implementations for the `webforge` binary

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::Mutex;

use crate::attachments::{format_size, Upload};
use crate::config::Config;
use crate::conversation::ChatService;
use crate::llm::{Orchestrator, ProviderKind};
use crate::preview::compose_preview;
use crate::project::{ChatRole, Project};
use crate::store::{JsonFileBackend, ProjectStore};

/// Changes requested by `webforge settings`
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub ollama_url: Option<String>,
    pub lm_studio_url: Option<String>,
    pub ollama_model: Option<String>,
    pub lm_studio_model: Option<String>,
    pub clear_ollama_url: bool,
    pub clear_lm_studio_url: bool,
}

impl SettingsUpdate {
    fn is_empty(&self) -> bool {
        self.ollama_url.is_none()
            && self.lm_studio_url.is_none()
            && self.ollama_model.is_none()
            && self.lm_studio_model.is_none()
            && !self.clear_ollama_url
            && !self.clear_lm_studio_url
    }
}

/// Open the file-backed store for the configured data directory
pub fn open_store(config: &Config) -> Result<ProjectStore> {
    let data_dir = config.data_dir();
    tracing::debug!("Using data directory {}", data_dir.display());
    let backend = JsonFileBackend::new(&data_dir)?;
    ProjectStore::load(Box::new(backend))
        .with_context(|| format!("Failed to load projects from {}", data_dir.display()))
}

fn resolve_id(store: &ProjectStore, id: &str) -> Result<String> {
    Ok(store.resolve(id)?.id.clone())
}

pub fn run_new(config: &Config, name: &str) -> Result<()> {
    let mut store = open_store(config)?;
    let project = store.create(name)?;
    println!(
        "{} Created project {} ({})",
        "✓".green(),
        project.name.bold(),
        project.id
    );
    Ok(())
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Messages")]
    messages: usize,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Archived")]
    archived: String,
}

pub fn run_list(config: &Config, include_archived: bool) -> Result<()> {
    let store = open_store(config)?;
    let mut projects: Vec<&Project> = store
        .projects()
        .iter()
        .filter(|p| include_archived || !p.archived)
        .collect();

    if projects.is_empty() {
        println!("No projects yet. Create one with `webforge new <name>`.");
        return Ok(());
    }

    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    let rows: Vec<ProjectRow> = projects
        .iter()
        .map(|p| ProjectRow {
            id: p.short_id().to_string(),
            name: p.name.clone(),
            files: p.files.len(),
            messages: p.messages.len(),
            updated: p.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            archived: if p.archived { "yes" } else { "" }.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}

pub fn run_show(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let project = store.resolve(id)?;

    println!("{}", project.name.bold().cyan());
    println!("ID:       {}", project.id);
    println!(
        "Updated:  {}",
        project.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if project.archived {
        println!("Status:   {}", "archived".yellow());
    }

    println!("\n{} ({})", "Files".bold(), project.files.len());
    for file in &project.files {
        println!(
            "  {:<24} {:<10} {}",
            file.name,
            file.file_type,
            format_size(file.content.len())
        );
    }

    println!("\n{} ({})", "Chat".bold(), project.messages.len());
    for message in &project.messages {
        let who = match message.role {
            ChatRole::User => "you".blue(),
            ChatRole::Assistant if message.is_error() => "ai".red(),
            ChatRole::Assistant => "ai".green(),
        };
        println!("  {}: {}", who, message.content);
        if let Some(attachments) = &message.attachments {
            for a in attachments {
                println!("       + {} ({})", a.name, a.mime_type);
            }
        }
    }
    Ok(())
}

pub fn run_rename(config: &Config, id: &str, name: &str) -> Result<()> {
    let mut store = open_store(config)?;
    let id = resolve_id(&store, id)?;
    if store.rename(&id, name)? {
        println!("{} Renamed to {}", "✓".green(), name.trim().bold());
    } else {
        println!("Name must not be blank; nothing changed.");
    }
    Ok(())
}

pub fn run_archive(config: &Config, id: &str, archived: bool) -> Result<()> {
    let mut store = open_store(config)?;
    let id = resolve_id(&store, id)?;
    store.set_archived(&id, archived)?;
    let verb = if archived { "Archived" } else { "Unarchived" };
    println!("{} {} project {}", "✓".green(), verb, id);
    Ok(())
}

/// Delete a project, asking on stdin unless `yes` is set
pub fn run_delete(config: &Config, id: &str, yes: bool) -> Result<()> {
    let mut store = open_store(config)?;
    let id = resolve_id(&store, id)?;

    let deleted = store.delete(&id, |project| yes || confirm_delete(project))?;
    if deleted {
        println!("{} Deleted project {}", "✓".green(), id);
    } else {
        println!("Cancelled.");
    }
    Ok(())
}

fn confirm_delete(project: &Project) -> bool {
    print!(
        "Delete project '{}'? This cannot be undone. [y/N] ",
        project.name
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(_) => matches!(input.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Run one chat turn and report the generated files
pub async fn run_generate(
    config: &Config,
    id: &str,
    prompt: &str,
    provider: Option<&str>,
    attach: &[PathBuf],
) -> Result<()> {
    let provider: ProviderKind = provider
        .unwrap_or(&config.llm.default_provider)
        .parse()?;

    let mut uploads = Vec::with_capacity(attach.len());
    for path in attach {
        uploads.push(Upload::from_path(path).await?);
    }

    let store = open_store(config)?;
    let orchestrator = Orchestrator::new(config)?;
    let chat = ChatService::new(Arc::new(Mutex::new(store)), Arc::new(orchestrator));

    println!("{} Generating with {}...", "→".cyan(), provider);
    let project = chat.send(id, prompt, provider, uploads).await?;

    if let Some(summary) = project.messages.last() {
        println!("{} {}", "✓".green(), summary.content);
    }
    Ok(())
}

/// Write the composed preview to a file, or stdout
pub fn run_preview(config: &Config, id: &str, output: Option<&Path>) -> Result<()> {
    let store = open_store(config)?;
    let project = store.resolve(id)?;
    let doc = compose_preview(&project.files);

    match output {
        Some(path) => {
            std::fs::write(path, &doc.html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Wrote preview to {}", "✓".green(), path.display());
        }
        None => print!("{}", doc.html),
    }
    Ok(())
}

pub fn run_settings(config: &Config, update: SettingsUpdate) -> Result<()> {
    let mut store = open_store(config)?;

    if !update.is_empty() {
        let mut settings = store.settings().clone();
        if update.clear_ollama_url {
            settings.ollama_url = None;
        }
        if update.clear_lm_studio_url {
            settings.lm_studio_url = None;
        }
        if let Some(url) = update.ollama_url {
            settings.ollama_url = Some(url);
        }
        if let Some(url) = update.lm_studio_url {
            settings.lm_studio_url = Some(url);
        }
        if let Some(model) = update.ollama_model {
            settings.ollama_model = Some(model);
        }
        if let Some(model) = update.lm_studio_model {
            settings.lm_studio_model = Some(model);
        }
        store.update_settings(settings)?;
        println!("{} Settings saved", "✓".green());
    }

    let settings = store.settings();
    let unset = || "(not set)".dimmed().to_string();
    println!(
        "Ollama URL:      {}",
        settings.ollama_url().map(str::to_string).unwrap_or_else(unset)
    );
    println!(
        "Ollama model:    {}",
        settings
            .ollama_model
            .clone()
            .unwrap_or_else(|| config.llm.ollama.model.clone())
    );
    println!(
        "LM Studio URL:   {}",
        settings
            .lm_studio_url()
            .map(str::to_string)
            .unwrap_or_else(unset)
    );
    println!(
        "LM Studio model: {}",
        settings
            .lm_studio_model
            .clone()
            .unwrap_or_else(|| config.llm.lm_studio.model.clone())
    );
    println!(
        "Gemini API key:  {}",
        if config.gemini_api_key().is_some() {
            "set".green().to_string()
        } else {
            format!("not set (export {})", config.llm.gemini.api_key_env)
        }
    );
    Ok(())
}
