//! CodeScope CLI — command-line search and indexing tool.
//!
//! Calls `codescope-index-facade` directly with no server overhead.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use codescope_index_core::config::Config;
use codescope_index_core::embedder::{Embedder, HashingEmbedder};
use codescope_index_facade::{
    CreateIndexRequest, FileSummaryRequest, IndexFacade, ReindexFileRequest, SearchByPathRequest, SearchModeParam,
    SearchRequest, Status,
};

/// CodeScope CLI — indexing and hybrid code search from the terminal.
#[derive(Parser)]
#[command(name = "csi", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a full index for the project
    Index {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Rebuild the full index from scratch
    Reindex {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Search code by meaning and keywords
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        top_k: usize,

        /// Search mode: vector, keyword, or hybrid
        #[arg(long)]
        mode: Option<String>,

        /// Hybrid fusion weight toward vector score, 0.0–1.0
        #[arg(long)]
        alpha: Option<f64>,

        /// Search documentation instead of code
        #[arg(long)]
        docs: bool,
    },
    /// Search for files by path glob
    Path {
        /// Glob pattern
        pattern: String,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        top_k: usize,
    },
    /// Show the index status for the project
    Status,
    /// Delete the index for the project
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Re-index a single file
    File {
        /// Path, relative to the project root
        path: String,
    },
    /// Print a structural summary for a single file
    Summary {
        /// Path, relative to the project root
        path: String,
    },
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
        .canonicalize()
        .expect("path not found")
}

fn state_dir_for(root: &std::path::Path) -> PathBuf {
    root.join(".codescope-index")
}

/// Builds the real `fastembed`-backed embedder when the CLI is compiled
/// with the `semantic` feature, falling back to the deterministic hashing
/// embedder (no model download, no GPU) when it isn't, or if loading the
/// configured model fails at startup.
fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    #[cfg(feature = "semantic")]
    {
        match codescope_index_core::embedder::FastEmbedEmbedder::load(&config.embedding_model) {
            Ok(e) => return Arc::new(e),
            Err(e) => eprintln!("warning: falling back to the hashing embedder ({})", e.user_message),
        }
    }
    #[cfg(not(feature = "semantic"))]
    let _ = config;
    Arc::new(HashingEmbedder::new(384))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("codescope=warn".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = resolve_root(cli.root.clone());
    let state_dir = state_dir_for(&root);
    let config = Config::load_or_default(&state_dir.join("config.json"))
        .unwrap_or_else(|e| {
            eprintln!("warning: using default config ({})", e.user_message);
            Config::default()
        })
        .merge_toml_overrides(&root);
    let embedder = build_embedder(&config);

    let facade = match IndexFacade::open(root.clone(), state_dir, config, embedder).await {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open index: {}", e.user_message);
            std::process::exit(1);
        }
    };

    let json = cli.json;
    let result = run_command(cli.command, &facade, json).await;
    if let Err(e) = result {
        if json {
            println!("{}", serde_json::json!({"error": {"code": e.code.to_string(), "message": e.user_message}}));
        } else {
            eprintln!("error: {}", e.user_message);
        }
        std::process::exit(1);
    }
}

async fn run_command(cmd: Commands, facade: &IndexFacade, json: bool) -> codescope_index_core::error::Result<()> {
    match cmd {
        Commands::Index { yes } | Commands::Reindex { yes } => {
            let req = CreateIndexRequest { project_path: facade.manager().project_root().to_path_buf(), confirmed: Some(yes) };
            let resp = facade.create_index(req, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "status": resp.status,
                    "filesIndexed": resp.files_indexed,
                    "chunksCreated": resp.chunks_created,
                    "durationMs": resp.duration_ms,
                })).unwrap());
            } else if resp.status == Status::Cancelled {
                eprintln!("index build cancelled — pass --yes to confirm a full (re)index");
            } else {
                println!(
                    "indexed {} files, {} chunks in {}ms",
                    resp.files_indexed.unwrap_or(0),
                    resp.chunks_created.unwrap_or(0),
                    resp.duration_ms.unwrap_or(0)
                );
            }
        }
        Commands::Search { query, top_k, mode, alpha, docs } => {
            let mode = mode.as_deref().map(parse_mode).transpose()?;
            let req = SearchRequest { query, top_k: Some(top_k), mode, alpha };
            let resp = if docs { facade.search_docs(req).await? } else { facade.search_code(req).await? };
            print_search_response(&resp, json);
        }
        Commands::Path { pattern, top_k } => {
            let resp = facade.search_by_path(SearchByPathRequest { pattern, top_k: Some(top_k) }).await?;
            print_search_response(&resp, json);
        }
        Commands::Status => {
            let resp = facade.get_index_status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "status": resp.status,
                    "projectPath": resp.project_path,
                    "totalFiles": resp.total_files,
                    "totalChunks": resp.total_chunks,
                    "lastUpdated": resp.last_updated,
                })).unwrap());
            } else {
                println!("Status:       {}", resp.status);
                println!("Project:      {}", resp.project_path.unwrap_or_default());
                println!("Files:        {}", resp.total_files.unwrap_or(0));
                println!("Chunks:       {}", resp.total_chunks.unwrap_or(0));
            }
        }
        Commands::Delete { yes } => {
            if !yes {
                eprintln!("pass --yes to confirm deleting the index");
                std::process::exit(1);
            }
            let resp = facade.delete_index().await?;
            if json {
                println!("{}", serde_json::json!({"status": resp.status}));
            } else {
                println!("index deleted");
            }
        }
        Commands::File { path } => {
            let resp = facade.reindex_file(ReindexFileRequest { path }).await?;
            if json {
                println!("{}", serde_json::json!({"status": resp.status, "chunksUpdated": resp.chunks_updated}));
            } else {
                println!("{} chunks updated", resp.chunks_updated);
            }
        }
        Commands::Summary { path } => {
            let summary = facade
                .get_file_summary(FileSummaryRequest { path, include_complexity: Some(true), include_docstrings: Some(true) })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary).unwrap());
            } else {
                println!("{} ({})", summary.path, summary.language);
                println!("  lines: {} (code {}, blank {}, comment {})", summary.lines, summary.code_lines, summary.blank_lines, summary.comment_lines);
                println!("  functions: {}  classes: {}", summary.functions.len(), summary.classes.len());
                println!("  complexity score: {}/100", summary.complexity.score_0_100);
            }
        }
    }
    Ok(())
}

fn parse_mode(s: &str) -> codescope_index_core::error::Result<SearchModeParam> {
    match s {
        "vector" => Ok(SearchModeParam::Vector),
        "keyword" => Ok(SearchModeParam::Keyword),
        "hybrid" => Ok(SearchModeParam::Hybrid),
        other => Err(codescope_index_core::error::Error::invalid_input(format!("unknown search mode '{other}'"))),
    }
}

fn print_search_response(resp: &codescope_index_facade::SearchResponse, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(resp).unwrap());
        return;
    }
    if resp.results.is_empty() {
        eprintln!("no results");
        return;
    }
    for r in &resp.results {
        println!("{}:{}-{}  {:.3}", r.path, r.start_line, r.end_line, r.score);
    }
    eprintln!("\n{} results in {}ms", resp.total_results, resp.search_time_ms);
}
