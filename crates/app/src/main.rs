use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use statute_rag_core::{
    answer_question, generator_from_config, AnswerGenerator, CharacterNgramEmbedder, Embedder,
    FlatIndex, IngestionOptions, LlmConfig, Retriever, RetrievedPassage,
    DEFAULT_CATEGORY_PATTERN, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type BoxedRetriever = Retriever<FlatIndex, Box<dyn Embedder>>;

#[derive(Parser)]
#[command(name = "statute-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned recursively for .txt and .pdf files
    #[arg(long, env = "RAG_DATA_DIR", default_value = "data/raw")]
    data_dir: PathBuf,

    /// Maximum characters per chunk
    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive windows of an oversized paragraph
    #[arg(long, env = "OVERLAP", default_value = "150")]
    overlap: usize,

    /// Pattern for the category label preceding each table of a table family
    #[arg(long, default_value = DEFAULT_CATEGORY_PATTERN)]
    category_pattern: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderChoice::Ngram)]
    embedder: EmbedderChoice,

    /// Vector size for the n-gram embedder
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    ngram_dimensions: usize,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    ollama_base_url: String,

    /// Ollama model name
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1")]
    ollama_model: String,

    /// OpenRouter API key; when set, answers come from OpenRouter instead of Ollama
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_api_key: Option<String>,

    /// OpenRouter model name
    #[arg(long, env = "OPENROUTER_MODEL", default_value = "openai/gpt-4o-mini")]
    openrouter_model: String,

    /// Sent to OpenRouter as HTTP-Referer
    #[arg(long, env = "APP_URL", default_value = "http://localhost")]
    app_url: String,

    /// Sent to OpenRouter as X-Title
    #[arg(long, env = "APP_NAME", default_value = "statute-rag")]
    app_name: String,

    #[arg(long, default_value = "0.2")]
    temperature: f32,

    #[arg(long, default_value = "800")]
    max_tokens: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Print the passages most similar to a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "6")]
        top_k: usize,
        /// Emit passages as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Answer one question from the retrieved passages.
    Ask {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "6")]
        top_k: usize,
    },
    /// Ask questions interactively until `exit`.
    Chat {
        #[arg(long, default_value = "6")]
        top_k: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderChoice {
    /// Hashed character trigrams, no model download
    Ngram,
    /// Multilingual transformer (requires the `fastembed` feature)
    Fastembed,
}

impl Cli {
    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.overlap,
            category_pattern: self.category_pattern.clone(),
            ..IngestionOptions::default()
        }
    }

    fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            ollama_base_url: self.ollama_base_url.clone(),
            ollama_model: self.ollama_model.clone(),
            openrouter_api_key: self.openrouter_api_key.clone(),
            openrouter_model: self.openrouter_model.clone(),
            app_url: self.app_url.clone(),
            app_name: self.app_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        match self.embedder {
            EmbedderChoice::Ngram => Ok(Box::new(CharacterNgramEmbedder {
                dimensions: self.ngram_dimensions,
            })),
            #[cfg(feature = "fastembed")]
            EmbedderChoice::Fastembed => Ok(Box::new(statute_rag_core::FastTextEmbedder::new())),
            #[cfg(not(feature = "fastembed"))]
            EmbedderChoice::Fastembed => {
                anyhow::bail!("this build was compiled without the `fastembed` feature")
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "statute-rag boot"
    );

    let retriever = build_retriever(&cli)?;

    match cli.command {
        Command::Search { ref query, top_k, json } => {
            let passages = retriever.retrieve(query, top_k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&passages)?);
            } else {
                println!("query: {query}");
                print_passages(&passages);
            }
        }
        Command::Ask { ref query, top_k } => {
            let generator = generator_from_config(&cli.llm_config())?;
            ask(&retriever, generator.as_ref(), query, top_k).await?;
        }
        Command::Chat { top_k } => {
            let generator = generator_from_config(&cli.llm_config())?;
            chat(&retriever, generator.as_ref(), top_k).await?;
        }
    }

    Ok(())
}

fn build_retriever(cli: &Cli) -> anyhow::Result<BoxedRetriever> {
    let options = cli.ingestion_options();
    let (retriever, report) = Retriever::from_folder(&cli.data_dir, &options, cli.embedder()?)
        .with_context(|| format!("failed to index {}", cli.data_dir.display()))?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            cli.data_dir.display()
        );
    }

    info!(
        folder = %cli.data_dir.display(),
        documents = report.documents.len(),
        failed_pages = report.failed_pages,
        "corpus indexed"
    );
    Ok(retriever)
}

fn print_passages(passages: &[RetrievedPassage]) {
    for passage in passages {
        let page = passage
            .page
            .map(|page| format!(" p.{page}"))
            .unwrap_or_default();
        println!("[{:.3}] {}{}", passage.score, passage.title, page);
        println!("  source={}", passage.source);
        if let Some(category) = &passage.category {
            println!("  category={category}");
        }
        println!("  text:\n{}", passage.text);
    }
}

async fn ask(
    retriever: &BoxedRetriever,
    generator: &dyn AnswerGenerator,
    query: &str,
    top_k: usize,
) -> anyhow::Result<()> {
    let answer = answer_question(retriever, generator, query, top_k).await?;

    println!("\n=== 답변 ({}) ===\n{}", generator.name(), answer.text);
    println!("\n=== 근거 ===");
    print_passages(&answer.sources);
    Ok(())
}

async fn chat(
    retriever: &BoxedRetriever,
    generator: &dyn AnswerGenerator,
    top_k: usize,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n질문 (종료하려면 'exit' 입력): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") {
            println!("프로그램을 종료합니다.");
            break;
        }

        if let Err(error) = ask(retriever, generator, query, top_k).await {
            warn!(%error, "question failed");
            println!("오류: {error}");
        }
    }

    Ok(())
}
