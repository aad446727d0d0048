// Console front-end: the interactive chat loop and the one-shot build tool

use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::models::{Answer, IngestResult, Query};
use crate::pipeline::RagContext;

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "q"];
const PREVIEW_CHARS: usize = 200;

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|c| input.eq_ignore_ascii_case(c))
}

/// First `max_chars` characters with newlines flattened to spaces.
pub fn preview(content: &str, max_chars: usize) -> String {
    content
        .chars()
        .take(max_chars)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

fn format_answer(answer: &Answer) -> String {
    let mut out = format!("\nAI: {}\n\n[Sources Used:]\n", answer.text);
    for retrieved in &answer.context {
        out.push_str(&format!(
            " - {} (Chunk ID: {})\n   Preview: \"{}...\"\n\n",
            retrieved.chunk.source,
            retrieved.chunk.chunk_id,
            preview(&retrieved.chunk.content, PREVIEW_CHARS)
        ));
    }
    out.push_str(&"-".repeat(50));
    out.push('\n');
    out
}

/// Read questions line by line until an exit word or end of input.
/// A failed question is reported and the loop continues.
pub async fn run_chat_loop<R, W>(
    rag: &RagContext,
    top_k: usize,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all("✅ RAG System Ready! Type 'exit' to quit.\n\n".as_bytes())
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        output.write_all(b"Thinking...\n").await?;
        match rag.answer(&Query::new(line.trim(), top_k), None).await {
            Ok(answer) => output.write_all(format_answer(&answer).as_bytes()).await?,
            Err(e) => {
                error!(error = %e, "Question failed");
                output.write_all(format!("\nError: {}\n", e).as_bytes()).await?;
            }
        }
    }

    output.flush().await
}

/// Ingest every document in `docs_dir`. A missing directory is created and
/// nothing is ingested.
pub async fn run_build(rag: &RagContext, docs_dir: &Path) -> anyhow::Result<Option<IngestResult>> {
    if !fs::try_exists(docs_dir).await? {
        fs::create_dir_all(docs_dir).await?;
        println!(
            "⚠️ Created folder {}. Please add your PDF files there and run again.",
            docs_dir.display()
        );
        return Ok(None);
    }

    println!("📂 Loading documents from {}...", docs_dir.display());
    let result = rag.ingest(docs_dir).await?;
    info!(chunks_added = result.chunks_added, "Build finished");
    println!("🎉 Added {} chunks to the database.", result.chunks_added);
    Ok(Some(result))
}
