// Document loader for PDF and plain-text sources

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::RawDocument;
use crate::types::{AppError, AppResult};

/// Pages of one source are joined with a blank line.
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Kind used when scanning a directory: PDFs, plain text and markdown.
    /// Anything else is skipped.
    pub fn detect(path: &Path) -> Option<Self> {
        let guess = mime_guess::from_path(path).first()?;
        if guess == mime::APPLICATION_PDF {
            Some(DocumentKind::Pdf)
        } else if guess == mime::TEXT_PLAIN
            || (guess.type_() == mime::TEXT && guess.subtype() == "markdown")
        {
            Some(DocumentKind::Text)
        } else {
            None
        }
    }

    /// Kind used for uploads: PDF by extension, everything else as text.
    pub fn for_upload(path: &Path) -> Self {
        match Self::detect(path) {
            Some(DocumentKind::Pdf) => DocumentKind::Pdf,
            _ => DocumentKind::Text,
        }
    }
}

pub struct DocumentProcessor;

impl DocumentProcessor {
    /// Load a file, or every supported file directly inside a directory.
    pub async fn load_source(path: &Path) -> AppResult<Vec<RawDocument>> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|_| AppError::NotFound(format!("{}", path.display())))?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            let kind = DocumentKind::for_upload(path);
            Ok(vec![Self::load_file(path, kind).await?])
        }
    }

    async fn load_directory(dir: &Path) -> AppResult<Vec<RawDocument>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut files: Vec<(PathBuf, DocumentKind)> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match DocumentKind::detect(&path) {
                Some(kind) => files.push((path, kind)),
                None => debug!(path = %path.display(), "Skipping unsupported file"),
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        if files.is_empty() {
            warn!(dir = %dir.display(), "No documents found");
            return Err(AppError::NoContent);
        }

        let mut documents = Vec::with_capacity(files.len());
        for (path, kind) in files {
            documents.push(Self::load_file(&path, kind).await?);
        }
        info!(
            dir = %dir.display(),
            documents = documents.len(),
            characters = documents.iter().map(|d| d.text.len()).sum::<usize>(),
            "Loaded documents"
        );
        Ok(documents)
    }

    /// Read one file into a single document. Unreadable or empty files are
    /// reported as `NoContent`.
    pub async fn load_file(path: &Path, kind: DocumentKind) -> AppResult<RawDocument> {
        let source = source_name(path);
        let pages = match kind {
            DocumentKind::Pdf => Self::load_pdf_pages(path).await,
            DocumentKind::Text => Self::load_text(path).await.map(|text| vec![text]),
        }
        .map_err(|e| {
            warn!(source = %source, error = %e, "Failed to read document");
            AppError::NoContent
        })?;

        let text = pages.join(PAGE_SEPARATOR);
        if text.trim().is_empty() {
            warn!(source = %source, "Document has no text content");
            return Err(AppError::NoContent);
        }

        debug!(source = %source, pages = pages.len(), characters = text.len(), "Loaded document");
        Ok(RawDocument { text, source })
    }

    async fn load_text(path: &Path) -> AppResult<String> {
        let bytes = fs::read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn load_pdf_pages(path: &Path) -> AppResult<Vec<String>> {
        let path = path.to_path_buf();
        // lopdf is synchronous and CPU-bound.
        tokio::task::spawn_blocking(move || -> AppResult<Vec<String>> {
            let document = lopdf::Document::load(&path)
                .map_err(|e| AppError::external("pdf loader", e))?;
            document
                .get_pages()
                .keys()
                .map(|page| {
                    document
                        .extract_text(&[*page])
                        .map_err(|e| AppError::external("pdf loader", e))
                })
                .collect()
        })
        .await
        .map_err(|e| AppError::Internal(format!("pdf loader task failed: {}", e)))?
    }
}

/// File name component used as the chunk source.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
