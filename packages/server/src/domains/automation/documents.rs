//! Reference documents attached to a crawler, flattened into LLM context.

use tracing::{debug, warn};

use crate::kernel::{BaseDocumentLoader, DocumentResult};
use llm_client::truncate_chars;

/// Load the given documents and join their text under filename headers.
///
/// Missing, unreadable and unsupported documents are skipped. The combined
/// text is cut to `char_budget` characters. Returns `None` when nothing
/// usable was loaded.
pub async fn load_document_context(
    loader: &dyn BaseDocumentLoader,
    document_ids: &[i64],
    char_budget: usize,
) -> Option<String> {
    if document_ids.is_empty() || char_budget == 0 {
        return None;
    }

    let mut sections = Vec::new();
    for &id in document_ids {
        let document = match loader.get_document_by_id(id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!(document_id = id, "document not found, skipping");
                continue;
            }
            Err(e) => {
                warn!(document_id = id, error = %e, "failed to load document");
                continue;
            }
        };

        match extract_text(&document).await {
            Some(text) if !text.trim().is_empty() => {
                sections.push(format!("--- {} ---\n{}", document.filename, text.trim()));
            }
            _ => debug!(
                document_id = id,
                content_type = %document.content_type,
                "no usable text in document"
            ),
        }
    }

    if sections.is_empty() {
        return None;
    }

    Some(truncate_chars(&sections.join("\n\n"), char_budget).to_string())
}

/// Extract plain text from a stored document by content type.
///
/// PDF parsing runs on the blocking pool.
pub async fn extract_text(document: &DocumentResult) -> Option<String> {
    let content_type = document
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if content_type.starts_with("text/") || content_type == "application/json" {
        return Some(String::from_utf8_lossy(&document.content).into_owned());
    }

    if content_type == "application/pdf" || document.filename.to_lowercase().ends_with(".pdf") {
        let content = document.content.clone();
        let extracted =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&content)).await;
        return match extracted {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!(filename = %document.filename, error = %e, "pdf text extraction failed");
                None
            }
            Err(e) => {
                warn!(filename = %document.filename, error = %e, "pdf extraction task failed");
                None
            }
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockDocumentLoader;

    fn text_doc(name: &str, body: &str) -> DocumentResult {
        DocumentResult {
            content: body.as_bytes().to_vec(),
            content_type: "text/plain; charset=utf-8".into(),
            filename: name.into(),
        }
    }

    #[tokio::test]
    async fn test_joins_documents_with_headers() {
        let loader = MockDocumentLoader::new()
            .with_document(1, text_doc("resume.txt", "Rust, Postgres"))
            .with_document(
                2,
                DocumentResult {
                    content: b"{\"skills\":[\"tokio\"]}".to_vec(),
                    content_type: "application/json".into(),
                    filename: "profile.json".into(),
                },
            );

        let context = load_document_context(&loader, &[1, 2, 3], 15_000)
            .await
            .unwrap();
        assert_eq!(
            context,
            "--- resume.txt ---\nRust, Postgres\n\n--- profile.json ---\n{\"skills\":[\"tokio\"]}"
        );
    }

    #[tokio::test]
    async fn test_truncates_to_budget() {
        let loader = MockDocumentLoader::new().with_document(1, text_doc("a.txt", &"x".repeat(100)));
        let context = load_document_context(&loader, &[1], 20).await.unwrap();
        assert_eq!(context.chars().count(), 20);
        assert!(context.starts_with("--- a.txt ---"));
    }

    #[tokio::test]
    async fn test_unsupported_and_failing_documents_are_skipped() {
        let loader = MockDocumentLoader::new()
            .with_document(
                1,
                DocumentResult {
                    content: vec![0, 1, 2],
                    content_type: "image/png".into(),
                    filename: "logo.png".into(),
                },
            )
            .with_failure(2);

        assert_eq!(load_document_context(&loader, &[1, 2], 15_000).await, None);
        assert_eq!(load_document_context(&loader, &[], 15_000).await, None);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_is_skipped() {
        let loader = MockDocumentLoader::new()
            .with_document(
                1,
                DocumentResult {
                    content: b"not really a pdf".to_vec(),
                    content_type: "application/pdf".into(),
                    filename: "resume.pdf".into(),
                },
            )
            .with_document(2, text_doc("notes.txt", "Remote only"));

        let context = load_document_context(&loader, &[1, 2], 15_000).await.unwrap();
        assert_eq!(context, "--- notes.txt ---
Remote only");
    }
}
