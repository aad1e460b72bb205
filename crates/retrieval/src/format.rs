//! Rendering chunks as model-readable text.

use crate::types::RetrievalChunk;

/// Chunks rendered when the caller gives no budget.
pub const DEFAULT_MAX_CHUNKS: usize = 5;

/// Characters of chunk content kept before truncation.
pub const MAX_CONTENT_CHARS: usize = 800;

pub const NO_RESULTS_MESSAGE: &str = "No relevant information found in the knowledge base.";

/// Render up to `max_chunks` chunks, in input order, as a numbered list.
///
/// ```text
/// Found 2 relevant chunks:
///
/// [1] guide.md
/// <content>
/// Similarity: 0.87
/// ```
pub fn format_chunks_for_agent(chunks: &[RetrievalChunk], max_chunks: usize) -> String {
    let shown = &chunks[..chunks.len().min(max_chunks)];
    if shown.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let mut output = format!("Found {} relevant chunks:", shown.len());
    for (i, chunk) in shown.iter().enumerate() {
        output.push_str(&format!(
            "\n\n[{}] {}\n{}\nSimilarity: {:.2}",
            i + 1,
            chunk.document_name,
            truncate(&chunk.content, MAX_CONTENT_CHARS),
            chunk.similarity
        ));
    }

    output
}

fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}
