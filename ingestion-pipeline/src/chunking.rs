use common::storage::types::chunk::ChunkPosition;

use crate::types::ChunkDraft;

fn approx_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Split plain text into chunk drafts along paragraph boundaries,
/// packing paragraphs together until `max_tokens` would be exceeded.
/// A single oversized paragraph still becomes its own chunk.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<ChunkDraft> {
    let max_tokens = max_tokens.max(1) as u32;
    let mut drafts: Vec<ChunkDraft> = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0u32;
    let mut offset = 0u64;
    let mut current_offset = 0u64;

    let mut flush = |buf: &mut String, tokens: &mut u32, start: u64| {
        if !buf.trim().is_empty() {
            drafts.push(ChunkDraft {
                text: std::mem::take(buf),
                token_count: *tokens,
                position: ChunkPosition {
                    offset: Some(start),
                    ..Default::default()
                },
            });
        } else {
            buf.clear();
        }
        *tokens = 0;
    };

    for paragraph in text.split("\n\n") {
        let paragraph_tokens = approx_tokens(paragraph);
        if paragraph_tokens == 0 {
            offset += paragraph.len() as u64 + 2;
            continue;
        }

        if current_tokens > 0 && current_tokens + paragraph_tokens > max_tokens {
            flush(&mut current, &mut current_tokens, current_offset);
        }
        if current_tokens == 0 {
            current_offset = offset;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        current_tokens += paragraph_tokens;
        offset += paragraph.len() as u64 + 2;

        if current_tokens >= max_tokens {
            flush(&mut current, &mut current_tokens, current_offset);
        }
    }
    flush(&mut current, &mut current_tokens, current_offset);

    drafts
}
