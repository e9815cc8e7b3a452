//! Document chunker (C1): splits a document into ordered, typed chunks
//! with stable, derived ids.
//!
//! Dispatch is purely a function of `store_type` — the "dynamic typing of
//! payloads" design note (§9) becomes a tagged-union-by-store-type
//! dispatch here, with `Generic` as the default path for anything the
//! dispatcher doesn't recognize. Every strategy is deterministic: same
//! payload in, same chunks (and the same derived `chunk_id`s) out.

use crate::models::{Chunk, ChunkType, Document};

/// Characters-per-token ratio used to size the hard-split fallback for
/// oversized note sections and generic bodies.
const CHARS_PER_TOKEN: usize = 4;
const MAX_CHUNK_TOKENS: usize = 700;
const MAX_CHUNK_CHARS: usize = MAX_CHUNK_TOKENS * CHARS_PER_TOKEN;

/// Split a document's `store_type` into `(category, subcategory)`, the
/// same rule the sidecar codec (C4) uses to derive on-disk paths: split
/// on the first `.`, or treat the whole string as a flat category.
fn store_category(store_type: &str) -> (&str, Option<&str>) {
    match store_type.split_once('.') {
        Some((category, subcategory)) => (category, Some(subcategory)),
        None => (store_type, None),
    }
}

/// Chunk a document according to its `store_type`.
pub fn chunk_document(doc: &Document) -> Vec<Chunk> {
    let (_, subcategory) = store_category(&doc.store_type);
    match subcategory {
        Some("repos") => chunk_repo(doc),
        Some("orgs") => chunk_org(doc),
        None if doc.store_type == "notes" => chunk_note(doc),
        _ => chunk_generic(doc),
    }
}

struct Builder<'a> {
    doc: &'a Document,
    chunks: Vec<Chunk>,
    offset: usize,
}

impl<'a> Builder<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            chunks: Vec::new(),
            offset: 0,
        }
    }

    fn push(&mut self, chunk_type: ChunkType, sequence: u32, content: String, title: Option<String>) {
        if content.trim().is_empty() {
            return;
        }
        let size_chars = content.chars().count();
        let start_position = self.offset;
        let end_position = start_position + size_chars;
        self.offset = end_position;
        let slot = chunk_type.slot(sequence);
        self.chunks.push(Chunk {
            chunk_id: format!("{}.{}.{}", self.doc.store_type, self.doc.document_id, slot),
            store_type: self.doc.store_type.clone(),
            document_id: self.doc.document_id.clone(),
            chunk_type,
            sequence,
            content,
            size_chars,
            start_position,
            end_position,
            title,
        });
    }

    fn finish(self) -> Vec<Chunk> {
        self.chunks
    }
}

fn field_line(doc: &Document, label: &str, key: &str) -> Option<String> {
    doc.text_field(key).map(|v| format!("{label}: {v}"))
}

fn list_line(doc: &Document, label: &str, key: &str) -> Option<String> {
    doc.list_field(key).filter(|l| !l.is_empty()).map(|v| format!("{label}: {}", v.join(", ")))
}

/// Repository documents produce up to three fixed-order chunks.
/// `sequence` is stable per chunk type regardless of which others exist.
fn chunk_repo(doc: &Document) -> Vec<Chunk> {
    let mut b = Builder::new(doc);

    let core_lines: Vec<String> = [
        field_line(doc, "name", "name"),
        field_line(doc, "description", "description"),
        field_line(doc, "primary_language", "primary_language"),
        field_line(doc, "size", "size"),
        field_line(doc, "priority", "priority"),
    ]
    .into_iter()
    .flatten()
    .collect();
    b.push(
        ChunkType::RepoCore,
        1,
        core_lines.join("\n"),
        doc.text_field("name").map(str::to_string),
    );

    let technical_lines: Vec<String> = [
        list_line(doc, "languages", "languages"),
        list_line(doc, "topics", "topics"),
        field_line(doc, "default_branch", "default_branch"),
    ]
    .into_iter()
    .flatten()
    .collect();
    b.push(ChunkType::RepoTechnical, 2, technical_lines.join("\n"), None);

    let activity_lines: Vec<String> = [
        field_line(doc, "stars", "stars"),
        field_line(doc, "forks", "forks"),
        field_line(doc, "open_issues", "open_issues"),
        field_line(doc, "created_at", "created_at"),
        field_line(doc, "updated_at", "updated_at"),
        field_line(doc, "archived", "archived"),
    ]
    .into_iter()
    .flatten()
    .collect();
    b.push(ChunkType::RepoActivity, 3, activity_lines.join("\n"), None);

    b.finish()
}

/// Organizations collapse to a single `org_main` chunk.
fn chunk_org(doc: &Document) -> Vec<Chunk> {
    let mut b = Builder::new(doc);
    let lines: Vec<String> = [
        field_line(doc, "name", "name"),
        field_line(doc, "description", "description"),
        field_line(doc, "location", "location"),
        field_line(doc, "blog", "blog"),
        field_line(doc, "email", "email"),
        field_line(doc, "public_repos", "public_repos"),
        field_line(doc, "followers", "followers"),
    ]
    .into_iter()
    .flatten()
    .collect();
    b.push(
        ChunkType::OrgMain,
        1,
        lines.join("\n"),
        doc.text_field("name").map(str::to_string),
    );
    b.finish()
}

/// Regex-free ATX header detector: a line matching `^#{1,6}\s+.+`.
fn atx_header(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some((hashes, title))
    }
}

/// Notes split on Markdown ATX headers; fewer than two sections falls
/// back to a single `generic` chunk.
fn chunk_note(doc: &Document) -> Vec<Chunk> {
    let content = doc.text_field("content").unwrap_or("");

    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_body = String::new();
    for line in content.lines() {
        if let Some((_, title)) = atx_header(line) {
            if current_title.is_some() || !current_body.trim().is_empty() {
                sections.push((
                    current_title.clone().unwrap_or_default(),
                    current_body.trim().to_string(),
                ));
            }
            current_title = Some(title.to_string());
            current_body.clear();
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if current_title.is_some() || !current_body.trim().is_empty() {
        sections.push((current_title.unwrap_or_default(), current_body.trim().to_string()));
    }
    let sections: Vec<(String, String)> = sections.into_iter().filter(|(t, b)| !t.is_empty() || !b.is_empty()).collect();

    if sections.len() < 2 {
        return chunk_generic(doc);
    }

    let metadata_block = note_metadata_block(doc);

    let mut b = Builder::new(doc);
    for (i, (title, body)) in sections.into_iter().enumerate() {
        let sequence = (i + 1) as u32;
        let mut text = String::new();
        if i == 0 && !metadata_block.is_empty() {
            text.push_str(&metadata_block);
            text.push_str("\n\n");
        }
        if !title.is_empty() {
            text.push_str(&title);
            text.push('\n');
        }
        text.push_str(&body);

        for piece in split_oversized(text.trim()) {
            let title_opt = if title.is_empty() { None } else { Some(title.clone()) };
            b.push(ChunkType::NoteSection, sequence, piece, title_opt);
        }
    }
    b.finish()
}

fn note_metadata_block(doc: &Document) -> String {
    let lines: Vec<String> = [
        field_line(doc, "title", "title"),
        field_line(doc, "category", "category"),
        list_line(doc, "tags", "tags"),
        list_line(doc, "keywords", "keywords"),
    ]
    .into_iter()
    .flatten()
    .collect();
    lines.join("\n")
}

/// Unknown store types aggregate known text fields in a fixed
/// (alphabetical, via `BTreeMap` iteration) order into one `generic`
/// chunk.
fn chunk_generic(doc: &Document) -> Vec<Chunk> {
    let mut lines = Vec::new();
    for (key, value) in &doc.payload {
        match value.as_text() {
            Some(text) if !text.trim().is_empty() => lines.push(format!("{key}: {text}")),
            _ => {
                if let Some(list) = value.as_list() {
                    if !list.is_empty() {
                        lines.push(format!("{key}: {}", list.join(", ")));
                    }
                }
            }
        }
    }
    let content = lines.join("\n");

    let mut b = Builder::new(doc);
    for piece in split_oversized(&content) {
        b.push(ChunkType::Generic, 1, piece, doc.text_field("title").map(str::to_string));
    }
    if b.chunks.is_empty() {
        b.push(ChunkType::Generic, 1, String::new(), None);
    }
    b.finish()
}

/// Hard-split text at whitespace/newline boundaries so no piece exceeds
/// `MAX_CHUNK_CHARS`. Mirrors the paragraph-chunker's hard-split
/// fallback: snap to a char boundary, prefer the last newline or space
/// before the cut.
fn split_oversized(text: &str) -> Vec<String> {
    if text.len() <= MAX_CHUNK_CHARS {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(MAX_CHUNK_CHARS));
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let actual_split = snap_to_char_boundary(remaining, actual_split);
        let actual_split = if actual_split == 0 {
            remaining.char_indices().nth(1).map(|(i, _)| i).unwrap_or(remaining.len())
        } else {
            actual_split
        };
        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[actual_split..];
    }
    pieces
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::models::PayloadValue;

    fn doc(store_type: &str, document_id: &str, fields: &[(&str, PayloadValue)]) -> Document {
        let mut payload = BTreeMap::new();
        for (k, v) in fields {
            payload.insert(k.to_string(), v.clone());
        }
        Document {
            store_type: store_type.to_string(),
            document_id: document_id.to_string(),
            payload,
        }
    }

    #[test]
    fn repo_chunks_are_in_fixed_order_with_stable_sequences() {
        let d = doc(
            "github.repos",
            "acme-widgets",
            &[
                ("name", PayloadValue::Text("acme-widgets".into())),
                ("description", PayloadValue::Text("Widgets".into())),
                ("languages", PayloadValue::List(vec!["Rust".into()])),
                ("stars", PayloadValue::Text("42".into())),
            ],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_type, ChunkType::RepoCore);
        assert_eq!(chunks[0].sequence, 1);
        assert_eq!(chunks[0].chunk_id, "github.repos.acme-widgets.core");
        assert_eq!(chunks[1].chunk_type, ChunkType::RepoTechnical);
        assert_eq!(chunks[1].sequence, 2);
        assert_eq!(chunks[2].chunk_type, ChunkType::RepoActivity);
        assert_eq!(chunks[2].sequence, 3);
    }

    #[test]
    fn repo_with_missing_sections_keeps_core_sequence_stable() {
        let d = doc(
            "github.repos",
            "bare-repo",
            &[("name", PayloadValue::Text("bare-repo".into()))],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::RepoCore);
        assert_eq!(chunks[0].sequence, 1);
    }

    #[test]
    fn org_produces_single_main_chunk() {
        let d = doc(
            "github.orgs",
            "acme",
            &[("name", PayloadValue::Text("Acme Corp".into()))],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::OrgMain);
        assert_eq!(chunks[0].chunk_id, "github.orgs.acme.main");
    }

    #[test]
    fn note_splits_on_atx_headers_with_titles() {
        let d = doc(
            "notes",
            "deploy",
            &[(
                "content",
                PayloadValue::Text("# Setup\nRun make deploy.\n# Teardown\nRun make clean.".into()),
            )],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title.as_deref(), Some("Setup"));
        assert_eq!(chunks[1].title.as_deref(), Some("Teardown"));
        assert_eq!(chunks[0].chunk_id, "notes.deploy.section1");
        assert_eq!(chunks[1].chunk_id, "notes.deploy.section2");
    }

    #[test]
    fn note_with_single_section_falls_back_to_generic() {
        let d = doc(
            "notes",
            "lonely",
            &[("content", PayloadValue::Text("# Only section\nJust one.".into()))],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Generic);
    }

    #[test]
    fn unknown_store_type_produces_generic_chunk() {
        let d = doc(
            "mystery.items",
            "x1",
            &[("summary", PayloadValue::Text("An unclassified thing".into()))],
        );
        let chunks = chunk_document(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Generic);
        assert_eq!(chunks[0].chunk_id, "mystery.items.x1.main");
    }

    #[test]
    fn chunking_is_deterministic() {
        let d = doc(
            "github.repos",
            "repeat",
            &[("name", PayloadValue::Text("repeat".into()))],
        );
        let a = chunk_document(&d);
        let b = chunk_document(&d);
        assert_eq!(a, b);
    }
}
