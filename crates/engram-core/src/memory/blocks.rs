//! Typed content blocks
//!
//! Node bodies can carry an ordered sequence of typed blocks instead of (or
//! alongside) a flat markdown body. Blocks have stable ids and timestamps so
//! edit records and sync can address them individually.
//!
//! The parser is line-oriented and deliberately small: headings, fenced code,
//! quotes, lists (items become children of a list block), dividers, and
//! paragraphs. Parsing a markdown body and rendering it back preserves block
//! structure and types, with content preserved up to trailing whitespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a content block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Section heading with a level
    Heading,
    /// Plain prose paragraph
    Paragraph,
    /// Container for list items
    List,
    /// A single list entry (child of a list block)
    ListItem,
    /// Fenced code block
    Code,
    /// Block quote
    Quote,
    /// Horizontal rule
    Divider,
}

impl BlockType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Heading => "heading",
            BlockType::Paragraph => "paragraph",
            BlockType::List => "list",
            BlockType::ListItem => "list_item",
            BlockType::Code => "code",
            BlockType::Quote => "quote",
            BlockType::Divider => "divider",
        }
    }
}

/// A typed structural unit of node content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Stable block identifier
    pub id: String,
    /// Block kind
    pub block_type: BlockType,
    /// Text content (empty for lists and dividers)
    pub content: String,
    /// Heading level, 1-6 (headings only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// When the block was created
    pub created_at: DateTime<Utc>,
    /// When the block was last modified
    pub modified_at: DateTime<Utc>,
    /// Child blocks (list items under a list)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    /// Create a block of the given type at the given instant
    pub fn new(block_type: BlockType, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: format!("block-{}", Uuid::new_v4()),
            block_type,
            content: content.into(),
            level: None,
            created_at: at,
            modified_at: at,
            children: Vec::new(),
        }
    }

    fn heading(level: u8, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut block = Self::new(BlockType::Heading, content, at);
        block.level = Some(level.clamp(1, 6));
        block
    }
}

// ============================================================================
// MARKDOWN PARSING
// ============================================================================

/// Parse a markdown body into a block sequence
pub fn parse_markdown(body: &str, at: DateTime<Utc>) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut list_items: Vec<Block> = Vec::new();
    let mut code_lines: Vec<&str> = Vec::new();
    let mut in_code = false;

    let flush_paragraph = |paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !paragraph.is_empty() {
            blocks.push(Block::new(BlockType::Paragraph, paragraph.join("\n"), at));
            paragraph.clear();
        }
    };
    let flush_list = |list_items: &mut Vec<Block>, blocks: &mut Vec<Block>| {
        if !list_items.is_empty() {
            let mut list = Block::new(BlockType::List, "", at);
            list.children = std::mem::take(list_items);
            blocks.push(list);
        }
    };

    for line in body.lines() {
        let trimmed = line.trim_end();

        if in_code {
            if trimmed.trim_start() == "```" {
                blocks.push(Block::new(BlockType::Code, code_lines.join("\n"), at));
                code_lines.clear();
                in_code = false;
            } else {
                code_lines.push(trimmed);
            }
            continue;
        }

        if trimmed.trim_start().starts_with("```") {
            flush_paragraph(&mut paragraph, &mut blocks);
            flush_list(&mut list_items, &mut blocks);
            in_code = true;
        } else if trimmed == "---" || trimmed == "***" {
            flush_paragraph(&mut paragraph, &mut blocks);
            flush_list(&mut list_items, &mut blocks);
            blocks.push(Block::new(BlockType::Divider, "", at));
        } else if let Some(rest) = heading_text(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            flush_list(&mut list_items, &mut blocks);
            blocks.push(Block::heading(rest.0, rest.1, at));
        } else if let Some(rest) = trimmed.strip_prefix("> ").or(trimmed.strip_prefix('>')) {
            flush_paragraph(&mut paragraph, &mut blocks);
            flush_list(&mut list_items, &mut blocks);
            blocks.push(Block::new(BlockType::Quote, rest.trim_start(), at));
        } else if let Some(item) = list_item_text(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            list_items.push(Block::new(BlockType::ListItem, item, at));
        } else if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
            flush_list(&mut list_items, &mut blocks);
        } else {
            flush_list(&mut list_items, &mut blocks);
            paragraph.push(trimmed);
        }
    }

    if in_code {
        // Unterminated fence: keep the content rather than dropping it
        blocks.push(Block::new(BlockType::Code, code_lines.join("\n"), at));
    }
    flush_paragraph(&mut paragraph, &mut blocks);
    flush_list(&mut list_items, &mut blocks);

    blocks
}

fn heading_text(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    line[hashes..]
        .strip_prefix(' ')
        .map(|rest| (hashes as u8, rest))
}

fn list_item_text(line: &str) -> Option<&str> {
    let stripped = line.trim_start();
    stripped
        .strip_prefix("- ")
        .or(stripped.strip_prefix("* "))
}

// ============================================================================
// MARKDOWN RENDERING
// ============================================================================

/// Render a block sequence back to markdown
pub fn render_markdown(blocks: &[Block]) -> String {
    let mut out: Vec<String> = Vec::new();

    for block in blocks {
        match block.block_type {
            BlockType::Heading => {
                let level = block.level.unwrap_or(1) as usize;
                out.push(format!("{} {}", "#".repeat(level), block.content));
            }
            BlockType::Paragraph => out.push(block.content.clone()),
            BlockType::List => {
                let items: Vec<String> = block
                    .children
                    .iter()
                    .map(|item| format!("- {}", item.content))
                    .collect();
                out.push(items.join("\n"));
            }
            BlockType::ListItem => out.push(format!("- {}", block.content)),
            BlockType::Code => out.push(format!("```\n{}\n```", block.content)),
            BlockType::Quote => out.push(format!("> {}", block.content)),
            BlockType::Divider => out.push("---".to_string()),
        }
    }

    out.join("\n\n")
}

// ============================================================================
// TESTS
// ============================================================================
