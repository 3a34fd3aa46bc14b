use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use super::{CacheEntry, Family, Instruction, InstructionSet, Part, Properties, StackEffect, StackItem, Uop};
use crate::template::{self, TokenKind};
use crate::util::{FastHashMap, fast_hash_map_new};

/// Serialisation of a model document, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    Toml,
    Yaml,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ModelFormat::Toml,
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => ModelFormat::Yaml,
            _ => ModelFormat::Json,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default)]
    families: Vec<Family>,
    #[serde(default)]
    instructions: Vec<InstructionDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstructionDoc {
    name: String,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    is_target: bool,
    #[serde(default)]
    entry_depth: Option<usize>,
    parts: Vec<PartDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PartDoc {
    Skip { size: usize },
    Flush,
    Uop(UopDoc),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UopDoc {
    name: String,
    #[serde(default)]
    inputs: Vec<StackItem>,
    #[serde(default)]
    outputs: Vec<StackItem>,
    #[serde(default)]
    caches: Vec<CacheEntry>,
    #[serde(default)]
    properties: Properties,
    body: BodyDoc,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BodyDoc {
    #[serde(default)]
    file: String,
    #[serde(default = "first_line")]
    line: u32,
    text: String,
}

fn first_line() -> u32 {
    1
}

/// Parse one model document from text.
pub fn parse_document(text: &str, format: ModelFormat) -> Result<Document> {
    let doc = match format {
        ModelFormat::Json => serde_json::from_str(text)?,
        ModelFormat::Toml => toml::from_str(text)?,
        ModelFormat::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(doc)
}

/// Read and merge the given documents into a single resolved instruction set.
pub fn load_instruction_set(paths: &[PathBuf]) -> Result<InstructionSet> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let doc = parse_document(&text, ModelFormat::from_path(path))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        docs.push(doc);
    }
    resolve_documents(docs)
}

pub(crate) fn resolve_documents(docs: Vec<Document>) -> Result<InstructionSet> {
    let mut families: FastHashMap<String, Family> = fast_hash_map_new();
    let mut membership: FastHashMap<String, String> = fast_hash_map_new();
    let mut pending = Vec::new();

    for doc in docs {
        for family in doc.families {
            if families.contains_key(&family.name) {
                bail!("family '{}' is defined more than once", family.name);
            }
            membership.insert(family.name.clone(), family.name.clone());
            for member in &family.members {
                if let Some(previous) = membership.insert(member.clone(), family.name.clone())
                    && previous != family.name
                {
                    bail!("instruction '{member}' belongs to both '{previous}' and '{}'", family.name);
                }
            }
            families.insert(family.name.clone(), family);
        }
        pending.extend(doc.instructions);
    }

    let mut set = InstructionSet::new();
    for doc in pending {
        if set.instructions.contains_key(&doc.name) {
            bail!("instruction '{}' is defined more than once", doc.name);
        }
        let family_name = match (doc.family.as_ref(), membership.get(&doc.name)) {
            (Some(explicit), Some(member_of)) if explicit != member_of => {
                bail!(
                    "instruction '{}' names family '{explicit}' but is listed in '{member_of}'",
                    doc.name
                );
            }
            (Some(explicit), _) => Some(explicit.clone()),
            (None, member_of) => member_of.cloned(),
        };
        let family = match family_name {
            Some(name) => Some(
                families
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| anyhow!("instruction '{}' refers to unknown family '{name}'", doc.name))?,
            ),
            None => None,
        };
        let instruction = resolve_instruction(doc, family)?;
        set.insert(instruction);
    }
    Ok(set)
}

fn resolve_instruction(doc: InstructionDoc, family: Option<Family>) -> Result<Instruction> {
    if doc.parts.is_empty() {
        bail!("instruction '{}' has no parts", doc.name);
    }
    let mut parts = Vec::with_capacity(doc.parts.len());
    let mut properties = doc.properties;
    for part in doc.parts {
        let part = match part {
            PartDoc::Skip { size } => Part::Skip(size),
            PartDoc::Flush => Part::Flush,
            PartDoc::Uop(uop) => {
                let uop = resolve_uop(uop).with_context(|| format!("in instruction '{}'", doc.name))?;
                properties.needs_this |= uop.properties.needs_this;
                properties.needs_prev |= uop.properties.needs_prev;
                Part::Uop(uop)
            }
        };
        parts.push(part);
    }
    let cache_size: usize = parts.iter().map(Part::cache_size).sum();
    let size = doc.size.unwrap_or(1 + cache_size);
    if size == 0 {
        bail!("instruction '{}' has zero size", doc.name);
    }
    Ok(Instruction {
        name: doc.name,
        parts,
        size,
        family,
        properties,
        is_target: doc.is_target,
        entry_depth: doc.entry_depth,
    })
}

fn resolve_uop(doc: UopDoc) -> Result<Uop> {
    let file: Arc<str> = Arc::from(doc.body.file.as_str());
    let body = template::lex(&doc.body.text, file, doc.body.line)
        .with_context(|| format!("failed to tokenize body of '{}'", doc.name))?;
    let braced = matches!(body.first().map(|t| t.kind), Some(TokenKind::LBrace))
        && matches!(body.last().map(|t| t.kind), Some(TokenKind::RBrace));
    if !braced {
        bail!("body of '{}' must be a braced block", doc.name);
    }
    Ok(Uop {
        name: doc.name,
        stack: StackEffect {
            inputs: doc.inputs,
            outputs: doc.outputs,
        },
        caches: doc.caches,
        body,
        properties: doc.properties,
    })
}
