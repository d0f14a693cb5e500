//! Stream definition and article file readers used by the CLI

use serde::Deserialize;
use sift_core::{ArticleContext, Error, Result};
use sift_rules::StreamDefinition;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamsDocument {
    List(Vec<StreamDefinition>),
    Wrapped { streams: Vec<StreamDefinition> },
}

/// Read stream definitions from YAML
///
/// Accepts either a top-level list or a mapping with a `streams` list.
pub fn load_stream_definitions(path: impl AsRef<Path>) -> Result<Vec<StreamDefinition>> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_stream_definitions(&content)
        .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
}

pub fn parse_stream_definitions(content: &str) -> Result<Vec<StreamDefinition>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: StreamsDocument = serde_yaml::from_str(content)
        .map_err(|e| Error::config(format!("invalid stream definitions: {}", e)))?;
    Ok(match document {
        StreamsDocument::List(streams) | StreamsDocument::Wrapped { streams } => streams,
    })
}

/// Read articles from JSON lines, one article per non-blank line
pub fn load_articles(path: impl AsRef<Path>) -> Result<Vec<ArticleContext>> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_articles(&content).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
}

pub fn parse_articles(content: &str) -> Result<Vec<ArticleContext>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::config(format!("line {}: invalid article: {}", index + 1, e)))
        })
        .collect()
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))
}
