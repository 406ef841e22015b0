//! PubMed search tool over the NCBI E-utilities

use super::{fetch_json, fetch_text, query_schema, QueryInput, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TOP_K_RESULTS: &str = "3";
const MAX_CHARS: usize = 2000;

pub struct PubMedTool;

#[derive(Debug, Clone, PartialEq)]
struct Article {
    uid: String,
    title: String,
    published: String,
    summary: String,
}

fn search_ids(body: &Value) -> Vec<String> {
    body["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Titles and dates from an esummary response, in `ids` order
fn summaries(body: &Value, ids: &[String]) -> Vec<Article> {
    ids.iter()
        .filter_map(|uid| {
            let doc = body["result"].get(uid)?;
            Some(Article {
                uid: uid.clone(),
                title: doc["title"].as_str().unwrap_or_default().to_string(),
                published: doc["pubdate"].as_str().unwrap_or_default().to_string(),
                summary: String::new(),
            })
        })
        .collect()
}

/// Concatenate every `<AbstractText>` section of an efetch XML document.
///
/// Inline markup such as `<i>` or `<sup>` is dropped and its text kept.
fn extract_abstract(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut sections = Vec::new();
    // Label and text of the open AbstractText, plus markup depth inside it
    let mut current: Option<(Option<String>, String)> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if current.is_none() && e.name().as_ref() == b"AbstractText" => {
                current = Some((label(&e)?, String::new()));
            }
            Event::Start(_) if current.is_some() => depth += 1,
            Event::End(_) if current.is_some() => {
                if depth > 0 {
                    depth -= 1;
                } else if let Some((label, text)) = current.take() {
                    let text = text.trim();
                    if !text.is_empty() {
                        sections.push(match label {
                            Some(label) => format!("{label}: {text}"),
                            None => text.to_string(),
                        });
                    }
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&e.decode().map_err(xml_error)?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&e.decode().map_err(xml_error)?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&resolve_reference(&e)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sections.join("\n"))
}

fn label(start: &BytesStart<'_>) -> Result<Option<String>, String> {
    let Some(attr) = start.try_get_attribute("Label").map_err(xml_error)? else {
        return Ok(None);
    };
    let raw = std::str::from_utf8(&attr.value).map_err(xml_error)?;
    let value = unescape(raw).map_err(xml_error)?;
    Ok(Some(value.trim().to_string()).filter(|l| !l.is_empty()))
}

/// Character references resolve to their character, the predefined entities
/// to their text. Anything else is kept as written.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, String> {
    if let Some(c) = reference.resolve_char_ref().map_err(xml_error)? {
        return Ok(c.to_string());
    }
    let name = reference.decode().map_err(xml_error)?;
    Ok(resolve_predefined_entity(&name).map_or_else(|| format!("&{name};"), str::to_string))
}

#[allow(clippy::needless_pass_by_value)]
fn xml_error(e: impl std::fmt::Display) -> String {
    format!("Invalid PubMed XML: {e}")
}

fn format_articles(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "No good PubMed Result was found".to_string();
    }
    let text = articles
        .iter()
        .map(|a| {
            let summary = if a.summary.is_empty() {
                "No abstract available"
            } else {
                a.summary.as_str()
            };
            format!(
                "Published: {}\nTitle: {}\nSummary::\n{}",
                a.published, a.title, summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    text.chars().take(MAX_CHARS).collect()
}

async fn lookup(query: &str, ctx: &ToolContext) -> Result<String, String> {
    let search = fetch_json(
        ctx,
        &format!("{BASE_URL}/esearch.fcgi"),
        &[
            ("db", "pubmed"),
            ("term", query),
            ("retmode", "json"),
            ("retmax", TOP_K_RESULTS),
            ("sort", "relevance"),
        ],
    )
    .await?;

    let ids = search_ids(&search);
    if ids.is_empty() {
        return Ok(format_articles(&[]));
    }

    let joined = ids.join(",");
    let summary = fetch_json(
        ctx,
        &format!("{BASE_URL}/esummary.fcgi"),
        &[("db", "pubmed"), ("id", joined.as_str()), ("retmode", "json")],
    )
    .await?;

    let mut articles = summaries(&summary, &ids);
    for article in &mut articles {
        let xml = fetch_text(
            ctx,
            &format!("{BASE_URL}/efetch.fcgi"),
            &[("db", "pubmed"), ("id", article.uid.as_str()), ("retmode", "xml")],
        )
        .await?;
        article.summary = extract_abstract(&xml)?;
    }

    Ok(format_articles(&articles))
}

#[async_trait]
impl Tool for PubMedTool {
    fn name(&self) -> &'static str {
        "pubmed_search_tool"
    }

    fn description(&self) -> String {
        "Searches PubMed for scholarly articles related to the given query and returns their \
titles, publication dates and abstracts. Useful for peer-reviewed biomedical and life \
sciences research, clinical studies and reviews."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        query_schema("Biomedical topic to search PubMed for")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let query = match QueryInput::parse(input) {
            Ok(q) => q,
            Err(out) => return out,
        };
        match lookup(&query, &ctx).await {
            Ok(text) => ToolOutput::success(text),
            Err(e) => ToolOutput::error(e),
        }
    }
}
