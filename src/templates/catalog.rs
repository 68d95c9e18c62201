//! Built-in template catalog and TOML catalog files

use super::{PromptTemplate, TemplateError, TemplateFactory};
use crate::optimization::StrategyKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// (name, description, type, body, strategy, estimated tokens)
const BUILTIN: &[(&str, &str, &str, &str, StrategyKind, usize)] = &[
    (
        "general_chat",
        "General conversation",
        "chat",
        "As an AI assistant, answer the following question concisely and professionally:\n{{content}}",
        StrategyKind::Semantic,
        100,
    ),
    (
        "code_generation",
        "Code generation",
        "code",
        "Generate code that meets the following requirements, with detailed comments:\n{{content}}\n\
         Requirements:\n\
         1. Keep the code simple and readable\n\
         2. Follow best practices\n\
         3. Include error handling\n\
         4. Consider performance",
        StrategyKind::Keyword,
        150,
    ),
    (
        "code_optimization",
        "Code optimization",
        "code",
        "Optimize the following code, focusing on:\n\
         1. Performance\n\
         2. Simplification\n\
         3. Best practices\n\
         4. Maintainability\n\n\
         Original code:\n{{content}}",
        StrategyKind::Keyword,
        200,
    ),
    (
        "text_summary",
        "Text summary",
        "summary",
        "Summarize the following content concisely, highlighting the key points:\n{{content}}",
        StrategyKind::Semantic,
        120,
    ),
    (
        "problem_solving",
        "Problem solving",
        "qa",
        "Provide a detailed solution to the following problem:\n{{content}}\n\
         The answer should:\n\
         1. Analyze the root cause\n\
         2. Give concrete steps\n\
         3. Consider alternative scenarios\n\
         4. Recommend best practices",
        StrategyKind::Semantic,
        180,
    ),
    (
        "api_doc",
        "API documentation",
        "doc",
        "Write standard documentation for the following API:\n{{content}}\n\
         Include these sections:\n\
         1. Description\n\
         2. Request parameters\n\
         3. Response format\n\
         4. Example code\n\
         5. Error handling",
        StrategyKind::Keyword,
        160,
    ),
    (
        "data_analysis",
        "Data analysis",
        "analysis",
        "Analyze the following data, focusing on:\n\
         1. Trends\n\
         2. Key metrics\n\
         3. Anomalies\n\
         4. Recommendations\n\n\
         Data:\n{{content}}",
        StrategyKind::Semantic,
        200,
    ),
    (
        "test_case",
        "Test case generation",
        "test",
        "Write complete test cases for the following functionality:\n{{content}}\n\
         Coverage:\n\
         1. Normal flow\n\
         2. Boundary conditions\n\
         3. Error cases\n\
         4. Performance",
        StrategyKind::Keyword,
        150,
    ),
    (
        "code_review",
        "Code review",
        "review",
        "Review the following code, paying attention to:\n\
         1. Code quality\n\
         2. Potential bugs\n\
         3. Security issues\n\
         4. Suggested improvements\n\n\
         Code:\n{{content}}",
        StrategyKind::Keyword,
        180,
    ),
    (
        "sql_optimization",
        "SQL optimization",
        "sql",
        "Optimize the following {{dialect}} query, considering:\n\
         1. Query performance\n\
         2. Index usage\n\
         3. Execution plan\n\
         4. Best practices\n\n\
         SQL:\n{{content}}",
        StrategyKind::Keyword,
        150,
    ),
];

/// The ten templates a fresh store is seeded with
pub fn builtin_templates() -> Vec<PromptTemplate> {
    BUILTIN
        .iter()
        .map(|(name, description, template_type, body, strategy, tokens)| {
            let mut template = TemplateFactory::create(*template_type, *name, *body);
            template.description = description.to_string();
            template.compression_strategy = *strategy;
            template.estimated_tokens = *tokens;
            template
        })
        .collect()
}

/// One `[[templates]]` table in a catalog file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub template_type: String,
    pub body: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    #[serde(default)]
    pub estimated_tokens: Option<usize>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl CatalogEntry {
    /// Factory defaults for the type, overridden by whatever the entry sets
    pub fn into_template(self) -> Result<PromptTemplate, TemplateError> {
        let mut template = TemplateFactory::create(self.template_type, self.name, self.body);
        if !template.has_content_placeholder() {
            return Err(TemplateError::MissingPlaceholder(template.name));
        }

        if let Some(description) = self.description {
            template.description = description;
        }
        if let Some(strategy) = self.strategy {
            template.compression_strategy = strategy;
        }
        if let Some(tokens) = self.estimated_tokens {
            template.estimated_tokens = tokens;
        }
        template.variables.extend(self.variables);
        Ok(template)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<CatalogEntry>,
}

pub fn parse_catalog(content: &str) -> Result<Vec<PromptTemplate>, TemplateError> {
    let file: CatalogFile = toml::from_str(content)?;
    file.templates
        .into_iter()
        .map(CatalogEntry::into_template)
        .collect()
}

/// Load additional templates from a TOML catalog file
pub fn load_catalog(path: &Path) -> Result<Vec<PromptTemplate>, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let templates = parse_catalog(&content)?;
    info!(path = %path.display(), count = templates.len(), "Loaded template catalog");
    Ok(templates)
}
