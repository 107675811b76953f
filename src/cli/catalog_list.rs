//! Catalog listings for the `models`, `tools` and `data-sources` commands.

use std::error::Error;
use std::fmt::Write as _;

use crate::api::catalog::CatalogClient;
use crate::api::{DataSourceInfo, ModelInfo, ToolInfo};
use crate::core::config::Config;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn catalog_client(config: &Config) -> Result<CatalogClient, Box<dyn Error>> {
    let client = reqwest::Client::builder().build()?;
    Ok(CatalogClient::new(
        client,
        config.base_url(),
        config.endpoints.clone(),
    ))
}

pub async fn list_models(config: &Config) -> Result<(), Box<dyn Error>> {
    let models = catalog_client(config)?.models().await?;
    print!(
        "{}",
        render_models(config.base_url(), config.default_model.as_deref(), &models)
    );
    Ok(())
}

pub async fn list_tools(config: &Config) -> Result<(), Box<dyn Error>> {
    let tools = catalog_client(config)?.tools().await?;
    print!("{}", render_tools(config.base_url(), &tools));
    Ok(())
}

pub async fn list_data_sources(config: &Config) -> Result<(), Box<dyn Error>> {
    let sources = catalog_client(config)?.data_sources().await?;
    print!("{}", render_data_sources(config.base_url(), &sources));
    Ok(())
}

fn header(out: &mut String, title: &str) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);
}

fn entry(out: &mut String, name: &str, details: &[(&str, Option<&str>)]) {
    let _ = writeln!(out, "  • {name}");
    for (label, value) in details {
        if let Some(value) = value.filter(|value| !value.is_empty() && *value != name) {
            let _ = writeln!(out, "    {label}: {value}");
        }
    }
    let _ = writeln!(out);
}

pub fn render_models(base_url: &str, default_model: Option<&str>, models: &[ModelInfo]) -> String {
    let mut out = String::new();
    header(&mut out, &format!("🤖 Available Models at {base_url}"));

    if let Some(default_model) = default_model {
        let _ = writeln!(out, "🎯 Default model: {default_model} (from config)");
        let _ = writeln!(out);
    }

    if models.is_empty() {
        let _ = writeln!(out, "No models found.");
        return out;
    }

    let _ = writeln!(out, "Found {} models:", models.len());
    let _ = writeln!(out);
    for model in models {
        entry(
            &mut out,
            &model.name,
            &[
                ("Provider", model.provider.as_deref()),
                ("Model", model.model.as_deref()),
                ("Description", model.description.as_deref()),
            ],
        );
    }
    out
}

pub fn render_tools(base_url: &str, tools: &[ToolInfo]) -> String {
    let mut out = String::new();
    header(&mut out, &format!("🛠️  Available Tools at {base_url}"));

    if tools.is_empty() {
        let _ = writeln!(out, "No tools found.");
        return out;
    }
    for tool in tools {
        entry(
            &mut out,
            &tool.name,
            &[
                ("Id", tool.id.as_deref()),
                ("Category", tool.category.as_deref()),
                ("Description", tool.description.as_deref()),
            ],
        );
    }
    out
}

pub fn render_data_sources(base_url: &str, sources: &[DataSourceInfo]) -> String {
    let mut out = String::new();
    header(&mut out, &format!("📚 Available Data Sources at {base_url}"));

    if sources.is_empty() {
        let _ = writeln!(out, "No data sources found.");
        return out;
    }
    for source in sources {
        entry(
            &mut out,
            &source.name,
            &[
                ("Id", source.id.as_deref()),
                ("Category", source.category.as_deref()),
                ("Description", source.description.as_deref()),
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_listing_shows_default_and_details() {
        let models = vec![ModelInfo {
            name: "gpt-4o".to_string(),
            provider: Some("openai".to_string()),
            model: Some("gpt-4o".to_string()),
            description: Some(String::new()),
        }];
        let out = render_models("http://localhost:8000", Some("gpt-4o"), &models);

        assert!(out.starts_with("🤖 Available Models at http://localhost:8000\n"));
        assert!(out.contains("🎯 Default model: gpt-4o (from config)"));
        assert!(out.contains("  • gpt-4o\n    Provider: openai\n\n"));
        assert!(!out.contains("Model: gpt-4o"));
        assert!(!out.contains("Description"));
    }

    #[test]
    fn empty_lists_say_so() {
        assert!(render_tools("http://x", &[]).ends_with("No tools found.\n"));
        assert!(render_data_sources("http://x", &[]).ends_with("No data sources found.\n"));
        assert!(render_models("http://x", None, &[]).ends_with("No models found.\n"));
    }

    #[test]
    fn tools_listing_includes_ids() {
        let tools = vec![ToolInfo {
            id: Some("basicmath".to_string()),
            name: "BasicMathTool".to_string(),
            description: Some("Performs arithmetic".to_string()),
            category: None,
        }];
        let out = render_tools("http://x", &tools);
        assert!(out.contains("  • BasicMathTool\n    Id: basicmath\n    Description: Performs arithmetic\n"));
    }
}
