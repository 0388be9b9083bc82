//! Prompt templates for field extraction
//!
//! Templates are looked up by the `prompt` name of a field binding. The
//! built-in set covers the default bindings; a directory of `<name>.txt` or
//! `<name>.md` files can override or extend it.

use crate::LlmError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tally_domain::Field;
use tracing::debug;

/// Named prompt templates
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, String>,
}

impl PromptLibrary {
    /// Library holding only the built-in templates
    pub fn builtin() -> Self {
        let templates = [
            ("currency", CURRENCY_TEMPLATE),
            ("receipt", RECEIPT_TEMPLATE),
            ("cachier", CASHIER_TEMPLATE),
        ]
        .into_iter()
        .map(|(name, text)| (name.to_string(), text.to_string()))
        .collect();

        Self { templates }
    }

    /// Built-in templates overridden by the files in `dir`
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LlmError> {
        let mut library = Self::builtin();
        let entries = fs::read_dir(dir.as_ref()).map_err(|e| {
            LlmError::Template(format!("cannot read {}: {}", dir.as_ref().display(), e))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| LlmError::Template(e.to_string()))?
                .path();
            let is_template = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("md")
            );
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_template {
                continue;
            }

            let text = fs::read_to_string(&path)
                .map_err(|e| LlmError::Template(format!("cannot read {}: {}", path.display(), e)))?;
            debug!("Loaded prompt template '{}' from {}", name, path.display());
            library.templates.insert(name.to_string(), text);
        }

        Ok(library)
    }

    /// Add or replace a template
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Result<&str, LlmError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| LlmError::Template(format!("unknown prompt template '{}'", name)))
    }

    /// Full instruction text for one request: the template followed by the
    /// list of JSON keys the reply must contain
    pub fn render(&self, name: &str, fields: &[Field]) -> Result<String, LlmError> {
        let mut prompt = String::from(self.get(name)?.trim_end());
        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_FORMAT_HEADER);
        for field in fields {
            prompt.push_str(&format!("- \"{}\": {}\n", field.json_key(), field.describe()));
        }
        prompt.push_str("\nReturn ONLY valid JSON, no markdown code blocks, no explanations.");
        Ok(prompt)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

const OUTPUT_FORMAT_HEADER: &str = "Output format (a single JSON object with these keys):\n";

const CURRENCY_TEMPLATE: &str = r#"You read purchase descriptions: receipt photos, chat messages, and voice notes.
Determine the currency the purchase was paid in.
Prefer an explicit currency code or symbol; otherwise infer it from the shop's country or language.
Answer with the three-letter ISO 4217 code in upper case."#;

const RECEIPT_TEMPLATE: &str = r#"You read purchase descriptions: receipt photos, chat messages, and voice notes.
Extract the purchase as it appears on the receipt or in the message.
- List every purchased item in the order it appears, with its final price after discounts.
- Use the printed grand total as the spend when one exists; otherwise use 0.
- Do not invent items. A message like "Bought milk for 100" has one item or none, and spend 100.
- Prices are plain numbers without currency symbols or thousands separators."#;

const CASHIER_TEMPLATE: &str = r#"You read purchase descriptions: receipt photos, chat messages, and voice notes.
Find the name of the cashier or operator printed on the receipt, if any.
Return an empty string when no cashier is named."#;
