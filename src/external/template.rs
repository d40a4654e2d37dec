//! Template rendering.
//!
//! Startup scripts and container descriptors are expanded once per node
//! from template files carrying `{{ key }}` placeholders. The context
//! always includes the node index and, when consensus material is being
//! injected, that node's signer dump entry.

use crate::signer::SignerEntry;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Errors raised while expanding a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {path}")]
    MissingTemplate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unresolved placeholder '{name}' in {path}")]
    UnresolvedPlaceholder { name: String, path: String },
}

/// Key/value substitution context for one node.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Context for the node at `index`.
    pub fn for_node(index: usize) -> Self {
        let mut context = Self::default();
        context.insert("node", &index.to_string());
        context
    }

    pub fn insert(&mut self, key: &str, value: &str) -> &mut Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    /// Attach a node's signer dump entry.
    pub fn with_signer(mut self, entry: &SignerEntry) -> Self {
        self.insert("signer_address", &entry.address_lower());
        self.insert(
            "signer_private_key",
            entry.private_key.trim_start_matches("0x"),
        );
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Expands a template file against a per-node context.
pub trait TemplateRenderer {
    fn render(
        &self,
        template_path: &Path,
        context: &TemplateContext,
    ) -> Result<String, TemplateError>;
}

/// Plain `{{ key }}` substitution renderer.
pub struct VarRenderer;

impl TemplateRenderer for VarRenderer {
    fn render(
        &self,
        template_path: &Path,
        context: &TemplateContext,
    ) -> Result<String, TemplateError> {
        let text =
            fs::read_to_string(template_path).map_err(|source| TemplateError::MissingTemplate {
                path: template_path.display().to_string(),
                source,
            })?;

        let placeholder = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex");

        // Reject unknown placeholders before substituting anything.
        for caps in placeholder.captures_iter(&text) {
            let name = &caps[1];
            if context.get(name).is_none() {
                return Err(TemplateError::UnresolvedPlaceholder {
                    name: name.to_string(),
                    path: template_path.display().to_string(),
                });
            }
        }

        let rendered = placeholder.replace_all(&text, |caps: &regex::Captures| {
            context.get(&caps[1]).unwrap_or_default().to_string()
        });

        Ok(rendered.into_owned())
    }
}
