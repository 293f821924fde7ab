//! Conversion of stored message templates into the nested
//! `components[].parameters[]` shape the Graph API expects on send.
//!
//! Placeholders (`{{1}}`, `{{2}}`, ...) are filled positionally from the caller's
//! values, falling back to the template's own example values.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template {template} is missing a value for {component} parameter {position}")]
    MissingParameter {
        template: String,
        component: &'static str,
        position: usize,
    },
}

/// A template as returned by the Graph template listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub components: Vec<TemplateComponentDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TemplateComponentDef {
    Header {
        #[serde(default = "default_header_format")]
        format: HeaderFormat,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        example: Option<TemplateExample>,
    },
    Body {
        text: String,
        #[serde(default)]
        example: Option<TemplateExample>,
    },
    Footer {
        #[serde(default)]
        text: Option<String>,
    },
    Buttons {
        #[serde(default)]
        buttons: Vec<TemplateButtonDef>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeaderFormat {
    Text,
    Image,
    Video,
    Document,
    Location,
}

fn default_header_format() -> HeaderFormat {
    HeaderFormat::Text
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateExample {
    #[serde(default)]
    pub header_text: Vec<String>,
    #[serde(default)]
    pub header_handle: Vec<String>,
    #[serde(default)]
    pub body_text: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateButtonDef {
    QuickReply {
        text: String,
    },
    Url {
        text: String,
        url: String,
        #[serde(default)]
        example: Vec<String>,
    },
    PhoneNumber {
        text: String,
        phone_number: String,
    },
    #[serde(other)]
    Other,
}

/// Caller-supplied positional values. Empty slots fall back to examples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateValues {
    /// Header text value, or a media link / media id for media headers.
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub body: Vec<String>,
    /// One value per dynamic URL button, in button order.
    #[serde(default)]
    pub buttons: Vec<String>,
}

/// Highest `{{n}}` placeholder index in `text`.
pub fn placeholder_count(text: &str) -> usize {
    let mut max = 0;
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Ok(n) = after[..end].trim().parse::<usize>() {
                    max = max.max(n);
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    max
}

/// Replace `{{n}}` placeholders with `values[n - 1]`; unknown slots are left as is.
pub fn substitute(text: &str, values: &[String]) -> String {
    let mut out = text.to_string();
    for (i, value) in values.iter().enumerate() {
        out = out.replace(&format!("{{{{{}}}}}", i + 1), value);
    }
    out
}

fn pick(
    template: &str,
    component: &'static str,
    provided: &[String],
    examples: &[String],
    count: usize,
) -> Result<Vec<String>, TemplateError> {
    (0..count)
        .map(|i| {
            provided
                .get(i)
                .filter(|v| !v.is_empty())
                .or_else(|| examples.get(i))
                .cloned()
                .ok_or(TemplateError::MissingParameter {
                    template: template.to_string(),
                    component,
                    position: i + 1,
                })
        })
        .collect()
}

fn text_params(values: Vec<String>) -> Vec<Value> {
    values
        .into_iter()
        .map(|v| json!({ "type": "text", "text": v }))
        .collect()
}

fn media_param(format: HeaderFormat, value: &str) -> Value {
    let kind = match format {
        HeaderFormat::Video => "video",
        HeaderFormat::Document => "document",
        _ => "image",
    };
    let reference = if value.starts_with("http://") || value.starts_with("https://") {
        json!({ "link": value })
    } else {
        json!({ "id": value })
    };
    json!({ "type": kind, kind: reference })
}

/// Build the `template` object of a Graph send request.
pub fn build_template_payload(
    def: &TemplateDefinition,
    values: &TemplateValues,
) -> Result<Value, TemplateError> {
    let mut components = Vec::new();
    let mut url_button = 0usize;

    for component in &def.components {
        match component {
            TemplateComponentDef::Header { format, text, example } => {
                let example = example.clone().unwrap_or_default();
                match format {
                    HeaderFormat::Text => {
                        let count = text.as_deref().map(placeholder_count).unwrap_or(0);
                        if count == 0 {
                            continue;
                        }
                        let provided: Vec<String> = values.header.iter().cloned().collect();
                        let params = pick(&def.name, "header", &provided, &example.header_text, count)?;
                        components.push(json!({ "type": "header", "parameters": text_params(params) }));
                    }
                    HeaderFormat::Location => {}
                    media => {
                        let value = values
                            .header
                            .clone()
                            .filter(|v| !v.is_empty())
                            .or_else(|| example.header_handle.first().cloned())
                            .ok_or(TemplateError::MissingParameter {
                                template: def.name.clone(),
                                component: "header",
                                position: 1,
                            })?;
                        components.push(json!({
                            "type": "header",
                            "parameters": [media_param(*media, &value)],
                        }));
                    }
                }
            }
            TemplateComponentDef::Body { text, example } => {
                let count = placeholder_count(text);
                if count == 0 {
                    continue;
                }
                let examples = example
                    .as_ref()
                    .and_then(|e| e.body_text.first().cloned())
                    .unwrap_or_default();
                let params = pick(&def.name, "body", &values.body, &examples, count)?;
                components.push(json!({ "type": "body", "parameters": text_params(params) }));
            }
            TemplateComponentDef::Footer { .. } => {}
            TemplateComponentDef::Buttons { buttons } => {
                for (index, button) in buttons.iter().enumerate() {
                    let TemplateButtonDef::Url { url, example, .. } = button else {
                        continue;
                    };
                    if placeholder_count(url) == 0 {
                        continue;
                    }
                    let provided: Vec<String> = values.buttons.get(url_button).cloned().into_iter().collect();
                    url_button += 1;
                    let params = pick(&def.name, "button", &provided, example, 1)?;
                    components.push(json!({
                        "type": "button",
                        "sub_type": "url",
                        "index": index.to_string(),
                        "parameters": text_params(params),
                    }));
                }
            }
        }
    }

    Ok(json!({
        "name": def.name,
        "language": { "code": def.language },
        "components": components,
    }))
}

/// Plain-text rendering of the template body, used as the stored message preview.
pub fn render_body(def: &TemplateDefinition, values: &TemplateValues) -> String {
    for component in &def.components {
        if let TemplateComponentDef::Body { text, example } = component {
            let examples = example
                .as_ref()
                .and_then(|e| e.body_text.first().cloned())
                .unwrap_or_default();
            let count = placeholder_count(text);
            let filled: Vec<String> = (0..count)
                .map(|i| {
                    values
                        .body
                        .get(i)
                        .filter(|v| !v.is_empty())
                        .or_else(|| examples.get(i))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            return substitute(text, &filled);
        }
    }
    def.name.clone()
}
