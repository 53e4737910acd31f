//! Prompt building
//!
//! Renders the retrieval context and resolved intent into the reply
//! template. The context is a compact human-readable block: one section
//! per retrieved row limited to the fields the topic cares about, plus the
//! user's stated preferences on the funnel-completion path. An intent
//! analysis header pins the model to the target names and the canonical
//! JSON reply shape.

use nb_assistant_core::{Preference, SkuRow, Topic, COMPARISON_FIELDS};

/// Everything the builder needs for one prompt.
pub struct PromptContext<'a> {
    pub query: &'a str,
    pub topic: Topic,
    pub rows: &'a [SkuRow],
    pub target_names: &'a [String],
    /// Funnel selections, present only on the completion path.
    pub preferences: &'a [Preference],
}

/// Template renderer. The template carries `{context}` and `{query}`;
/// both are validated at config load.
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn build(&self, ctx: &PromptContext<'_>) -> String {
        let rendered = self
            .template
            .replace("{context}", &render_context(ctx))
            .replace("{query}", ctx.query);
        format!("{}\n\n{}", intent_header(ctx), rendered)
    }
}

fn intent_header(ctx: &PromptContext<'_>) -> String {
    let mut header = String::from("[意圖分析]\n");
    header.push_str(&format!("主題: {}\n", ctx.topic.key()));
    header.push_str(&format!("目標機型: {}\n", ctx.target_names.join(", ")));
    header.push_str(
        "請聚焦於上述主題與機型，並以單一 JSON 物件回覆，格式為 \
         {\"summary\": \"...\", \"table\": [{\"feature\": \"...\", \"<機型>\": \"...\"}]}。\
         table 的每一列都必須包含 feature 欄位與每個目標機型各一欄。",
    );
    header
}

fn render_context(ctx: &PromptContext<'_>) -> String {
    let fields = projected_fields(ctx.topic);
    let mut out = String::new();

    if !ctx.preferences.is_empty() {
        out.push_str("使用者偏好:\n");
        for pref in ctx.preferences {
            out.push_str(&format!("- {}: {}\n", pref.feature_label, pref.option_label));
        }
        out.push('\n');
    }

    out.push_str("產品資料:\n");
    for row in ctx.rows {
        out.push_str(&format!("## {}\n", row.model_name));
        for &field in &fields {
            let value = row.field(field);
            if !value.is_empty() {
                out.push_str(&format!("{}: {}\n", field, value));
            }
        }
    }
    out
}

/// Fields included per topic: the topic's own field when it names one,
/// the comparison set otherwise.
fn projected_fields(topic: Topic) -> Vec<&'static str> {
    match topic.spec_field() {
        Some(field) => vec![field],
        None => COMPARISON_FIELDS.to_vec(),
    }
}
