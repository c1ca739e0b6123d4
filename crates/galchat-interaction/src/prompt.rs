//! Prompt construction for the dialogue gateway.
//!
//! Prompts are pure functions of `(scene text, style tag, bounded history)`.
//! Every prompt explicitly instructs the model to ignore prior history
//! events and react only to the current input — this prevents topic drift
//! across turns — and spells out the exact output grammar the response
//! parser expects.

use crate::styles::ROLE_STYLES;
use galchat_core::dialog::SituationAnalysis;
use galchat_core::error::{GalError, Result};
use galchat_core::gateway::{ChatTurn, TurnRole};
use minijinja::{Environment, context};
use serde::Serialize;

/// System turn sent with every single-phase generation request.
pub const SYSTEM_PROMPT: &str =
    "你是一个专业的对话选项生成器，专门为角色扮演游戏生成多样化的对话选择。";

/// The output grammar shared by the options and execute prompts. This block
/// is what the response parser's tolerant scanner is built against.
const OUTPUT_GRAMMAR: &str = "\
【输出格式（严格遵守，每行一个信息）】
[场景侧写内容]

A. [回应内容]
(Style: 【治愈系伙伴】)
(Kaomoji: 颜文字)
(Favor: +1)
(Impact: 简短描述)

B. [回应内容]
(Style: 【氛围调节者】)
(Kaomoji: 颜文字)
(Favor: +1)
(Impact: 简短描述)
(以此类推到E)

【反面教材警告】
- 严禁使用 \"默认风格\" 或 \"Unknown\"。
- 严禁使用 😳 等图形Emoji。
- 严禁 A 和 D 内容相似。";

const OPTIONS_TEMPLATE: &str = "\
你是顶级情商的恋爱Galgame编剧。
⚠️ **重要指令**：请忽略历史对话中的具体事件，**仅针对**以下【当前用户输入】生成5个回应选项。

【当前用户输入】(这是你需要回应的核心内容！)
\"{{ scene }}\"

【用户偏好风格】：{{ user_style }}

{{ history_block }}

【核心指令】
1. **场景侧写（两段式）**：
   - 第一段（情境分析）：一针见血地分析【当前用户输入】的潜台词与社交张力（30字内）。
   - 第二段（选择预告）：必须以“此刻，你的回应将定义...”开头。
   - 结尾必须带一个氛围颜文字。
2. **强制颜文字库**（必须从以下对应风格中选取，严禁使用图形Emoji）：
{% for style in styles %}   - [{{ style.tag }}/{{ style.name }}]: {{ style.bank }}
{% endfor %}3. **角色身份标签**（必须使用以下固定标签）：
{% for style in styles %}   - 选项{{ style.label }} ({{ style.name }}) -> 标签：【{{ style.tag }}】
{% endfor %}4. **好感度数值多样性**（严禁全部+1）：
   - 必须根据回应风格产生真实的数值波动。
   - 【傲娇】和【高冷】选项通常初始好感度为 0 或 -1（表现出距离感）。
   - 【幽默】选项如果过于轻浮，好感度可能为 -1。
   - 只有真正触动对方的【温柔】或【热情】才给 +2。
   - 允许范围：-5 到 +5。

{{ output_grammar }}";

const ANALYZE_TEMPLATE: &str = "\
你是冷静的社交态势分析师。请分析【对方消息】，不要生成回复，只做态势感知。
⚠️ 请忽略历史对话中的具体事件，仅针对当前消息分析。

【对方消息】
\"{{ user_input }}\"

{{ history_block }}

请严格返回如下结构的 JSON 对象，不要附加任何其他文字：
{
  \"summary\": \"<一句话概括局势>\",
  \"emotion_score\": <-5到5的整数>,
  \"intent\": \"<对方的潜在意图>\",
  \"strategy\": \"<建议的回应策略>\",
  \"confidence\": <0到1的小数>,
  \"burst_detected\": <是否连发消息, true/false>,
  \"pressure_level\": \"<low/medium/high>\"
}";

const EXECUTE_TEMPLATE: &str = "\
你是顶级情商的恋爱Galgame编剧。战术分析已经确认，请严格按照该分析的基调生成5个回应选项。
⚠️ **重要指令**：请忽略历史对话中的具体事件，**仅针对**以下【当前用户输入】生成选项。

【当前用户输入】
\"{{ user_input }}\"

【已确认的态势分析】(必须与其基调保持一致)
{{ analysis_json }}

{{ history_block }}

【角色身份标签】（必须使用以下固定标签）：
{% for style in styles %}   - 选项{{ style.label }} ({{ style.name }}) -> 标签：【{{ style.tag }}】
{% endfor %}
{{ output_grammar }}";

#[derive(Serialize)]
struct StyleContext {
    label: String,
    name: &'static str,
    tag: &'static str,
    bank: String,
}

fn style_contexts() -> Vec<StyleContext> {
    ROLE_STYLES
        .iter()
        .map(|style| StyleContext {
            label: style.label.to_string(),
            name: style.name,
            tag: style.tag,
            bank: style.kaomoji_bank.join(" "),
        })
        .collect()
}

/// Renders the bounded history window the way the model expects: the other
/// party's lines are marked 对方, our previously chosen replies 我.
fn history_block(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return "【参考历史对话】：无".to_string();
    }
    let lines: Vec<String> = history
        .iter()
        .filter(|turn| turn.role != TurnRole::System)
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::Assistant => "我",
                _ => "对方",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect();
    format!(
        "【参考历史对话】（仅供参考，请勿针对历史内容回应）：\n{}",
        lines.join("\n")
    )
}

/// Builds the prompts sent to the chat backends.
///
/// Holds a pre-compiled minijinja environment; construction fails only on a
/// template syntax error, which is a programming bug surfaced at startup.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("options", OPTIONS_TEMPLATE)
            .map_err(|e| GalError::internal(format!("options template: {e}")))?;
        env.add_template("analyze", ANALYZE_TEMPLATE)
            .map_err(|e| GalError::internal(format!("analyze template: {e}")))?;
        env.add_template("execute", EXECUTE_TEMPLATE)
            .map_err(|e| GalError::internal(format!("execute template: {e}")))?;
        Ok(Self { env })
    }

    /// Single-phase prompt: generate five options directly from the input.
    pub fn options_prompt(
        &self,
        scene: &str,
        user_style: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        self.render(
            "options",
            context! {
                scene => scene,
                user_style => user_style,
                history_block => history_block(history),
                styles => style_contexts(),
                output_grammar => OUTPUT_GRAMMAR,
            },
        )
    }

    /// First call of the two-phase flow: sentiment/intent analysis only.
    pub fn analyze_prompt(&self, user_input: &str, history: &[ChatTurn]) -> Result<String> {
        self.render(
            "analyze",
            context! {
                user_input => user_input,
                history_block => history_block(history),
            },
        )
    }

    /// Second call of the two-phase flow. The confirmed analysis is embedded
    /// verbatim as JSON so the model's tone strategy stays consistent with
    /// what the user approved.
    pub fn execute_prompt(
        &self,
        user_input: &str,
        analysis: &SituationAnalysis,
        history: &[ChatTurn],
    ) -> Result<String> {
        let analysis_json = serde_json::to_string(analysis)?;
        self.render(
            "execute",
            context! {
                user_input => user_input,
                analysis_json => analysis_json,
                history_block => history_block(history),
                styles => style_contexts(),
                output_grammar => OUTPUT_GRAMMAR,
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| GalError::internal(format!("missing template {name}: {e}")))?;
        template
            .render(ctx)
            .map_err(|e| GalError::internal(format!("render {name}: {e}")))
    }
}
