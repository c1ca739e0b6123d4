//! Tolerant parser for free-text LLM output.
//!
//! The upstream model is asked for a fixed grammar (a scene summary followed
//! by letter-labeled options with Style/Kaomoji/Favor/Impact metadata lines),
//! but the reply is plain text and nothing guarantees compliance. This module
//! is a best-effort extractor: it scans line by line, classifies each line,
//! and updates the option under construction. It never fails — when fewer
//! than the expected number of options can be recovered it substitutes the
//! canonical fallback set and flags the degradation.
//!
//! Accepted favor grammar, exactly two forms: a `(Favor: ±N)` metadata line,
//! or `好感度` followed by an optional colon and a signed integer embedded in
//! free text. Deltas are clamped to [-5, +5].

use super::option::{DialogOption, OptionLabel, clamp_favor};
use serde::{Deserialize, Serialize};

/// Number of options a complete reply carries; also the fallback set size.
pub const EXPECTED_OPTION_COUNT: usize = 5;

/// Result of parsing one raw model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Free text preceding the first option line
    pub scene_summary: String,
    /// Recovered options; always exactly [`EXPECTED_OPTION_COUNT`] entries
    pub options: Vec<DialogOption>,
    /// True when the canonical fallback set was substituted
    pub is_fallback: bool,
}

/// Parses one raw text blob into a scene summary and dialogue options.
///
/// Never returns an error: if the text yields fewer than
/// [`EXPECTED_OPTION_COUNT`] distinct options, the canonical fallback set is
/// returned instead of a partial list, with `is_fallback` set so callers can
/// surface a soft warning. A scene summary recovered from the degraded text
/// is kept in that case.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut options: Vec<DialogOption> = Vec::new();
    let mut current: Option<DialogOption> = None;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((label, text)) = option_start(line) {
            if let Some(done) = current.take() {
                flush(&mut options, done);
            }
            current = Some(DialogOption::new(label, text));
        } else if let Some(option) = current.as_mut() {
            apply_metadata(option, line);
        } else {
            summary_lines.push(line);
        }
    }
    if let Some(done) = current.take() {
        flush(&mut options, done);
    }

    if options.len() < EXPECTED_OPTION_COUNT {
        let mut degraded = fallback_response();
        if !summary_lines.is_empty() {
            degraded.scene_summary = summary_lines.join("\n");
        }
        return degraded;
    }

    ParsedResponse {
        scene_summary: summary_lines.join("\n"),
        options,
        is_fallback: false,
    }
}

/// The canonical fallback returned when parsing or the upstream call fails.
///
/// Always exactly [`EXPECTED_OPTION_COUNT`] options so downstream code never
/// sees a short list.
pub fn fallback_response() -> ParsedResponse {
    ParsedResponse {
        scene_summary: "⚠️ AI服务暂时不可用，请稍后重试。".to_string(),
        options: fallback_options(),
        is_fallback: true,
    }
}

fn fallback_options() -> Vec<DialogOption> {
    let mut a = DialogOption::new(OptionLabel::A, "系统连接不稳定，无法生成针对性回应。");
    a.style = "系统错误".to_string();
    a.effect = "请检查网络或API配置".to_string();
    a.kaomoji = "(T_T)".to_string();

    let mut b = DialogOption::new(OptionLabel::B, "请尝试刷新页面或重新输入。");
    b.style = "重试建议".to_string();
    b.effect = "无影响".to_string();
    b.kaomoji = "(´･ω･)".to_string();

    let silent = |label: OptionLabel| {
        let mut option = DialogOption::new(label, "...");
        option.style = "沉默".to_string();
        option.effect = "无影响".to_string();
        option.kaomoji = "...".to_string();
        option
    };

    vec![
        a,
        b,
        silent(OptionLabel::C),
        silent(OptionLabel::D),
        silent(OptionLabel::E),
    ]
}

/// Detects an option-start line: a capital letter A–E, a separator (`.` or
/// `、`), and non-empty text.
fn option_start(line: &str) -> Option<(OptionLabel, &str)> {
    let mut chars = line.chars();
    let first = chars.next()?;
    let label = OptionLabel::from_char(first)?;
    let sep = chars.next()?;
    if sep != '.' && sep != '、' {
        return None;
    }
    let text = line[first.len_utf8() + sep.len_utf8()..].trim();
    if text.is_empty() {
        return None;
    }
    Some((label, text))
}

/// Classifies one line inside an option block and updates the builder.
/// Unrecognized lines are ignored for forward compatibility.
fn apply_metadata(option: &mut DialogOption, line: &str) {
    if let Some(value) = paren_tag(line, "Style") {
        option.style = strip_brackets(value);
        return;
    }
    if let Some(value) = paren_tag(line, "Kaomoji") {
        option.kaomoji = value.to_string();
        return;
    }
    if let Some(value) = paren_tag(line, "Favor") {
        if let Some(delta) = parse_signed_int(value) {
            option.favor_change = clamp_favor(delta);
        }
        return;
    }
    if let Some(value) = paren_tag(line, "Impact") {
        option.effect = value.to_string();
        return;
    }
    if let Some(delta) = embedded_favor(line) {
        option.favor_change = clamp_favor(delta);
        return;
    }
    if line.starts_with('【') && line.ends_with('】') {
        option.style = strip_brackets(line);
        return;
    }
    if is_bare_kaomoji(line) {
        option.kaomoji = line.to_string();
        return;
    }
    if let Some(effect) = arrow_effect(line) {
        option.effect = effect.to_string();
    }
}

/// Extracts the value of a `(Key: value)` metadata line, key matched
/// case-insensitively. Fullwidth parentheses and colons are accepted.
fn paren_tag<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let inner = line
        .strip_prefix(['(', '（'])?
        .strip_suffix([')', '）'])?
        .trim();
    let (head, tail) = inner.split_once([':', '：'])?;
    if !head.trim().eq_ignore_ascii_case(key) {
        return None;
    }
    Some(tail.trim())
}

/// Removes CJK and ASCII brackets anywhere in the value.
fn strip_brackets(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '【' | '】' | '[' | ']'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses a leading optionally-signed integer, ignoring trailing text.
fn parse_signed_int(value: &str) -> Option<i32> {
    let value = value.trim();
    let (sign, digits) = match value.strip_prefix('+') {
        Some(rest) => (1, rest),
        None => match value.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, value),
        },
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i32>().ok().map(|n| sign * n)
}

/// Recognizes a favor delta embedded in free text: `好感度`, an optional
/// colon, then a signed integer.
fn embedded_favor(line: &str) -> Option<i32> {
    let idx = line.find("好感度")?;
    let rest = line[idx + "好感度".len()..].trim_start();
    let rest = rest.strip_prefix([':', '：']).unwrap_or(rest).trim_start();
    parse_signed_int(rest)
}

/// A bare parenthesized run containing non-ASCII characters and no colon is
/// treated as a kaomoji line.
fn is_bare_kaomoji(line: &str) -> bool {
    let Some(inner) = line
        .strip_prefix(['(', '（'])
        .and_then(|rest| rest.strip_suffix([')', '）']))
    else {
        return false;
    };
    !inner.contains([':', '：']) && inner.chars().any(|c| !c.is_ascii())
}

/// Text following an arrow token is an impact note.
fn arrow_effect(line: &str) -> Option<&str> {
    let after = line
        .split_once('→')
        .or_else(|| line.split_once("->"))
        .map(|(_, tail)| tail.trim())?;
    if after.is_empty() { None } else { Some(after) }
}

/// Inserts an option, overwriting any earlier one with the same label
/// (last wins).
fn flush(options: &mut Vec<DialogOption>, option: DialogOption) {
    if let Some(existing) = options.iter_mut().find(|o| o.id == option.id) {
        *existing = option;
    } else {
        options.push(option);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The canonical shape the options prompt asks the model for.
    const CANONICAL_REPLY: &str = "\
对方一句\"在吗\"看似随意，实则在试探你的回应意愿。
此刻，你的回应将定义这段对话的温度。(｡･ω･｡)

A. 在的在的，刚刚在想事情，你来得正好
(Style: 【治愈系伙伴】)
(Kaomoji: (◍•ᴗ•◍))
(Favor: +2)
(Impact: 传递安心感，拉近距离)

B. 不在，在的是我的替身
(Style: 【氛围调节者】)
(Kaomoji: (￣▽￣*))
(Favor: +1)
(Impact: 轻松化解试探)

C. 哼，现在才想起我来
(Style: 【心口不一者】)
(Kaomoji: (￣^￣))
(Favor: 0)
(Impact: 保持距离感)

D. 嗯。
(Style: 【疏离观察家】)
(Kaomoji: (ー_ー゛))
(Favor: -1)
(Impact: 冷淡回应)

E. 在！！超级在！！
(Style: 【太阳般友人】)
(Kaomoji: (๑•̀ㅂ•́)و✧)
(Favor: +2)
(Impact: 热情感染对方)";

    #[test]
    fn test_no_option_lines_triggers_fallback() {
        let parsed = parse_response("今天天气不错，适合散步。");
        assert!(parsed.is_fallback);
        assert_eq!(parsed.options.len(), EXPECTED_OPTION_COUNT);
        // The recovered summary is preserved even when degraded
        assert_eq!(parsed.scene_summary, "今天天气不错，适合散步。");
    }

    #[test]
    fn test_empty_input_triggers_canonical_fallback() {
        let parsed = parse_response("");
        assert!(parsed.is_fallback);
        assert_eq!(parsed.options.len(), EXPECTED_OPTION_COUNT);
        assert_eq!(parsed.scene_summary, "⚠️ AI服务暂时不可用，请稍后重试。");
        assert!(parsed.options.iter().all(|o| o.favor_change == 0));
    }

    #[test]
    fn test_canonical_reply_never_falls_back() {
        let parsed = parse_response(CANONICAL_REPLY);
        assert!(!parsed.is_fallback);
        assert_eq!(parsed.options.len(), 5);

        let labels: Vec<OptionLabel> = parsed.options.iter().map(|o| o.id).collect();
        assert_eq!(
            labels,
            vec![
                OptionLabel::A,
                OptionLabel::B,
                OptionLabel::C,
                OptionLabel::D,
                OptionLabel::E
            ]
        );

        let favors: Vec<i32> = parsed.options.iter().map(|o| o.favor_change).collect();
        assert_eq!(favors, vec![2, 1, 0, -1, 2]);

        assert_eq!(parsed.options[0].style, "治愈系伙伴");
        assert_eq!(parsed.options[0].kaomoji, "(◍•ᴗ•◍)");
        assert_eq!(parsed.options[0].effect, "传递安心感，拉近距离");
        assert!(parsed.scene_summary.starts_with("对方一句"));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let first = parse_response(CANONICAL_REPLY);
        let second = parse_response(CANONICAL_REPLY);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_option_list_falls_back() {
        let input = "\
侧写在这里
A. 第一个
B. 第二个
C. 第三个";
        let parsed = parse_response(input);
        assert!(parsed.is_fallback);
        assert_eq!(parsed.options.len(), EXPECTED_OPTION_COUNT);
    }

    #[test]
    fn test_favor_clamped_to_range() {
        let input = "\
A. 夸张的选项
(Favor: +99)
B. 另一个
(Favor: -99)
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert!(!parsed.is_fallback);
        assert_eq!(parsed.options[0].favor_change, 5);
        assert_eq!(parsed.options[1].favor_change, -5);
    }

    #[test]
    fn test_embedded_favor_grammar() {
        let input = "\
A. 选项一
据说这个回应好感度 +2
B. 选项二
这句话里好感度：-3 藏在中间
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert_eq!(parsed.options[0].favor_change, 2);
        assert_eq!(parsed.options[1].favor_change, -3);
    }

    #[test]
    fn test_duplicate_labels_last_wins() {
        let input = "\
A. 旧的A
(Favor: +1)
A. 新的A
(Favor: +3)
B. b
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert!(!parsed.is_fallback);
        assert_eq!(parsed.options.len(), 5);
        assert_eq!(parsed.options[0].text, "新的A");
        assert_eq!(parsed.options[0].favor_change, 3);
    }

    #[test]
    fn test_option_without_metadata_gets_defaults() {
        let input = "\
A. 裸选项
B. b
C. c
D. d
E. e";
        let parsed = parse_response(input);
        let bare = &parsed.options[0];
        assert_eq!(bare.style, "");
        assert_eq!(bare.kaomoji, "");
        assert_eq!(bare.favor_change, 0);
        assert_eq!(bare.emoji, crate::dialog::option::DEFAULT_OPTION_EMOJI);
    }

    #[test]
    fn test_alternate_separator_and_bracket_style() {
        let input = "\
A、顿号分隔的选项
【治愈系伙伴】
B. b
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert_eq!(parsed.options[0].text, "顿号分隔的选项");
        assert_eq!(parsed.options[0].style, "治愈系伙伴");
    }

    #[test]
    fn test_bare_kaomoji_and_arrow_effect() {
        let input = "\
A. 选项
(￣▽￣*)
这个选择 → 气氛缓和
B. b
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert_eq!(parsed.options[0].kaomoji, "(￣▽￣*)");
        assert_eq!(parsed.options[0].effect, "气氛缓和");
    }

    #[test]
    fn test_unrecognized_lines_are_ignored() {
        let input = "\
A. 选项
(Note: 这是未知标签)
完全无关的一行
B. b
C. c
D. d
E. e";
        let parsed = parse_response(input);
        assert!(!parsed.is_fallback);
        assert_eq!(parsed.options[0].kaomoji, "");
        assert_eq!(parsed.options[0].effect, "");
    }
}
