//! Fixed role-style vocabulary for generated options.
//!
//! Each of the five option slots A–E carries a fixed persona: the prompt
//! instructs the model to use exactly these tags and to pick kaomoji from
//! the matching bank, and the parser's style metadata comes back in the
//! same vocabulary.

use galchat_core::dialog::option::OptionLabel;
use rand::seq::SliceRandom;

/// One entry of the role-style registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleProfile {
    /// Option slot this style is pinned to
    pub label: OptionLabel,
    /// Short style name ("温柔", "幽默", ...)
    pub name: &'static str,
    /// Role tag the model must emit in the Style metadata line
    pub tag: &'static str,
    /// Kaomoji the model may pick from for this style
    pub kaomoji_bank: &'static [&'static str],
}

/// The five fixed role styles, in option-slot order.
pub static ROLE_STYLES: [StyleProfile; 5] = [
    StyleProfile {
        label: OptionLabel::A,
        name: "温柔",
        tag: "治愈系伙伴",
        kaomoji_bank: &["(｡•́︿•̀｡)", "(◍•ᴗ•◍)", "(๑'ㅂ๑)", "(T_T)", "(｡･ω･｡)"],
    },
    StyleProfile {
        label: OptionLabel::B,
        name: "幽默",
        tag: "氛围调节者",
        kaomoji_bank: &["(￣▽￣*)", "(ノ￣▽￣)", "(´･ω･)", "(≧∇≦)/", "(o^ω^o)"],
    },
    StyleProfile {
        label: OptionLabel::C,
        name: "傲娇",
        tag: "心口不一者",
        kaomoji_bank: &["(￣^￣)", "(๑•́ ₃ •̀๑)", "(¬_¬)", "(///ω///)", "(￣ε(#￣)"],
    },
    StyleProfile {
        label: OptionLabel::D,
        name: "高冷",
        tag: "疏离观察家",
        kaomoji_bank: &["(ー_ー゛)", "(→_→)", "(´-ω-｀)", "(￣ヘ￣)", "(눈_눈)"],
    },
    StyleProfile {
        label: OptionLabel::E,
        name: "热情",
        tag: "太阳般友人",
        kaomoji_bank: &["(๑•̀ㅂ•́)و✧", "(≧∇≦)ﾉ", "o(≧口≦)o", "(★^O^★)", "(ง •_•)ง"],
    },
];

/// Looks up the style pinned to an option slot.
pub fn profile_for(label: OptionLabel) -> &'static StyleProfile {
    // ROLE_STYLES is indexed in label order
    &ROLE_STYLES[label as usize]
}

/// Samples `n` distinct styles for prompt variety.
pub fn sample_styles(n: usize) -> Vec<&'static StyleProfile> {
    let mut rng = rand::thread_rng();
    ROLE_STYLES
        .choose_multiple(&mut rng, n.min(ROLE_STYLES.len()))
        .collect()
}
