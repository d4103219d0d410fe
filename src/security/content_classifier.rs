//! 内容识别：链接、virtex、违禁词
//!
//! 全部为纯函数，不持有状态。

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// 协议前缀 URL、www.、平台深链、@用户名
    static ref LINK_PATTERN: Regex =
        Regex::new(r"(?i)(https?://|www\.|t\.me/|telegram\.me/|@)[^\s]+")
            .expect("link pattern is valid");
}

/// virtex 判定阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtexThresholds {
    /// 超过此字符数视为超长
    pub max_length: usize,
    /// 同一字符连续出现达到此次数
    pub repeat_run: usize,
    /// 不可见/格式控制字符连续达到此数量
    pub invisible_run: usize,
}

impl Default for VirtexThresholds {
    fn default() -> Self {
        Self {
            max_length: 4000,
            repeat_run: 51,
            invisible_run: 20,
        }
    }
}

/// virtex 类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtexKind {
    /// 超长消息
    Oversized,
    /// 单字符长串重复
    Repetition,
    /// 零宽/格式控制字符长串
    InvisibleRun,
}

impl VirtexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtexKind::Oversized => "oversized",
            VirtexKind::Repetition => "repetition",
            VirtexKind::InvisibleRun => "invisible_run",
        }
    }
}

/// 提取所有链接片段（保持出现顺序）
pub fn detect_links(text: &str) -> Vec<String> {
    LINK_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 返回未被白名单豁免的链接
///
/// 白名单按整条消息做大小写不敏感的子串匹配：只要任一白名单项出现在消息中，
/// 所有链接都被豁免，与具体命中的链接片段无关。
pub fn find_link_violations(text: &str, whitelist: &[String]) -> Vec<String> {
    let links = detect_links(text);
    if links.is_empty() {
        return links;
    }

    let lowered = text.to_lowercase();
    let whitelisted = whitelist
        .iter()
        .any(|allowed| lowered.contains(&allowed.to_lowercase()));

    if whitelisted {
        Vec::new()
    } else {
        links
    }
}

/// 不可见字符分两类，各自独立计算连续长度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvisibleClass {
    /// 零宽空格/连接符/方向标记及 BOM
    ZeroWidth,
    /// 词连接符与格式控制字符
    FormatControl,
}

fn invisible_class(c: char) -> Option<InvisibleClass> {
    match c {
        '\u{200B}'..='\u{200F}' | '\u{FEFF}' => Some(InvisibleClass::ZeroWidth),
        '\u{2060}'..='\u{206F}' => Some(InvisibleClass::FormatControl),
        _ => None,
    }
}

/// 最长单字符连续重复长度（换行不参与）
fn longest_repeat_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in text.chars() {
        if c == '\n' {
            current = 0;
            previous = None;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

/// 同一类不可见字符的最长连续长度，类别切换即重新计数
fn longest_invisible_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<InvisibleClass> = None;
    for c in text.chars() {
        match invisible_class(c) {
            Some(class) if previous == Some(class) => current += 1,
            Some(class) => {
                current = 1;
                previous = Some(class);
            }
            None => {
                current = 0;
                previous = None;
            }
        }
        longest = longest.max(current);
    }
    longest
}

/// 按给定阈值识别 virtex，超长优先
pub fn classify_virtex_with(text: &str, thresholds: &VirtexThresholds) -> Option<VirtexKind> {
    if text.chars().count() > thresholds.max_length {
        return Some(VirtexKind::Oversized);
    }
    if longest_repeat_run(text) >= thresholds.repeat_run {
        return Some(VirtexKind::Repetition);
    }
    if longest_invisible_run(text) >= thresholds.invisible_run {
        return Some(VirtexKind::InvisibleRun);
    }
    None
}

pub fn classify_virtex(text: &str) -> Option<VirtexKind> {
    classify_virtex_with(text, &VirtexThresholds::default())
}

pub fn is_virtex(text: &str) -> bool {
    classify_virtex(text).is_some()
}

/// 按配置顺序返回第一个命中的违禁词（大小写不敏感子串）
pub fn match_banned_word<'a>(text: &str, words: &'a [String]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    words
        .iter()
        .find(|word| lowered.contains(&word.to_lowercase()))
        .map(String::as_str)
}
