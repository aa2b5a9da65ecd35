//! 分词：工具描述与子任务描述的关键词相似度
//!
//! 含 CJK 字符时使用 jieba-rs 分词；其余按非字母数字字符切分（snake_case 名称也会被拆开）。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "from", "with", "into", "that", "this", "each", "given", "of", "to",
    "in", "on", "by", "an", "as", "is", "it", "its", "or", "be", "are", "returns", "return",
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn keep(token: &str) -> bool {
    let first_cjk = token.chars().next().map(is_cjk).unwrap_or(false);
    (token.chars().count() > 1 || first_cjk) && !STOPWORDS.contains(&token)
}

/// 分词并小写化，过滤单字符与常见停用词
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .flat_map(|s| {
                s.split(|c: char| !c.is_alphanumeric() && !is_cjk(c))
                    .map(|p| p.to_lowercase())
                    .collect::<Vec<_>>()
            })
            .filter(|s| keep(s))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .filter(|s| keep(s))
            .collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard 相似度
pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

/// 两段文本的关键词相似度
pub fn keyword_similarity(a: &str, b: &str) -> f32 {
    jaccard_similarity(&tokenize_to_set(a), &tokenize_to_set(b))
}
