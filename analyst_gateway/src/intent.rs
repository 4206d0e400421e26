//! Intent Router
//!
//! Classifies a validated message as one of:
//! - Plain query: free-form question for the analyst (e.g., "최근 실적 요약해줘")
//! - Register entity: start tracking a company (e.g., "애플 등록해줘", "track Tesla")
//! - Compare entities: side-by-side analysis (e.g., "엔비디아와 비교해줘", "AAPL vs MSFT")
//!
//! Matching is lexical. Entity names are returned as typed; resolving them to
//! tickers is left to the collaborators.

use crate::models::ReportKind;
use crate::symbols::{is_hangul, known_names, looks_like_ticker, strip_korean_particle};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Intent {
    PlainQuery(String),
    RegisterEntity(String),
    CompareEntities(Vec<String>),
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::PlainQuery(_) => "plain_query",
            Intent::RegisterEntity(_) => "register_entity",
            Intent::CompareEntities(_) => "compare_entities",
        }
    }
}

/// Routing strategy used by the orchestrator
pub trait IntentStrategy: Send + Sync {
    fn route(&self, message: &str) -> Intent;

    /// Report the user asked for alongside a plain answer, if any
    fn report_kind(&self, _message: &str) -> Option<ReportKind> {
        None
    }
}

lazy_static! {
    static ref REGISTER_CUES: Vec<Regex> = vec![
        Regex::new(r"(?i)^\s*(please\s+)?(register|track)\b").expect("valid regex"),
        Regex::new(r"(?i)\bregister\b").expect("valid regex"),
        Regex::new(r"(?i)\b(start|begin)\s+tracking\b").expect("valid regex"),
        Regex::new(r"(?i)\b(add|put)\b.{0,40}\b(to|on|in)\s+(my\s+|the\s+)?watch\s?list\b").expect("valid regex"),
        // "add" alone only counts when followed by a capitalised ticker and nothing else
        Regex::new(r"^\s*(?i:(please\s+)?add)\s+[A-Z]{2,5}(\.[A-Z])?\s*[.!]?\s*$").expect("valid regex"),
        Regex::new(r"등록|추적해|추가\s?(해\s?줘|해\s?주세요|해\s?줄래|하고|할래|하자)").expect("valid regex"),
    ];

    static ref COMPARE_CUES: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(compare|comparison|versus|vs)\b").expect("valid regex"),
        Regex::new(r"비교").expect("valid regex"),
    ];
}

/// Words consumed by the command itself (matched whole, lowercased)
const COMMAND_WORDS: &[&str] = &[
    "register", "track", "tracking", "add", "put", "watchlist", "watch", "list",
    "compare", "comparison", "versus", "vs", "start", "begin",
];

/// Hangul command stems; a token containing one is part of the command
const COMMAND_STEMS: &[&str] = &["등록", "추가", "추적", "비교", "해줘", "해주세요", "해 줘", "부탁"];

/// Stems of the register verb; an unknown Hangul noun right before one is
/// taken as the name to register ("삼성전자 등록해줘")
const REGISTER_STEMS: &[&str] = &["등록", "추가", "추적"];

const STOPWORDS: &[&str] = &[
    // English function words
    "a", "an", "the", "and", "or", "with", "to", "of", "on", "in", "for", "me", "my",
    "please", "can", "could", "would", "you", "i", "how", "what", "which", "does",
    "do", "is", "are", "against", "between", "stock", "stocks", "shares", "company",
    "companies", "it", "its", "s", "them", "their", "performance", "price", "prices",
    "now", "today", "new",
    // Finance acronyms that look like tickers
    "eps", "etf", "ceo", "cfo", "gdp", "usd", "krw", "rsi", "macd", "per", "pbr", "roe",
    "ipo", "ai", "ok",
    // Korean fillers
    "좀", "주식", "기업", "회사", "종목", "그리고", "관심", "관심종목", "목록", "같이",
    "한번", "내", "나의", "이거", "이것", "주가", "실적", "줘", "주세요",
];

const REPORT_CUES: &[&str] = &["report", "레포트", "리포트", "보고서"];

/// Cue tables driving [`LexicalRouter`]
pub struct CueTable {
    pub register_cues: Vec<Regex>,
    pub compare_cues: Vec<Regex>,
    pub command_words: HashSet<String>,
    pub command_stems: Vec<String>,
    pub register_stems: Vec<String>,
    pub stopwords: HashSet<String>,
    pub known_entities: HashSet<String>,
    pub report_cues: Vec<String>,
}

impl Default for CueTable {
    fn default() -> Self {
        Self {
            register_cues: REGISTER_CUES.clone(),
            compare_cues: COMPARE_CUES.clone(),
            command_words: COMMAND_WORDS.iter().map(|w| w.to_string()).collect(),
            command_stems: COMMAND_STEMS.iter().map(|w| w.to_string()).collect(),
            register_stems: REGISTER_STEMS.iter().map(|w| w.to_string()).collect(),
            stopwords: STOPWORDS.iter().map(|w| w.to_string()).collect(),
            known_entities: known_names().map(|n| n.to_lowercase()).collect(),
            report_cues: REPORT_CUES.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Phrase-matching router
pub struct LexicalRouter {
    cues: CueTable,
}

impl LexicalRouter {
    pub fn new(cues: CueTable) -> Self {
        Self { cues }
    }

    fn has_register_cue(&self, message: &str) -> bool {
        self.cues.register_cues.iter().any(|re| re.is_match(message))
    }

    fn has_compare_cue(&self, message: &str) -> bool {
        self.cues.compare_cues.iter().any(|re| re.is_match(message))
    }

    /// Entity references in order of appearance, deduplicated.
    ///
    /// A token is an entity when it is a known company name, a ticker written
    /// in capitals, or an unknown Hangul noun directly followed by the
    /// register verb.
    pub fn extract_entities(&self, message: &str) -> Vec<String> {
        let tokens: Vec<&str> = message
            .split(|c: char| c.is_whitespace() || ",?!;:()[]{}\"'&+/".contains(c))
            .map(|raw| raw.trim_matches('.'))
            .filter(|token| !token.is_empty())
            .collect();

        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            let next = tokens.get(i + 1).copied();
            if let Some(entity) = self.entity_from_token(token, next) {
                if seen.insert(entity.to_lowercase()) {
                    entities.push(entity.to_string());
                }
            }
        }

        entities
    }

    fn entity_from_token<'a>(&self, token: &'a str, next: Option<&str>) -> Option<&'a str> {
        let lower = token.to_lowercase();
        if self.cues.command_words.contains(&lower) || self.cues.stopwords.contains(&lower) {
            return None;
        }

        if !token.chars().any(is_hangul) {
            return self.is_ascii_entity(token).then_some(token);
        }

        if self.cues.command_stems.iter().any(|stem| token.contains(stem.as_str())) {
            return None;
        }
        let stem = strip_korean_particle(token);
        if self.cues.stopwords.contains(stem) {
            return None;
        }
        if !stem.chars().any(is_hangul) {
            return self.is_ascii_entity(stem).then_some(stem);
        }

        let known = self.cues.known_entities.contains(&stem.to_lowercase());
        let before_register_verb = next.is_some_and(|n| self.is_register_verb(n));
        (known || before_register_verb).then_some(stem)
    }

    fn is_register_verb(&self, token: &str) -> bool {
        self.cues
            .register_stems
            .iter()
            .any(|stem| token.starts_with(stem.as_str()))
    }

    fn is_ascii_entity(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        if self.cues.stopwords.contains(&lower) || self.cues.command_words.contains(&lower) {
            return false;
        }
        if self.cues.known_entities.contains(&lower) {
            return true;
        }

        token.len() >= 2 && looks_like_ticker(token) && !token.chars().any(|c| c.is_ascii_lowercase())
    }
}

impl Default for LexicalRouter {
    fn default() -> Self {
        Self::new(CueTable::default())
    }
}

impl IntentStrategy for LexicalRouter {
    fn route(&self, message: &str) -> Intent {
        let wants_compare = self.has_compare_cue(message);
        let wants_register = self.has_register_cue(message);

        if !wants_compare && !wants_register {
            return Intent::PlainQuery(message.to_string());
        }

        let entities = self.extract_entities(message);

        // Both cues present: the multi-entity reading wins.
        if wants_compare && !entities.is_empty() {
            return Intent::CompareEntities(entities);
        }

        if wants_register {
            if let Some(first) = entities.into_iter().next() {
                return Intent::RegisterEntity(first);
            }
        }

        Intent::PlainQuery(message.to_string())
    }

    fn report_kind(&self, message: &str) -> Option<ReportKind> {
        let lower = message.to_lowercase();
        self.cues
            .report_cues
            .iter()
            .any(|cue| lower.contains(cue.as_str()))
            .then_some(ReportKind::Analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(message: &str) -> Intent {
        LexicalRouter::default().route(message)
    }

    #[test]
    fn test_korean_register() {
        assert_eq!(route("애플 등록해줘"), Intent::RegisterEntity("애플".to_string()));
        assert_eq!(
            route("테슬라를 관심종목에 추가해줘"),
            Intent::RegisterEntity("테슬라".to_string())
        );
    }

    #[test]
    fn test_korean_compare() {
        assert_eq!(
            route("엔비디아와 비교해줘"),
            Intent::CompareEntities(vec!["엔비디아".to_string()])
        );
        assert_eq!(
            route("애플이랑 마이크로소프트 비교 부탁해"),
            Intent::CompareEntities(vec!["애플".to_string(), "마이크로소프트".to_string()])
        );
    }

    #[test]
    fn test_english_commands() {
        assert_eq!(route("Track Tesla"), Intent::RegisterEntity("Tesla".to_string()));
        assert_eq!(
            route("please add NVDA to my watchlist"),
            Intent::RegisterEntity("NVDA".to_string())
        );
        assert_eq!(
            route("Compare Apple and Microsoft"),
            Intent::CompareEntities(vec!["Apple".to_string(), "Microsoft".to_string()])
        );
        assert_eq!(
            route("AAPL vs MSFT?"),
            Intent::CompareEntities(vec!["AAPL".to_string(), "MSFT".to_string()])
        );
    }

    #[test]
    fn test_both_cues_prefer_compare() {
        assert_eq!(
            route("애플 등록하고 엔비디아와 비교해줘"),
            Intent::CompareEntities(vec!["애플".to_string(), "엔비디아".to_string()])
        );
    }

    #[test]
    fn test_plain_queries() {
        let cases = vec![
            "현재 주가와 목표주가 차이는 얼마인가요?",
            "최근 실적 발표 내용을 요약해주세요",
            "What is Apple's track record on buybacks?",
            "투자 리스크 요인은 무엇인가요?",
            "what is RSI?",
        ];

        for c in cases {
            assert_eq!(route(c), Intent::PlainQuery(c.to_string()), "{}", c);
        }
    }

    #[test]
    fn test_questions_with_command_words_stay_plain() {
        let cases = vec![
            "주요 경쟁사와 비교했을 때 장단점은?",
            "애플 실적에 대해 추가해서 설명해줘",
            "Add more detail about Apple's margins",
            "Which sector should I compare against?",
        ];

        for c in cases {
            assert_eq!(route(c), Intent::PlainQuery(c.to_string()), "{}", c);
        }
    }

    #[test]
    fn test_sentence_capitals_are_not_entities() {
        assert_eq!(
            route("Should I compare Tesla with Apple?"),
            Intent::CompareEntities(vec!["Tesla".to_string(), "Apple".to_string()])
        );
        assert_eq!(route("add NVDA"), Intent::RegisterEntity("NVDA".to_string()));
    }

    #[test]
    fn test_unknown_korean_name_before_register_verb() {
        assert_eq!(
            route("삼성전자 등록해줘"),
            Intent::RegisterEntity("삼성전자".to_string())
        );
        assert_eq!(
            LexicalRouter::default().extract_entities("주요 경쟁사와 비교했을 때"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_cue_without_entity_is_plain() {
        assert_eq!(route("비교해줘"), Intent::PlainQuery("비교해줘".to_string()));
        assert_eq!(route("register"), Intent::PlainQuery("register".to_string()));
    }

    #[test]
    fn test_report_cue() {
        let router = LexicalRouter::default();
        assert_eq!(router.report_kind("애플 분석 레포트 만들어줘"), Some(ReportKind::Analysis));
        assert_eq!(router.report_kind("Give me a REPORT on NVDA"), Some(ReportKind::Analysis));
        assert_eq!(router.report_kind("what is RSI?"), None);
    }

    #[test]
    fn test_intent_serializes_tagged() {
        let json = serde_json::to_value(Intent::RegisterEntity("애플".into())).unwrap();
        assert_eq!(json["kind"], "register_entity");
        assert_eq!(json["value"], "애플");
    }
}
