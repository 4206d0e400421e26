//! Company name → ticker resolution
//!
//! Names arrive from the intent router exactly as the user typed them
//! ("애플", "Nvidia", "msft"). Collaborators resolve them here before calling
//! the market-data provider.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// (alias, ticker) pairs; aliases are matched case-insensitively
const ALIASES: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("애플", "AAPL"),
    ("nvidia", "NVDA"),
    ("엔비디아", "NVDA"),
    ("microsoft", "MSFT"),
    ("마이크로소프트", "MSFT"),
    ("마소", "MSFT"),
    ("tesla", "TSLA"),
    ("테슬라", "TSLA"),
    ("amazon", "AMZN"),
    ("아마존", "AMZN"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("구글", "GOOGL"),
    ("알파벳", "GOOGL"),
    ("meta", "META"),
    ("facebook", "META"),
    ("메타", "META"),
    ("페이스북", "META"),
    ("netflix", "NFLX"),
    ("넷플릭스", "NFLX"),
    ("amd", "AMD"),
    ("intel", "INTC"),
    ("인텔", "INTC"),
    ("broadcom", "AVGO"),
    ("브로드컴", "AVGO"),
    ("qualcomm", "QCOM"),
    ("퀄컴", "QCOM"),
    ("oracle", "ORCL"),
    ("오라클", "ORCL"),
    ("salesforce", "CRM"),
    ("세일즈포스", "CRM"),
    ("adobe", "ADBE"),
    ("어도비", "ADBE"),
    ("palantir", "PLTR"),
    ("팔란티어", "PLTR"),
    ("coca-cola", "KO"),
    ("cocacola", "KO"),
    ("코카콜라", "KO"),
    ("disney", "DIS"),
    ("디즈니", "DIS"),
    ("starbucks", "SBUX"),
    ("스타벅스", "SBUX"),
    ("jpmorgan", "JPM"),
    ("제이피모건", "JPM"),
    ("berkshire", "BRK.B"),
    ("버크셔", "BRK.B"),
    ("walmart", "WMT"),
    ("월마트", "WMT"),
    ("visa", "V"),
    ("비자", "V"),
    ("tsmc", "TSM"),
    ("티에스엠씨", "TSM"),
];

lazy_static! {
    static ref ALIAS_MAP: HashMap<String, &'static str> = ALIASES
        .iter()
        .map(|(alias, ticker)| (alias.to_lowercase(), *ticker))
        .collect();
}

/// Lowercased aliases, for lexical entity detection
pub fn known_names() -> impl Iterator<Item = &'static str> {
    ALIASES.iter().map(|(alias, _)| *alias)
}

/// Tokens that already look like a US ticker: 1–5 ASCII letters with an
/// optional class suffix, e.g. `AAPL`, `brk.b`.
pub fn looks_like_ticker(token: &str) -> bool {
    let (base, class) = match token.split_once('.') {
        Some((base, class)) => (base, Some(class)),
        None => (token, None),
    };
    let base_ok = (1..=5).contains(&base.len()) && base.chars().all(|c| c.is_ascii_alphabetic());
    let class_ok = class.map_or(true, |c| c.len() == 1 && c.chars().all(|ch| ch.is_ascii_alphabetic()));
    base_ok && class_ok
}

#[derive(Debug, Clone, Default)]
pub struct SymbolResolver {
    extra: HashMap<String, String>,
}

impl SymbolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override an alias
    pub fn with_alias(mut self, alias: &str, ticker: &str) -> Self {
        self.extra
            .insert(alias.trim().to_lowercase(), ticker.trim().to_uppercase());
        self
    }

    /// Ticker for a user-supplied name, if one can be determined
    pub fn resolve(&self, name: &str) -> Option<String> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        if let Some(ticker) = self.extra.get(&key) {
            return Some(ticker.clone());
        }
        if let Some(ticker) = ALIAS_MAP.get(&key) {
            return Some(ticker.to_string());
        }
        if looks_like_ticker(name.trim()) {
            return Some(name.trim().to_uppercase());
        }
        None
    }

    /// Every ticker mentioned in free text, in order of appearance
    pub fn resolve_mentions(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();

        for raw in text.split(|c: char| c.is_whitespace() || ",?!;:()\"'".contains(c)) {
            let token = raw.trim_matches(|c: char| c == '.');
            if token.is_empty() {
                continue;
            }

            let candidate = strip_korean_particle(token);
            let by_alias = self
                .extra
                .get(&candidate.to_lowercase())
                .cloned()
                .or_else(|| ALIAS_MAP.get(&candidate.to_lowercase()).map(|t| t.to_string()));
            // Bare tickers only count when written in capitals.
            let ticker = by_alias.or_else(|| {
                (token.len() >= 2
                    && looks_like_ticker(token)
                    && token.chars().all(|c| !c.is_ascii_lowercase()))
                .then(|| token.to_string())
            });

            if let Some(ticker) = ticker {
                if !found.contains(&ticker) {
                    found.push(ticker);
                }
            }
        }

        found
    }
}

/// Korean particles that attach to nouns, longest first
pub const KOREAN_PARTICLES: &[&str] = &[
    "이랑", "하고", "에서", "으로", "와", "과", "랑", "을", "를", "은", "는", "도", "의", "에", "로",
];

/// Remove one trailing particle from a Hangul token, keeping at least one
/// character of the noun.
pub fn strip_korean_particle(token: &str) -> &str {
    if !token.chars().any(is_hangul) {
        return token;
    }
    for particle in KOREAN_PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if !stem.is_empty() {
                return stem;
            }
        }
    }
    token
}

pub fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}
