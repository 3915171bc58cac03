//! Search keywords for stock footage.
//!
//! Stock APIs match words, not meaning, so the top keyword is paired with a
//! context word that pulls results toward the intended theme
//! ("garage" -> "garage startup").

use std::collections::HashSet;

const QUERY_WORDS: usize = 3;

const SKIP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "it", "its", "this", "that", "these", "those", "what",
    "which", "who", "all", "each", "every", "some", "any", "no", "not", "only", "just", "about",
    "really", "actually", "basically", "very", "much", "many", "thing", "things", "stuff", "way",
    "lot", "kind", "type", "year", "years", "time", "day", "today", "now", "around", "nearly",
    "make", "get", "take", "use", "show", "look", "become", "picture", "imagine", "think", "say",
    "started", "shapes",
];

const VISUAL_BOOST: &[(&str, u32)] = &[
    // devices
    ("smartphone", 10), ("phone", 10), ("laptop", 10), ("computer", 10), ("tablet", 10),
    ("screen", 8), ("monitor", 8), ("camera", 9), ("smartwatch", 10), ("headphones", 9),
    // people and actions
    ("person", 9), ("people", 9), ("man", 8), ("woman", 8), ("team", 9),
    ("meeting", 10), ("office", 10), ("working", 9), ("typing", 8), ("shopping", 10),
    // places
    ("city", 10), ("street", 8), ("building", 8), ("store", 9), ("home", 8),
    ("factory", 9), ("warehouse", 8), ("classroom", 9), ("garage", 9), ("workshop", 9),
    // business
    ("stock", 10), ("chart", 10), ("graph", 9), ("market", 9), ("trading", 9),
    ("business", 8), ("corporate", 8), ("growth", 8),
    // tech
    ("technology", 8), ("digital", 7), ("software", 8), ("code", 8), ("cloud", 8),
    ("app", 8), ("mobile", 9), ("data", 7), ("server", 8),
    // modifiers
    ("modern", 7), ("vintage", 8), ("retro", 8), ("futuristic", 8),
    ("closeup", 7), ("aerial", 8), ("professional", 7),
];

const SEMANTIC_CONTEXT: &[(&str, &[&str])] = &[
    ("garage", &["startup", "entrepreneur", "innovation"]),
    ("workshop", &["creative", "maker", "professional"]),
    ("stock", &["finance", "investment", "professional"]),
    ("chart", &["data", "analytics", "business"]),
    ("market", &["finance", "trading", "professional"]),
    ("growth", &["success", "business", "upward"]),
    ("smartphone", &["mobile", "technology", "modern"]),
    ("laptop", &["work", "professional", "modern"]),
    ("tablet", &["technology", "modern", "digital"]),
    ("meeting", &["business", "professional", "corporate"]),
    ("office", &["business", "professional", "modern"]),
    ("team", &["collaboration", "business", "professional"]),
    ("shopping", &["retail", "consumer", "store"]),
    ("classroom", &["education", "learning", "students"]),
    ("digital", &["technology", "computer", "screen"]),
    ("cloud", &["technology", "data", "server"]),
    ("global", &["world", "international", "connected"]),
    ("connected", &["network", "technology", "communication"]),
    ("ecosystem", &["technology", "connected", "digital"]),
    ("transformation", &["change", "evolution", "progress"]),
];

struct Theme {
    name: &'static str,
    triggers: &'static [&'static str],
    context: &'static [&'static str],
}

const THEMES: &[Theme] = &[
    Theme {
        name: "tech_startup",
        triggers: &["startup", "garage", "founded", "company", "innovation"],
        context: &["technology", "entrepreneur", "silicon valley"],
    },
    Theme {
        name: "finance",
        triggers: &["stock", "market", "investment", "growth", "percent", "increase"],
        context: &["business", "professional", "finance"],
    },
    Theme {
        name: "product",
        triggers: &["smartphone", "laptop", "tablet", "device", "hardware", "product"],
        context: &["technology", "modern", "sleek"],
    },
    Theme {
        name: "corporate",
        triggers: &["business", "company", "corporate", "enterprise", "institution"],
        context: &["professional", "office", "modern"],
    },
];

fn is_skip_word(word: &str) -> bool {
    SKIP_WORDS.contains(&word)
}

fn visual_boost(word: &str) -> Option<u32> {
    VISUAL_BOOST
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, score)| *score)
}

/// Name of the theme with the most trigger hits, if any.
pub fn detect_theme(text: &str, tags: &[String]) -> Option<&'static str> {
    let combined = format!("{} {}", text.to_lowercase(), tags.join(" ").to_lowercase());

    let mut best: Option<&Theme> = None;
    let mut best_score = 0;
    for theme in THEMES {
        let score = theme
            .triggers
            .iter()
            .filter(|t| combined.contains(*t))
            .count();
        if score > best_score {
            best_score = score;
            best = Some(theme);
        }
    }
    best.map(|t| t.name)
}

fn semantic_context(keyword: &str, theme: Option<&str>) -> Vec<&'static str> {
    let mut out = Vec::new();
    if let Some((_, ctx)) = SEMANTIC_CONTEXT.iter().find(|(k, _)| *k == keyword) {
        out.extend(ctx.iter().take(1).copied());
    }
    if let Some(theme) = theme.and_then(|name| THEMES.iter().find(|t| t.name == name)) {
        out.extend(theme.context.iter().take(1).copied());
    }
    out
}

/// Up to four search keywords for a narration and its visual tags.
pub fn extract_keywords(text: &str, tags: &[String]) -> Vec<String> {
    let theme = detect_theme(text, tags);
    let mut scored: Vec<(String, u32)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for tag in tags {
        for word in tag.to_lowercase().split_whitespace() {
            if word.chars().count() >= 3 && !is_skip_word(word) && !seen.contains(word) {
                scored.push((word.to_string(), 50 + visual_boost(word).unwrap_or(0)));
                seen.insert(word.to_string());
            }
        }
    }

    if scored.len() < 4 {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        for word in cleaned.split_whitespace() {
            if word.chars().count() < 3 || is_skip_word(word) || seen.contains(word) {
                continue;
            }
            if let Some(score) = visual_boost(word) {
                scored.push((word.to_string(), score));
                seen.insert(word.to_string());
            }
        }
    }

    // stable: equal scores keep insertion order
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let mut keywords: Vec<String> = scored.into_iter().take(3).map(|(w, _)| w).collect();

    if let Some(first) = keywords.first().cloned() {
        for ctx in semantic_context(&first, theme) {
            if keywords.len() < 4 && !seen.contains(ctx) {
                keywords.push(ctx.to_string());
                seen.insert(ctx.to_string());
            }
        }
    }

    if keywords.is_empty() {
        vec!["technology".to_string(), "business".to_string()]
    } else {
        keywords
    }
}

/// Primary provider query: the three strongest keywords.
pub fn build_search_query(text: &str, tags: &[String]) -> String {
    extract_keywords(text, tags)
        .into_iter()
        .take(QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Progressively broader queries to try when the primary one finds nothing.
pub fn fallback_queries(primary: &str) -> Vec<String> {
    let words: Vec<&str> = primary.split_whitespace().collect();
    let mut out = Vec::new();
    if words.len() >= 2 {
        out.push(words[..2].join(" "));
    }
    if let Some(first) = words.first() {
        out.push(first.to_string());
    }
    out.push("business professional".to_string());
    out.push("technology modern".to_string());
    out.truncate(4);
    out
}
