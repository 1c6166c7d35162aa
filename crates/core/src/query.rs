//! Query intent classification and expansion (spec §4.9, C11). New — the
//! donor has no query-understanding layer (its `cs_search` goes straight to
//! fuzzy matching, see `fuzzy.rs`); authored fresh in the donor's
//! const-table-plus-small-function idiom (same shape as `policy.rs`'s deny
//! lists).

use std::collections::BTreeSet;
use std::time::Instant;

pub const MAX_INTENTS: usize = 3;
pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_EXPANSION_TERMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntentCategory {
    Function,
    Class,
    Error,
    Database,
    Api,
    Auth,
    Test,
    Config,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Class => "CLASS",
            Self::Error => "ERROR",
            Self::Database => "DATABASE",
            Self::Api => "API",
            Self::Auth => "AUTH",
            Self::Test => "TEST",
            Self::Config => "CONFIG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentMatch {
    pub category: IntentCategory,
    pub confidence: f64,
}

struct IntentRule {
    category: IntentCategory,
    keywords: &'static [&'static str],
}

const RULES: &[IntentRule] = &[
    IntentRule { category: IntentCategory::Function, keywords: &["function", "func", "method", "fn", "call", "invoke", "routine"] },
    IntentRule { category: IntentCategory::Class, keywords: &["class", "struct", "interface", "object", "type", "instance"] },
    IntentRule { category: IntentCategory::Error, keywords: &["error", "exception", "panic", "fail", "throw", "catch", "bug", "crash"] },
    IntentRule { category: IntentCategory::Database, keywords: &["database", "db", "sql", "query", "table", "schema", "migration", "orm"] },
    IntentRule { category: IntentCategory::Api, keywords: &["api", "endpoint", "route", "request", "response", "rest", "http", "handler"] },
    IntentRule { category: IntentCategory::Auth, keywords: &["auth", "authenticate", "authorize", "login", "logout", "session", "token", "permission"] },
    IntentRule { category: IntentCategory::Test, keywords: &["test", "spec", "mock", "fixture", "assert", "suite"] },
    IntentRule { category: IntentCategory::Config, keywords: &["config", "configuration", "settings", "env", "options", "toml", "yaml"] },
];

/// Splits CamelCase and snake_case into lowercase tokens, plus plain
/// whitespace/punctuation splitting (spec §4.9 tokenization requirement).
pub fn tokenize(q: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in q.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let mut current = String::new();
        let chars: Vec<char> = raw.chars().collect();
        for (i, ch) in chars.iter().enumerate() {
            if *ch == '_' {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current).to_lowercase());
                }
                continue;
            }
            if i > 0 && ch.is_uppercase() && chars[i - 1].is_lowercase() {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current).to_lowercase());
                }
            }
            current.push(*ch);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

/// `detect_intent(q) → [{category, confidence}]`, at most `MAX_INTENTS`
/// entries above `MIN_CONFIDENCE`, sorted by confidence descending. Runs in
/// well under 10ms — pure token-set intersection against const tables.
pub fn detect_intent(q: &str) -> Vec<IntentMatch> {
    let tokens: BTreeSet<String> = tokenize(q).into_iter().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let start = Instant::now();
    let mut matches: Vec<IntentMatch> = RULES
        .iter()
        .filter_map(|rule| {
            let hits = rule.keywords.iter().filter(|kw| tokens.contains(**kw)).count();
            if hits == 0 {
                return None;
            }
            let confidence = (hits as f64 / rule.keywords.len().min(4) as f64).min(1.0);
            Some(IntentMatch { category: rule.category, confidence })
        })
        .filter(|m| m.confidence >= MIN_CONFIDENCE)
        .collect();

    matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    matches.truncate(MAX_INTENTS);
    debug_assert!(start.elapsed().as_millis() < 10);
    matches
}

/// ≥50 common code abbreviations (spec §4.9). Each entry's terms are appended
/// to the query, up to `MAX_EXPANSION_TERMS` overall, skipping terms already
/// present as a token.
const EXPANSIONS: &[(&str, &[&str])] = &[
    ("auth", &["authentication", "authorize", "login"]),
    ("db", &["database", "query", "sql"]),
    ("api", &["endpoint", "route", "request", "response"]),
    ("fn", &["function", "method"]),
    ("func", &["function"]),
    ("config", &["configuration", "settings"]),
    ("cfg", &["configuration"]),
    ("env", &["environment"]),
    ("ctx", &["context"]),
    ("req", &["request"]),
    ("res", &["response", "result"]),
    ("resp", &["response"]),
    ("err", &["error", "exception"]),
    ("exc", &["exception"]),
    ("msg", &["message"]),
    ("pkg", &["package", "module"]),
    ("mod", &["module"]),
    ("impl", &["implementation"]),
    ("init", &["initialize", "constructor"]),
    ("ctor", &["constructor"]),
    ("dtor", &["destructor"]),
    ("async", &["asynchronous", "concurrent"]),
    ("sync", &["synchronous"]),
    ("concur", &["concurrency", "parallel"]),
    ("perm", &["permission", "authorization"]),
    ("admin", &["administrator"]),
    ("usr", &["user"]),
    ("pwd", &["password"]),
    ("pw", &["password"]),
    ("tok", &["token"]),
    ("jwt", &["token", "authentication"]),
    ("sess", &["session"]),
    ("cb", &["callback"]),
    ("evt", &["event"]),
    ("hdlr", &["handler"]),
    ("mgr", &["manager"]),
    ("svc", &["service"]),
    ("repo", &["repository"]),
    ("ctrl", &["controller"]),
    ("mdl", &["model"]),
    ("schema", &["structure", "definition"]),
    ("migr", &["migration"]),
    ("idx", &["index"]),
    ("qry", &["query"]),
    ("calc", &["calculate", "compute"]),
    ("util", &["utility", "helper"]),
    ("lib", &["library"]),
    ("dep", &["dependency"]),
    ("var", &["variable"]),
    ("param", &["parameter", "argument"]),
    ("arg", &["argument"]),
    ("ret", &["return"]),
    ("val", &["value"]),
    ("obj", &["object"]),
    ("arr", &["array"]),
    ("str", &["string"]),
    ("num", &["number"]),
    ("bool", &["boolean"]),
    ("len", &["length"]),
    ("temp", &["temporary"]),
    ("tmp", &["temporary"]),
    ("max", &["maximum"]),
    ("min", &["minimum"]),
    ("avg", &["average"]),
    ("btn", &["button"]),
    ("nav", &["navigation"]),
    ("ui", &["interface", "frontend"]),
    ("ux", &["experience"]),
    ("ws", &["websocket"]),
    ("http", &["request", "web"]),
    ("tcp", &["network", "socket"]),
    ("io", &["input", "output"]),
    ("fs", &["filesystem"]),
    ("sys", &["system"]),
    ("proc", &["process"]),
    ("thread", &["concurrency"]),
    ("test", &["unittest", "spec"]),
    ("mock", &["stub", "fixture"]),
    ("ci", &["continuousintegration"]),
    ("cd", &["continuousdeployment"]),
];

/// `expand_query(q)` appends up to `MAX_EXPANSION_TERMS` synonyms of tokens
/// already present in `q`, skipping terms the query already contains.
pub fn expand_query(q: &str) -> String {
    let tokens: BTreeSet<String> = tokenize(q).into_iter().collect();
    let mut added: Vec<&str> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    'outer: for (abbr, terms) in EXPANSIONS {
        if !tokens.contains(*abbr) {
            continue;
        }
        for term in *terms {
            if tokens.contains(*term) || seen.contains(term) {
                continue;
            }
            seen.insert(term);
            added.push(term);
            if added.len() >= MAX_EXPANSION_TERMS {
                break 'outer;
            }
        }
    }

    if added.is_empty() {
        q.to_string()
    } else {
        format!("{q} {}", added.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_camel_and_snake_case() {
        let tokens = tokenize("getUserById find_user");
        assert_eq!(tokens, vec!["get", "user", "by", "id", "find", "user"]);
    }

    #[test]
    fn detect_intent_finds_auth_category() {
        let matches = detect_intent("authenticate login flow");
        assert!(matches.iter().any(|m| m.category == IntentCategory::Auth));
    }

    #[test]
    fn detect_intent_returns_empty_for_blank_query() {
        assert!(detect_intent("   ").is_empty());
    }

    #[test]
    fn detect_intent_caps_at_max_intents() {
        let matches = detect_intent("function class error database api auth test config");
        assert!(matches.len() <= MAX_INTENTS);
    }

    #[test]
    fn expand_query_appends_known_synonyms() {
        let expanded = expand_query("db auth");
        assert!(expanded.contains("database"));
        assert!(expanded.contains("authentication"));
    }

    #[test]
    fn expand_query_is_noop_for_unknown_terms() {
        assert_eq!(expand_query("xyzzy"), "xyzzy");
    }
}
