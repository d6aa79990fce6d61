use crate::error::RuleError;
use crate::scan::rules::{parse_rules, Condition, Pattern, Quantifier, RuleDef};
use crate::scan::wire::{RuleMatch, StringMatch};
use regex::bytes::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashSet};

/// A compiled, ready-to-scan set of rules
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    meta: BTreeMap<String, String>,
    strings: Vec<CompiledString>,
    condition: Condition,
}

#[derive(Debug)]
struct CompiledString {
    ident: String,
    regex: Regex,
}

impl RuleSet {
    /// Compile rule sources. Rule names must be unique across all sources.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self, RuleError> {
        let mut names = HashSet::new();
        let mut rules = Vec::new();
        for source in sources {
            for def in parse_rules(source.as_ref())? {
                if !names.insert(def.name.clone()) {
                    return Err(RuleError::DuplicateRule { rule: def.name });
                }
                rules.push(CompiledRule::new(def)?);
            }
        }
        Ok(RuleSet { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Rules whose condition holds for `data`, in declaration order
    pub fn scan(&self, data: &[u8]) -> Vec<RuleMatch> {
        self.rules.iter().filter_map(|r| r.evaluate(data)).collect()
    }
}

impl CompiledRule {
    fn new(def: RuleDef) -> Result<Self, RuleError> {
        let mut strings: Vec<CompiledString> = Vec::with_capacity(def.strings.len());
        for s in def.strings {
            let invalid = |reason: String| RuleError::InvalidPattern {
                rule: def.name.clone(),
                ident: format!("${}", s.ident),
                reason,
            };
            if strings.iter().any(|c| c.ident == s.ident) {
                return Err(invalid("duplicate string identifier".to_owned()));
            }
            if matches!(&s.pattern, Pattern::Text { bytes, .. } if bytes.is_empty()) {
                return Err(invalid("empty string".to_owned()));
            }
            let regex = build_regex(&s.pattern).map_err(|e| invalid(e.to_string()))?;
            strings.push(CompiledString {
                ident: s.ident,
                regex,
            });
        }
        for ident in def.condition.idents() {
            if !strings.iter().any(|s| s.ident == ident) {
                return Err(RuleError::UndefinedString {
                    rule: def.name,
                    ident: format!("${}", ident),
                });
            }
        }
        if let Some(reason) = trivial_quantifier(&def.condition, strings.len()) {
            return Err(RuleError::InvalidCondition {
                rule: def.name,
                reason: reason.to_owned(),
            });
        }
        let meta = def
            .meta
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        Ok(CompiledRule {
            name: def.name,
            meta,
            strings,
            condition: def.condition,
        })
    }

    fn evaluate(&self, data: &[u8]) -> Option<RuleMatch> {
        let hits: Vec<Vec<StringMatch>> = self.strings.iter().map(|s| s.find_all(data)).collect();
        if !self.holds(&self.condition, &hits) {
            return None;
        }
        Some(RuleMatch {
            rule: self.name.clone(),
            meta: self.meta.clone(),
            matches: hits.into_iter().flatten().collect(),
        })
    }

    fn holds(&self, condition: &Condition, hits: &[Vec<StringMatch>]) -> bool {
        match condition {
            Condition::Bool(b) => *b,
            Condition::Ident(id) => self
                .strings
                .iter()
                .zip(hits)
                .any(|(s, h)| s.ident == *id && !h.is_empty()),
            Condition::Of(q) => {
                let matched = hits.iter().filter(|h| !h.is_empty()).count();
                match q {
                    Quantifier::Any => matched > 0,
                    Quantifier::All => matched == hits.len(),
                    Quantifier::AtLeast(n) => matched >= *n,
                }
            }
            Condition::Not(c) => !self.holds(c, hits),
            Condition::And(cs) => cs.iter().all(|c| self.holds(c, hits)),
            Condition::Or(cs) => cs.iter().any(|c| self.holds(c, hits)),
        }
    }
}

fn trivial_quantifier(condition: &Condition, string_count: usize) -> Option<&'static str> {
    match condition {
        Condition::Of(_) if string_count == 0 => Some("`of them` without strings"),
        Condition::Of(Quantifier::AtLeast(0)) => Some("`0 of them` always holds"),
        Condition::Not(c) => trivial_quantifier(c, string_count),
        Condition::And(cs) | Condition::Or(cs) => {
            cs.iter().find_map(|c| trivial_quantifier(c, string_count))
        }
        _ => None,
    }
}

impl CompiledString {
    fn find_all(&self, data: &[u8]) -> Vec<StringMatch> {
        self.regex
            .find_iter(data)
            .filter(|m| !m.as_bytes().is_empty())
            .map(|m| StringMatch {
                identifier: format!("${}", self.ident),
                offset: m.start(),
                length: m.end() - m.start(),
            })
            .collect()
    }
}

/// Byte-exact regex for a literal, ASCII letters folded when `nocase`
fn literal(bytes: &[u8], nocase: bool) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        if nocase && b.is_ascii_alphabetic() {
            out.push('[');
            out.push(char::from(b.to_ascii_lowercase()));
            out.push(char::from(b.to_ascii_uppercase()));
            out.push(']');
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

fn build_regex(pattern: &Pattern) -> Result<Regex, regex::Error> {
    match pattern {
        Pattern::Text { bytes, modifiers } => {
            let mut alternatives = Vec::with_capacity(2);
            if modifiers.ascii || !modifiers.wide {
                alternatives.push(literal(bytes, modifiers.nocase));
            }
            if modifiers.wide {
                let wide: Vec<u8> = bytes.iter().flat_map(|&b| [b, 0]).collect();
                alternatives.push(literal(&wide, modifiers.nocase));
            }
            RegexBuilder::new(&alternatives.join("|"))
                .unicode(false)
                .build()
        }
        Pattern::Hex(tokens) => {
            let source: String = tokens
                .iter()
                .map(|t| match t {
                    Some(b) => format!("\\x{:02x}", b),
                    None => ".".to_owned(),
                })
                .collect();
            RegexBuilder::new(&source)
                .unicode(false)
                .dot_matches_new_line(true)
                .build()
        }
        Pattern::Regex {
            source,
            case_insensitive,
            dot_all,
        } => RegexBuilder::new(source)
            .unicode(false)
            .case_insensitive(*case_insensitive)
            .dot_matches_new_line(*dot_all)
            .build(),
    }
}
