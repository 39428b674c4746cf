use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::AgentRecord;

use super::types::{AgentSummary, FilterOptions, SearchFilters, SearchHit};

const K1: f64 = 1.2;
const B: f64 = 0.7;

const EXACT_WEIGHT: f64 = 1.0;
const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
/// Allowed edit distance as a fraction of the query term length.
const FUZZY_RATIO: f64 = 0.2;

/// Indexed fields and their boosts.
const FIELDS: [(&str, f64); 4] = [
    ("name", 3.0),
    ("description", 2.0),
    ("identity", 1.0),
    ("vocabulary", 1.0),
];

pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Lowercase and split on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Default)]
struct FieldStats {
    /// Per document: term -> frequency.
    tf: Vec<HashMap<String, usize>>,
    len: Vec<usize>,
    df: HashMap<String, usize>,
    avg_len: f64,
}

impl FieldStats {
    fn add(&mut self, text: &str) {
        let mut freqs: HashMap<String, usize> = HashMap::new();
        let tokens = tokenize(text);
        for t in &tokens {
            *freqs.entry(t.clone()).or_insert(0) += 1;
        }
        for t in freqs.keys() {
            *self.df.entry(t.clone()).or_insert(0) += 1;
        }
        self.len.push(tokens.len());
        self.tf.push(freqs);
    }

    fn finish(&mut self) {
        let n = self.len.len();
        self.avg_len = if n > 0 {
            self.len.iter().sum::<usize>() as f64 / n as f64
        } else {
            0.0
        };
    }

    fn bm25(&self, doc: usize, term: &str, total_docs: f64) -> f64 {
        let Some(&tf) = self.tf[doc].get(term) else {
            return 0.0;
        };
        let df = self.df.get(term).copied().unwrap_or(0) as f64;
        let idf = (1.0 + (total_docs - df + 0.5) / (df + 0.5)).ln();
        let tf = tf as f64;
        let norm = if self.avg_len > 0.0 {
            1.0 - B + B * (self.len[doc] as f64 / self.avg_len)
        } else {
            1.0
        };
        idf * (tf * (K1 + 1.0)) / (tf + K1 * norm)
    }
}

/// Immutable index; rebuilt wholesale after any write.
#[derive(Debug)]
pub struct SearchIndex {
    docs: Vec<AgentRecord>,
    fields: Vec<(FieldStats, f64)>,
    vocabulary: BTreeSet<String>,
}

impl SearchIndex {
    pub fn build(mut docs: Vec<AgentRecord>) -> Self {
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        let mut fields: Vec<(FieldStats, f64)> = FIELDS
            .iter()
            .map(|(_, boost)| (FieldStats::default(), *boost))
            .collect();
        for doc in &docs {
            for (i, (name, _)) in FIELDS.iter().enumerate() {
                fields[i].0.add(&field_text(doc, name));
            }
        }
        let mut vocabulary = BTreeSet::new();
        for (stats, _) in &mut fields {
            stats.finish();
            vocabulary.extend(stats.df.keys().cloned());
        }
        tracing::debug!(
            docs = docs.len(),
            terms = vocabulary.len(),
            "search index built"
        );
        Self {
            docs,
            fields,
            vocabulary,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Index terms matching one query term, with their match weight.
    fn expand(&self, query_term: &str) -> Vec<(&str, f64)> {
        let max_distance = (FUZZY_RATIO * query_term.chars().count() as f64).floor() as usize;
        let mut out = Vec::new();
        for term in &self.vocabulary {
            let weight = if term == query_term {
                EXACT_WEIGHT
            } else {
                let prefix = term.starts_with(query_term);
                let fuzzy = max_distance > 0 && levenshtein(query_term, term) <= max_distance;
                match (prefix, fuzzy) {
                    (_, true) => FUZZY_WEIGHT,
                    (true, false) => PREFIX_WEIGHT,
                    (false, false) => continue,
                }
            };
            out.push((term.as_str(), weight));
        }
        out
    }

    /// Ranked OR-search. Ties are broken by id.
    pub fn search(&self, query: &str, filters: &SearchFilters) -> Vec<SearchHit> {
        let expansions: Vec<(&str, f64)> = tokenize(query)
            .iter()
            .flat_map(|q| self.expand(q))
            .collect();
        if expansions.is_empty() {
            return Vec::new();
        }

        let total_docs = self.docs.len() as f64;
        let mut hits = Vec::new();
        for (i, doc) in self.docs.iter().enumerate() {
            if !filters.matches(doc) {
                continue;
            }
            let mut score = 0.0;
            let mut matched = BTreeSet::new();
            for (term, weight) in &expansions {
                for (stats, boost) in &self.fields {
                    let s = stats.bm25(i, term, total_docs);
                    if s > 0.0 {
                        score += s * boost * weight;
                        matched.insert(term.to_string());
                    }
                }
            }
            if score > 0.0 {
                hits.push(SearchHit {
                    agent: AgentSummary::from(doc),
                    score,
                    matches: matched.into_iter().collect(),
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.agent.id.cmp(&b.agent.id))
        });
        hits
    }

    /// Autocomplete: hits grouped by matched-term set, best groups first.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let mut groups: HashMap<String, f64> = HashMap::new();
        for hit in self.search(query, &SearchFilters::default()) {
            *groups.entry(hit.matches.join(" ")).or_insert(0.0) += hit.score;
        }
        let mut ranked: Vec<(String, f64)> = groups.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.into_iter().take(limit).map(|(s, _)| s).collect()
    }

    pub fn list(&self, filters: &SearchFilters) -> Vec<AgentSummary> {
        self.docs
            .iter()
            .filter(|d| filters.matches(d))
            .map(AgentSummary::from)
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for doc in &self.docs {
            *counts.entry(doc.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn filter_options(&self) -> FilterOptions {
        let mut tiers = BTreeSet::new();
        let mut models = BTreeSet::new();
        let mut categories = BTreeSet::new();
        let mut roles = BTreeSet::new();
        for doc in &self.docs {
            tiers.insert(doc.resolved.tier.to_string());
            models.insert(doc.resolved.model.to_string());
            categories.insert(doc.category.clone());
            if let Some(role) = doc.resolved.role {
                roles.insert(role.to_string());
            }
        }
        FilterOptions {
            tiers: tiers.into_iter().collect(),
            models: models.into_iter().collect(),
            categories: categories.into_iter().collect(),
            roles: roles.into_iter().collect(),
        }
    }
}

fn field_text(doc: &AgentRecord, field: &str) -> String {
    match field {
        "name" => doc.resolved.name.clone(),
        "description" => doc.resolved.description.clone(),
        "identity" => doc.content.identity.clone().unwrap_or_default(),
        "vocabulary" => doc
            .content
            .vocabulary
            .as_ref()
            .map(|v| v.join(" "))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
