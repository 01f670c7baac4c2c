use esg_core::{EsgError, EsgResult, ReferenceTables};
use std::sync::Arc;

const MAX_IDENTIFIER_LEN: usize = 20;

/// Where a candidate identifier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// The ticker as requested
    Original,
    /// Curated replacement for a delisted/defunct ticker
    Substitute,
    /// Exchange-suffix variation (swapped or stripped)
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identifier: String,
    pub kind: CandidateKind,
}

impl Candidate {
    fn new(identifier: impl Into<String>, kind: CandidateKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
        }
    }
}

/// Maps a raw ticker to the ordered list of identifiers worth trying.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    tables: Arc<ReferenceTables>,
}

impl IdentifierNormalizer {
    pub fn new(tables: Arc<ReferenceTables>) -> Self {
        Self { tables }
    }

    /// Trimmed, upper-cased canonical form of a ticker.
    pub fn normalize(&self, raw: &str) -> EsgResult<String> {
        let ticker = raw.trim().to_uppercase();

        if ticker.is_empty() {
            return Err(EsgError::invalid_identifier(raw, "ticker is empty"));
        }
        if ticker.len() > MAX_IDENTIFIER_LEN {
            return Err(EsgError::invalid_identifier(
                raw,
                format!("longer than {} characters", MAX_IDENTIFIER_LEN),
            ));
        }
        if let Some(bad) = ticker
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '&' | '^' | '=')))
        {
            return Err(EsgError::invalid_identifier(
                raw,
                format!("unexpected character '{}'", bad),
            ));
        }
        if ticker.starts_with('.') || ticker.ends_with('.') {
            return Err(EsgError::invalid_identifier(raw, "misplaced '.'"));
        }

        Ok(ticker)
    }

    /// Candidates in preference order: original, substitute, suffix variants.
    ///
    /// The first candidate is always the normalized original ticker.
    pub fn candidates(&self, raw: &str) -> EsgResult<Vec<Candidate>> {
        let ticker = self.normalize(raw)?;
        let mut candidates = vec![Candidate::new(ticker.clone(), CandidateKind::Original)];

        if let Some(substitute) = self.tables.substitute_for(&ticker) {
            push_unique(&mut candidates, Candidate::new(substitute, CandidateKind::Substitute));
        }

        for alternate in self.alternate_forms(&ticker) {
            push_unique(&mut candidates, Candidate::new(alternate, CandidateKind::Alternate));
        }

        Ok(candidates)
    }

    fn alternate_forms(&self, ticker: &str) -> Vec<String> {
        let suffixes = &self.tables.exchange_suffixes;

        match suffixes.iter().find(|s| ticker.ends_with(s.as_str())) {
            Some(current) => {
                let base = &ticker[..ticker.len() - current.len()];
                let mut forms: Vec<String> = suffixes
                    .iter()
                    .filter(|s| *s != current)
                    .map(|s| format!("{}{}", base, s))
                    .collect();
                forms.push(base.to_string());
                forms
            }
            None => suffixes.iter().map(|s| format!("{}{}", ticker, s)).collect(),
        }
    }
}

fn push_unique(candidates: &mut Vec<Candidate>, candidate: Candidate) {
    if !candidates.iter().any(|c| c.identifier == candidate.identifier) {
        candidates.push(candidate);
    }
}
