use crate::tables::{ReferenceTables, SectorProfile};
use crate::types::Sector;
use std::sync::Arc;

/// Keywords in a provider's own sector label, checked in order
const PROVIDER_SECTOR_KEYWORDS: &[(Sector, &[&str])] = &[
    (Sector::Banking, &["bank", "financial", "finance"]),
    (Sector::It, &["tech", "software", "computer", "information"]),
    (Sector::Energy, &["oil", "gas", "energy", "petroleum"]),
    (Sector::Auto, &["auto", "motor", "vehicle"]),
    (Sector::Pharma, &["pharma", "drug", "medical", "health"]),
    (Sector::Telecom, &["telecom", "communication"]),
    (Sector::Fmcg, &["fmcg", "consumer", "food", "beverage"]),
];

/// Infers a sector from company-name fragments embedded in a ticker.
///
/// Total function: anything unmatched is `Sector::Unknown`.
#[derive(Debug, Clone)]
pub struct SectorClassifier {
    tables: Arc<ReferenceTables>,
}

impl SectorClassifier {
    pub fn new(tables: Arc<ReferenceTables>) -> Self {
        Self { tables }
    }

    pub fn classify(&self, ticker: &str) -> Sector {
        let base = self.strip_suffix(&ticker.trim().to_uppercase());

        self.tables
            .sector_patterns
            .iter()
            .find(|p| p.fragments.iter().any(|f| base.contains(f.as_str())))
            .map(|p| p.sector)
            .unwrap_or(Sector::Unknown)
    }

    /// Map an upstream sector label such as "Financial Services" onto a benchmark sector.
    pub fn classify_provider_sector(&self, label: &str) -> Sector {
        let label = label.trim().to_lowercase();
        if label == "it" {
            return Sector::It;
        }
        PROVIDER_SECTOR_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| label.contains(k)))
            .map(|(sector, _)| *sector)
            .unwrap_or(Sector::Unknown)
    }

    /// Default-value table entry for a sector
    pub fn profile(&self, sector: Sector) -> Option<&SectorProfile> {
        self.tables.profile(sector)
    }

    pub fn tables(&self) -> &Arc<ReferenceTables> {
        &self.tables
    }

    fn strip_suffix(&self, ticker: &str) -> String {
        self.tables
            .exchange_suffixes
            .iter()
            .find_map(|s| ticker.strip_suffix(s.as_str()))
            .unwrap_or(ticker)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SectorClassifier {
        SectorClassifier::new(Arc::new(ReferenceTables::default()))
    }

    #[test]
    fn test_known_patterns() {
        let c = classifier();
        assert_eq!(c.classify("HDFCBANK.NS"), Sector::Banking);
        assert_eq!(c.classify("TCS.NS"), Sector::It);
        assert_eq!(c.classify("RELIANCE.NS"), Sector::Energy);
        assert_eq!(c.classify("ITC.BO"), Sector::Fmcg);
        assert_eq!(c.classify("MARUTI"), Sector::Auto);
        assert_eq!(c.classify("sunpharma.ns"), Sector::Pharma);
        assert_eq!(c.classify("BHARTIARTL.NS"), Sector::Telecom);
    }

    #[test]
    fn test_unmatched_is_unknown() {
        let c = classifier();
        assert_eq!(c.classify("INVALID123.NS"), Sector::Unknown);
        assert_eq!(c.classify("DHFL.NS"), Sector::Unknown);
        assert_eq!(c.classify(""), Sector::Unknown);
    }

    #[test]
    fn test_provider_sector_labels() {
        let c = classifier();
        assert_eq!(c.classify_provider_sector("Technology"), Sector::It);
        assert_eq!(c.classify_provider_sector("Financial Services"), Sector::Banking);
        assert_eq!(c.classify_provider_sector("Consumer Defensive"), Sector::Fmcg);
        assert_eq!(c.classify_provider_sector("Healthcare"), Sector::Pharma);
        assert_eq!(c.classify_provider_sector("Communication Services"), Sector::Telecom);
        assert_eq!(c.classify_provider_sector("IT"), Sector::It);
        // "utilities" must not match on its embedded "it"
        assert_eq!(c.classify_provider_sector("Utilities"), Sector::Unknown);
        assert_eq!(c.classify_provider_sector(""), Sector::Unknown);
    }

    #[test]
    fn test_pattern_order_decides_overlaps() {
        // TCS is IT even though TATA group names are Auto
        let c = classifier();
        assert_eq!(c.classify("TCS.NS"), Sector::It);
        assert_eq!(c.classify("TATAMOTORS.NS"), Sector::Auto);
    }

    #[test]
    fn test_every_sector_has_profile() {
        let c = classifier();
        for sector in Sector::ALL {
            assert!(c.profile(sector).is_some(), "missing profile for {}", sector);
        }
    }
}
