//! Static reference data: delisted-substitute map, sector name patterns,
//! per-sector plausibility bands and default values.
//!
//! Loaded once at startup and shared through `Arc`; never mutated afterwards.

use crate::error::{EsgError, EsgResult};
use crate::types::{EsgScores, Sector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Plausible [min, max] range for a score plus the sector average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

impl ScoreBand {
    pub const fn new(min: f64, max: f64, average: f64) -> Self {
        Self { min, max, average }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Nearest bound when `value` lies outside the band.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Linear position inside the band, 0 at/below min and 100 at/above max.
    pub fn percentile(&self, value: f64) -> u8 {
        if value <= self.min {
            0
        } else if value >= self.max {
            100
        } else {
            (((value - self.min) / (self.max - self.min)) * 100.0) as u8
        }
    }

    fn check(&self, name: &str) -> EsgResult<()> {
        let finite = self.min.is_finite() && self.max.is_finite() && self.average.is_finite();
        if !finite || self.min > self.average || self.average > self.max {
            return Err(EsgError::SystemicConfiguration(format!(
                "{} band must satisfy min <= average <= max (got {} / {} / {})",
                name, self.min, self.average, self.max
            )));
        }
        Ok(())
    }
}

/// Per-sector bounds and last-resort defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorProfile {
    pub environmental: ScoreBand,
    pub social: ScoreBand,
    pub governance: ScoreBand,
    /// ROIC band; `average` doubles as the default ROIC.
    pub roic: ScoreBand,
    pub default_market_cap: f64,
}

impl SectorProfile {
    pub fn default_scores(&self) -> EsgScores {
        EsgScores::new(
            self.environmental.average,
            self.social.average,
            self.governance.average,
        )
    }

    pub fn default_roic(&self) -> f64 {
        self.roic.average
    }

    /// Average composite ESG score for the sector
    pub fn composite_average(&self) -> f64 {
        self.default_scores().composite()
    }

    pub fn max_scores(&self) -> EsgScores {
        EsgScores::new(self.environmental.max, self.social.max, self.governance.max)
    }
}

/// Company-name fragments that identify a sector when embedded in a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPattern {
    pub sector: Sector,
    pub fragments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    /// Delisted/defunct ticker -> curated substitute
    pub substitutes: BTreeMap<String, String>,
    /// Checked in order; first match wins
    pub sector_patterns: Vec<SectorPattern>,
    pub profiles: BTreeMap<Sector, SectorProfile>,
    /// Regional exchange suffixes, e.g. ".NS", ".BO"
    pub exchange_suffixes: Vec<String>,
}

impl ReferenceTables {
    /// Load tables from a JSON file and validate them.
    pub fn from_json_file(path: impl AsRef<Path>) -> EsgResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EsgError::SystemicConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> EsgResult<Self> {
        let tables: ReferenceTables = serde_json::from_str(raw)
            .map_err(|e| EsgError::SystemicConfiguration(format!("corrupt reference tables: {}", e)))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn profile(&self, sector: Sector) -> Option<&SectorProfile> {
        self.profiles.get(&sector)
    }

    pub fn substitute_for(&self, ticker: &str) -> Option<&str> {
        self.substitutes.get(ticker).map(String::as_str)
    }

    /// Check that every sector has a coherent profile and the maps are sane.
    pub fn validate(&self) -> EsgResult<()> {
        for sector in Sector::ALL {
            let profile = self.profiles.get(&sector).ok_or_else(|| {
                EsgError::SystemicConfiguration(format!("missing default profile for sector {}", sector))
            })?;
            profile.environmental.check(&format!("{} environmental", sector))?;
            profile.social.check(&format!("{} social", sector))?;
            profile.governance.check(&format!("{} governance", sector))?;
            profile.roic.check(&format!("{} roic", sector))?;
            if !(profile.default_market_cap.is_finite() && profile.default_market_cap > 0.0) {
                return Err(EsgError::SystemicConfiguration(format!(
                    "{} default market cap must be positive",
                    sector
                )));
            }
        }

        for (from, to) in &self.substitutes {
            if from.trim().is_empty() || to.trim().is_empty() || from == to {
                return Err(EsgError::SystemicConfiguration(format!(
                    "invalid substitute mapping '{}' -> '{}'",
                    from, to
                )));
            }
        }

        for suffix in &self.exchange_suffixes {
            if !suffix.starts_with('.') || suffix.len() < 2 {
                return Err(EsgError::SystemicConfiguration(format!(
                    "exchange suffix '{}' must look like '.XX'",
                    suffix
                )));
            }
        }

        Ok(())
    }
}

fn pattern(sector: Sector, fragments: &[&str]) -> SectorPattern {
    SectorPattern {
        sector,
        fragments: fragments.iter().map(|f| f.to_string()).collect(),
    }
}

fn profile(
    environmental: (f64, f64, f64),
    social: (f64, f64, f64),
    governance: (f64, f64, f64),
    roic: (f64, f64, f64),
    default_market_cap: f64,
) -> SectorProfile {
    SectorProfile {
        environmental: ScoreBand::new(environmental.0, environmental.1, environmental.2),
        social: ScoreBand::new(social.0, social.1, social.2),
        governance: ScoreBand::new(governance.0, governance.1, governance.2),
        roic: ScoreBand::new(roic.0, roic.1, roic.2),
        default_market_cap,
    }
}

impl Default for ReferenceTables {
    /// Built-in tables for the Indian large-cap universe (NSE/BSE).
    fn default() -> Self {
        let substitutes = [
            ("DHFL.NS", "HDFCBANK.NS"),
            ("YES.NS", "YESBANK.NS"),
            ("IL&FS.NS", "HDFCBANK.NS"),
            ("JETAIRWAYS.NS", "INDIGO.NS"),
        ]
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        let sector_patterns = vec![
            pattern(
                Sector::Banking,
                &["HDFC", "ICICI", "SBI", "AXIS", "KOTAK", "INDUSIND", "FEDERAL", "YES"],
            ),
            pattern(Sector::It, &["TCS", "INFY", "WIPRO", "HCL", "TECH", "INFO"]),
            pattern(
                Sector::Energy,
                &["RELIANCE", "ONGC", "IOC", "BPCL", "GAIL", "COAL", "NTPC"],
            ),
            pattern(Sector::Fmcg, &["HINDUNIL", "ITC", "NESTLE", "BRITANNIA", "GODREJ"]),
            pattern(Sector::Auto, &["MARUTI", "TATA", "MAHINDRA", "BAJAJ", "HERO", "AUTO"]),
            pattern(Sector::Pharma, &["SUNPHARMA", "DRREDDY", "CIPLA", "LUPIN", "PHARMA"]),
            pattern(Sector::Telecom, &["BHARTI", "AIRTEL", "JIO", "IDEA", "TELECOM"]),
        ];

        let mut profiles = BTreeMap::new();
        profiles.insert(
            Sector::Banking,
            profile((15.0, 85.0, 45.0), (20.0, 90.0, 55.0), (25.0, 95.0, 65.0), (-0.05, 0.30, 0.12), 50e9),
        );
        profiles.insert(
            Sector::It,
            profile((25.0, 95.0, 70.0), (30.0, 95.0, 75.0), (35.0, 98.0, 80.0), (0.0, 0.50, 0.25), 75e9),
        );
        profiles.insert(
            Sector::Energy,
            profile((5.0, 60.0, 25.0), (10.0, 70.0, 35.0), (15.0, 80.0, 45.0), (-0.10, 0.25, 0.08), 100e9),
        );
        profiles.insert(
            Sector::Fmcg,
            profile((18.0, 88.0, 60.0), (22.0, 92.0, 65.0), (25.0, 90.0, 70.0), (0.0, 0.45, 0.18), 30e9),
        );
        profiles.insert(
            Sector::Auto,
            profile((10.0, 80.0, 40.0), (15.0, 85.0, 50.0), (20.0, 90.0, 60.0), (-0.10, 0.30, 0.10), 20e9),
        );
        profiles.insert(
            Sector::Pharma,
            profile((20.0, 85.0, 55.0), (25.0, 95.0, 70.0), (30.0, 95.0, 75.0), (-0.05, 0.35, 0.15), 25e9),
        );
        profiles.insert(
            Sector::Telecom,
            profile((12.0, 80.0, 40.0), (18.0, 85.0, 50.0), (22.0, 90.0, 55.0), (-0.10, 0.20, 0.06), 40e9),
        );
        profiles.insert(
            Sector::Unknown,
            profile((8.0, 95.0, 40.0), (8.0, 95.0, 45.0), (8.0, 95.0, 50.0), (-0.20, 0.50, 0.10), 10e9),
        );

        Self {
            substitutes,
            sector_patterns,
            profiles,
            exchange_suffixes: vec![".NS".to_string(), ".BO".to_string()],
        }
    }
}
