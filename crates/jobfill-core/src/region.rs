use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Supported Australian metro regions. One engine instance runs per region,
/// so the region name doubles as the partition key in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Perth,
    Sydney,
    Melbourne,
    Brisbane,
    GoldCoast,
    Adelaide,
    Canberra,
    Hobart,
    Darwin,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::Perth,
        Region::Sydney,
        Region::Melbourne,
        Region::Brisbane,
        Region::GoldCoast,
        Region::Adelaide,
        Region::Canberra,
        Region::Hobart,
        Region::Darwin,
    ];

    /// Canonical name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Perth => "Perth",
            Region::Sydney => "Sydney",
            Region::Melbourne => "Melbourne",
            Region::Brisbane => "Brisbane",
            Region::GoldCoast => "Gold Coast",
            Region::Adelaide => "Adelaide",
            Region::Canberra => "Canberra",
            Region::Hobart => "Hobart",
            Region::Darwin => "Darwin",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Perth
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "perth" => Ok(Region::Perth),
            "sydney" => Ok(Region::Sydney),
            "melbourne" => Ok(Region::Melbourne),
            "brisbane" => Ok(Region::Brisbane),
            "goldcoast" => Ok(Region::GoldCoast),
            "adelaide" => Ok(Region::Adelaide),
            "canberra" => Ok(Region::Canberra),
            "hobart" => Ok(Region::Hobart),
            "darwin" => Ok(Region::Darwin),
            _ => Err(AppError::ConfigError(format!(
                "Unknown region '{s}'. Valid regions: {}",
                Region::ALL.map(|r| r.as_str()).join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), region);
        }
    }

    #[test]
    fn parsing_is_case_and_separator_insensitive() {
        assert_eq!("perth".parse::<Region>().unwrap(), Region::Perth);
        assert_eq!("gold-coast".parse::<Region>().unwrap(), Region::GoldCoast);
        assert_eq!("GOLD COAST".parse::<Region>().unwrap(), Region::GoldCoast);
    }

    #[test]
    fn unknown_region_is_a_config_error() {
        let err = "atlantis".parse::<Region>().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn default_is_perth() {
        assert_eq!(Region::default(), Region::Perth);
    }
}
