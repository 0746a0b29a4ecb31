//! Analysis settings.

use crate::error::{Error, Result};

/// Settings that control the scope and cost of an analysis.
///
/// The setters validate their inputs and chain, so a `Settings` value is
/// well-formed by construction:
///
/// ```
/// use fta_rs::settings::Settings;
///
/// let mut settings = Settings::default();
/// settings.set_probability_analysis(true).set_cut_set_limit(5);
/// assert_eq!(settings.cut_set_limit(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    probability_analysis: bool,
    mission_time: f64,
    cut_set_limit: usize,
    num_sums: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probability_analysis: false,
            mission_time: 8760.0,
            cut_set_limit: 0,
            num_sums: 7,
        }
    }
}

impl Settings {
    pub fn probability_analysis(&self) -> bool {
        self.probability_analysis
    }
    pub fn mission_time(&self) -> f64 {
        self.mission_time
    }
    /// Maximum cardinality of reported cut sets. `0` means unlimited.
    pub fn cut_set_limit(&self) -> usize {
        self.cut_set_limit
    }
    /// The number of sums in probability series expansions.
    pub fn num_sums(&self) -> usize {
        self.num_sums
    }

    pub fn set_probability_analysis(&mut self, flag: bool) -> &mut Self {
        self.probability_analysis = flag;
        self
    }

    pub fn set_mission_time(&mut self, time: f64) -> Result<&mut Self> {
        if !(time >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "mission time cannot be negative: {}",
                time
            )));
        }
        self.mission_time = time;
        Ok(self)
    }

    pub fn set_cut_set_limit(&mut self, limit: usize) -> &mut Self {
        self.cut_set_limit = limit;
        self
    }

    pub fn set_num_sums(&mut self, n: usize) -> Result<&mut Self> {
        if n == 0 {
            return Err(Error::InvalidArgument(
                "the number of sums cannot be zero".to_string(),
            ));
        }
        self.num_sums = n;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.probability_analysis());
        assert_eq!(settings.cut_set_limit(), 0);
        assert_eq!(settings.num_sums(), 7);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Settings::default().set_mission_time(-1.0).is_err());
        assert!(Settings::default().set_num_sums(0).is_err());
        assert!(Settings::default().set_mission_time(24.0).is_ok());
    }
}
