//! Content dimensions
//!
//! A dimension is an axis of content variation (language, country, ...).
//! Every node variant lives under one dimension combination: a map from
//! dimension name to an ordered, non-empty list of values. The list is a
//! fallback chain; its first value is the value the variant is stored under.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical dimension combination, sorted by dimension name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionValues(BTreeMap<String, Vec<String>>);

impl DimensionValues {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Values of a dimension, in fallback order
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of a dimension
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.0.insert(name.into(), values);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Copy without the given dimension
    pub fn without(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.0.remove(name);
        copy
    }

    /// Copy with the given dimension replaced
    pub fn with(&self, name: impl Into<String>, values: Vec<String>) -> Self {
        let mut copy = self.clone();
        copy.insert(name, values);
        copy
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Projection onto the first value of every dimension
    pub fn first_values(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .filter_map(|(name, values)| values.first().map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// Build a single-valued combination from a `name -> value` map
    pub fn from_single(values: &BTreeMap<String, String>) -> Self {
        values
            .iter()
            .map(|(name, value)| (name.clone(), vec![value.clone()]))
            .collect()
    }

    /// Stable hash identifying this combination (hex encoded md5)
    pub fn hash(&self) -> String {
        let mut canonical = String::new();
        for (name, values) in &self.0 {
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(&values.join(","));
            canonical.push(';');
        }
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }
}

impl FromIterator<(String, Vec<String>)> for DimensionValues {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Vec<String>>> for DimensionValues {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for DimensionValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, values)| format!("{}=[{}]", name, values.join(",")))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// A named preset of one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionPreset {
    /// Fallback chain; the first value is the preset's target value
    pub values: Vec<String>,

    /// `other dimension -> (preset key | "*") -> allowed`
    #[serde(default)]
    pub constraints: BTreeMap<String, BTreeMap<String, bool>>,
}

/// Configuration of one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Default preset key
    pub default: String,

    /// Presets in configuration order
    #[serde(default)]
    pub presets: IndexMap<String, DimensionPreset>,
}

impl DimensionConfig {
    /// Single-preset configuration whose only value is `value`
    pub fn single(value: &str) -> Self {
        let mut presets = IndexMap::new();
        presets.insert(
            value.to_string(),
            DimensionPreset {
                values: vec![value.to_string()],
                constraints: BTreeMap::new(),
            },
        );
        Self {
            default: value.to_string(),
            presets,
        }
    }
}

/// Enumerates the dimension combinations content may exist under
#[derive(Debug, Clone)]
pub struct DimensionCombinator {
    language_dimension: String,
    dimensions: BTreeMap<String, DimensionConfig>,
}

type Choice<'a> = (&'a str, &'a str, &'a DimensionPreset);

impl DimensionCombinator {
    pub fn new(
        language_dimension: impl Into<String>,
        dimensions: BTreeMap<String, DimensionConfig>,
    ) -> Self {
        Self {
            language_dimension: language_dimension.into(),
            dimensions,
        }
    }

    pub fn language_dimension(&self) -> &str {
        &self.language_dimension
    }

    /// Every combination of presets not excluded by a preset constraint.
    ///
    /// Dimensions are combined in name order and presets in configuration
    /// order, so the result is deterministic.
    pub fn all_allowed_combinations(&self) -> Vec<DimensionValues> {
        let mut partial: Vec<Vec<Choice<'_>>> = vec![Vec::new()];

        for (name, config) in &self.dimensions {
            let mut next = Vec::with_capacity(partial.len() * config.presets.len());
            for combination in &partial {
                for (key, preset) in &config.presets {
                    let mut extended = combination.clone();
                    extended.push((name.as_str(), key.as_str(), preset));
                    next.push(extended);
                }
            }
            partial = next;
        }

        partial
            .into_iter()
            .filter(|combination| Self::satisfies_constraints(combination))
            .map(|combination| {
                combination
                    .into_iter()
                    .map(|(name, _, preset)| (name.to_string(), preset.values.clone()))
                    .collect()
            })
            .collect()
    }

    fn satisfies_constraints(combination: &[Choice<'_>]) -> bool {
        combination.iter().all(|(_, _, preset)| {
            preset.constraints.iter().all(|(other_dimension, rules)| {
                match combination.iter().find(|(name, _, _)| name == other_dimension) {
                    Some((_, other_key, _)) => rules
                        .get(*other_key)
                        .or_else(|| rules.get("*"))
                        .copied()
                        .unwrap_or(true),
                    None => true,
                }
            })
        })
    }

    /// Allowed combinations whose language dimension starts with `language`
    pub fn allowed_combinations_for_language(&self, language: &str) -> Vec<DimensionValues> {
        self.all_allowed_combinations()
            .into_iter()
            .filter(|combination| combination.first(&self.language_dimension) == Some(language))
            .collect()
    }

    /// Fallback chain of the language preset targeting `language`
    pub fn fallback_chain_for_language(&self, language: &str) -> Option<Vec<String>> {
        self.dimensions
            .get(&self.language_dimension)?
            .presets
            .values()
            .find(|preset| preset.values.first().map(String::as_str) == Some(language))
            .map(|preset| preset.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(values: &[&str]) -> DimensionPreset {
        DimensionPreset {
            values: values.iter().map(|v| v.to_string()).collect(),
            constraints: BTreeMap::new(),
        }
    }

    fn combinator() -> DimensionCombinator {
        let mut language = DimensionConfig::single("en");
        language.presets.insert("de".into(), preset(&["de"]));
        language.presets.insert("de_CH".into(), preset(&["de_CH", "de"]));

        let mut country = DimensionConfig::single("ch");
        country.presets.insert("at".into(), preset(&["at"]));

        let mut dimensions = BTreeMap::new();
        dimensions.insert("language".to_string(), language);
        dimensions.insert("country".to_string(), country);
        DimensionCombinator::new("language", dimensions)
    }

    #[test]
    fn test_cartesian_product_of_presets() {
        let all = combinator().all_allowed_combinations();
        assert_eq!(all.len(), 6);
        // country sorts before language
        assert_eq!(all[0].first("country"), Some("ch"));
        assert_eq!(all[0].first("language"), Some("en"));
    }

    #[test]
    fn test_combinations_for_language() {
        let combos = combinator().allowed_combinations_for_language("de_CH");
        assert_eq!(combos.len(), 2);
        for combo in combos {
            assert_eq!(combo.get("language"), Some(&["de_CH".to_string(), "de".to_string()][..]));
        }
        assert!(combinator().allowed_combinations_for_language("fr").is_empty());
    }

    #[test]
    fn test_constraints_exclude_combinations() {
        let mut c = combinator();
        let language = c.dimensions.get_mut("language").unwrap();
        let de_ch = language.presets.get_mut("de_CH").unwrap();
        let mut rules = BTreeMap::new();
        rules.insert("*".to_string(), false);
        rules.insert("ch".to_string(), true);
        de_ch.constraints.insert("country".to_string(), rules);

        let combos = c.allowed_combinations_for_language("de_CH");
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].first("country"), Some("ch"));
    }

    #[test]
    fn test_fallback_chain() {
        let c = combinator();
        assert_eq!(
            c.fallback_chain_for_language("de_CH"),
            Some(vec!["de_CH".to_string(), "de".to_string()])
        );
        assert_eq!(c.fallback_chain_for_language("en"), Some(vec!["en".to_string()]));
        assert_eq!(c.fallback_chain_for_language("de"), Some(vec!["de".to_string()]));
        assert!(c.fallback_chain_for_language("xx").is_none());
    }

    #[test]
    fn test_dimension_values_are_canonical() {
        let mut a = DimensionValues::new();
        a.insert("language", vec!["en".into()]);
        a.insert("country", vec!["ch".into()]);

        let mut b = DimensionValues::new();
        b.insert("country", vec!["ch".into()]);
        b.insert("language", vec!["en".into()]);

        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), a.with("language", vec!["de".into()]).hash());
        assert_eq!(a.without("language").len(), 1);
    }
}
