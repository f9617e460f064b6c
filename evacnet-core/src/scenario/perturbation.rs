//! Typed scenario perturbations, validated once at construction

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use super::selector::EdgeSelector;
use crate::{Error, model::OsmNodeId};

/// Scaling factor in (0, 10]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Multiplier(f64);

impl Multiplier {
    pub const MAX: f64 = 10.0;

    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] outside (0, 10]
    pub fn new(value: f64) -> Result<Self, Error> {
        if value.is_finite() && value > 0.0 && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(Error::InvalidPerturbation(format!(
                "Multiplier must be in (0, {}], got {value}",
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Multiplier::new(value)
    }
}

impl From<Multiplier> for f64 {
    fn from(multiplier: Multiplier) -> Self {
        multiplier.0
    }
}

/// What a closure takes out of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClosureTarget {
    /// Nodes by OSM id, with their incident edges
    Nodes { ids: Vec<OsmNodeId> },
    /// Edges matching a selector
    Edges { selector: EdgeSelector },
    /// Nodes within `radius_m` meters of a point
    Radius { lon: f64, lat: f64, radius_m: f64 },
    /// Nodes inside or on a polygon given as a `(lon, lat)` ring
    Polygon { ring: Vec<(f64, f64)> },
}

impl ClosureTarget {
    fn validate(&self) -> Result<(), Error> {
        match self {
            ClosureTarget::Nodes { .. } | ClosureTarget::Edges { .. } => Ok(()),
            ClosureTarget::Radius { lon, lat, radius_m } => {
                if !lon.is_finite() || !lat.is_finite() {
                    return Err(Error::InvalidPerturbation(
                        "Closure center must have finite coordinates".into(),
                    ));
                }
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(Error::InvalidPerturbation(format!(
                        "Closure radius must be positive, got {radius_m}"
                    )));
                }
                Ok(())
            }
            ClosureTarget::Polygon { ring } => {
                if ring.len() < 3 {
                    return Err(Error::InvalidPerturbation(format!(
                        "Closure polygon needs at least 3 points, got {}",
                        ring.len()
                    )));
                }
                if ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
                    return Err(Error::InvalidPerturbation(
                        "Closure polygon has non-finite coordinates".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Polygon for [`ClosureTarget::Polygon`]
    pub(crate) fn polygon(&self) -> Option<Polygon<f64>> {
        match self {
            ClosureTarget::Polygon { ring } => {
                let exterior: LineString<f64> =
                    ring.iter().map(|&(x, y)| Coord { x, y }).collect();
                Some(Polygon::new(exterior, vec![]))
            }
            _ => None,
        }
    }
}

/// Closure active between two minutes of the evacuation.
///
/// Evaluation works on a static graph, so a closure counts as active for the
/// whole run regardless of its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub target: ClosureTarget,
    #[serde(default)]
    pub start_minute: u32,
    #[serde(default = "default_end_minute")]
    pub end_minute: u32,
}

fn default_end_minute() -> u32 {
    u32::MAX
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Perturbation {
    Closure(Closure),
    CapacityChange {
        selector: EdgeSelector,
        multiplier: Multiplier,
    },
    ProtectedCorridor {
        name: String,
        multiplier: Multiplier,
    },
}

impl Perturbation {
    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] for an empty window
    pub fn closure(target: ClosureTarget, start_minute: u32, end_minute: u32) -> Result<Self, Error> {
        let perturbation = Perturbation::Closure(Closure {
            target,
            start_minute,
            end_minute,
        });
        perturbation.validate()?;
        Ok(perturbation)
    }

    /// Closure of nodes by OSM id for the whole evaluation
    pub fn close_nodes(ids: Vec<OsmNodeId>) -> Self {
        Perturbation::Closure(Closure {
            target: ClosureTarget::Nodes { ids },
            start_minute: 0,
            end_minute: default_end_minute(),
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] for a malformed selector or an
    /// out-of-range multiplier
    pub fn capacity_change(selector: &str, multiplier: f64) -> Result<Self, Error> {
        Ok(Perturbation::CapacityChange {
            selector: selector.parse()?,
            multiplier: Multiplier::new(multiplier)?,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] for an empty name or an
    /// out-of-range multiplier
    pub fn protected_corridor(name: impl Into<String>, multiplier: f64) -> Result<Self, Error> {
        let perturbation = Perturbation::ProtectedCorridor {
            name: name.into(),
            multiplier: Multiplier::new(multiplier)?,
        };
        perturbation.validate()?;
        Ok(perturbation)
    }

    /// Checks the invariants serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] describing the first violation
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Perturbation::Closure(closure) => {
                if closure.start_minute > closure.end_minute {
                    return Err(Error::InvalidPerturbation(format!(
                        "Closure starts at minute {} after it ends at minute {}",
                        closure.start_minute, closure.end_minute
                    )));
                }
                closure.target.validate()
            }
            Perturbation::CapacityChange { .. } => Ok(()),
            Perturbation::ProtectedCorridor { name, .. } => {
                if name.trim().is_empty() {
                    Err(Error::InvalidPerturbation(
                        "Protected corridor needs a name".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Validated set of perturbations of one scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Perturbation>", into = "Vec<Perturbation>")]
pub struct ScenarioPerturbation {
    items: Vec<Perturbation>,
}

impl ScenarioPerturbation {
    /// # Errors
    ///
    /// Returns [`Error::InvalidPerturbation`] if any item is invalid
    pub fn new(items: Vec<Perturbation>) -> Result<Self, Error> {
        for item in &items {
            item.validate()?;
        }
        Ok(Self { items })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Perturbation> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Perturbation] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn closures(&self) -> impl Iterator<Item = &Closure> {
        self.items.iter().filter_map(|item| match item {
            Perturbation::Closure(closure) => Some(closure),
            _ => None,
        })
    }

    pub fn capacity_changes(&self) -> impl Iterator<Item = (&EdgeSelector, Multiplier)> {
        self.items.iter().filter_map(|item| match item {
            Perturbation::CapacityChange {
                selector,
                multiplier,
            } => Some((selector, *multiplier)),
            _ => None,
        })
    }

    pub fn protected_corridors(&self) -> impl Iterator<Item = (&str, Multiplier)> {
        self.items.iter().filter_map(|item| match item {
            Perturbation::ProtectedCorridor { name, multiplier } => {
                Some((name.as_str(), *multiplier))
            }
            _ => None,
        })
    }
}

impl TryFrom<Vec<Perturbation>> for ScenarioPerturbation {
    type Error = Error;

    fn try_from(items: Vec<Perturbation>) -> Result<Self, Self::Error> {
        ScenarioPerturbation::new(items)
    }
}

impl From<ScenarioPerturbation> for Vec<Perturbation> {
    fn from(set: ScenarioPerturbation) -> Self {
        set.items
    }
}

/// Evacuation hypothesis to evaluate against a base graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub perturbations: ScenarioPerturbation,
}

impl Scenario {
    pub fn new(id: impl Into<String>, perturbations: ScenarioPerturbation) -> Self {
        Self {
            id: id.into(),
            description: None,
            perturbations,
        }
    }

    /// Scenario without perturbations
    pub fn baseline(id: impl Into<String>) -> Self {
        Self::new(id, ScenarioPerturbation::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_bounds() {
        assert!(Multiplier::new(0.0).is_err());
        assert!(Multiplier::new(-1.0).is_err());
        assert!(Multiplier::new(10.5).is_err());
        assert!(Multiplier::new(f64::NAN).is_err());
        assert!(Multiplier::new(f64::INFINITY).is_err());
        assert_eq!(Multiplier::new(10.0).unwrap().get(), 10.0);
        assert_eq!(Multiplier::new(0.01).unwrap().get(), 0.01);
    }

    #[test]
    fn invalid_closures_fail_fast() {
        assert!(Perturbation::closure(ClosureTarget::Nodes { ids: vec![1] }, 30, 10).is_err());
        assert!(
            Perturbation::closure(
                ClosureTarget::Radius {
                    lon: 0.0,
                    lat: 0.0,
                    radius_m: 0.0
                },
                0,
                10
            )
            .is_err()
        );
        assert!(
            Perturbation::closure(
                ClosureTarget::Polygon {
                    ring: vec![(0.0, 0.0), (1.0, 1.0)]
                },
                0,
                10
            )
            .is_err()
        );
        assert!(Perturbation::protected_corridor("  ", 2.0).is_err());
    }

    #[test]
    fn deserializes_and_validates_json() {
        let json = r#"[
            {"type": "closure", "target": {"type": "nodes", "ids": [1, 2]}, "start_minute": 0, "end_minute": 60},
            {"type": "capacity_change", "selector": "is_bridge", "multiplier": 0.5},
            {"type": "protected_corridor", "name": "Whitehall", "multiplier": 2.0}
        ]"#;
        let set: ScenarioPerturbation = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.closures().count(), 1);
        let (selector, multiplier) = set.capacity_changes().next().unwrap();
        assert_eq!(selector, &EdgeSelector::Bridge);
        assert_eq!(multiplier.get(), 0.5);
        assert_eq!(set.protected_corridors().next().unwrap().0, "Whitehall");
    }

    #[test]
    fn rejects_out_of_range_multiplier_in_json() {
        let json = r#"[{"type": "capacity_change", "selector": "main_road", "multiplier": 0}]"#;
        assert!(serde_json::from_str::<ScenarioPerturbation>(json).is_err());

        let json = r#"[{"type": "closure", "target": {"type": "nodes", "ids": []}, "start_minute": 9, "end_minute": 3}]"#;
        assert!(serde_json::from_str::<ScenarioPerturbation>(json).is_err());
    }

    #[test]
    fn scenario_without_perturbations_field() {
        let scenario: Scenario = serde_json::from_str(r#"{"id": "baseline"}"#).unwrap();
        assert!(scenario.perturbations.is_empty());
        assert_eq!(scenario, Scenario::baseline("baseline"));
    }
}
