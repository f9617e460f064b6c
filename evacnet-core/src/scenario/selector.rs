//! Edge selectors used by closures and capacity changes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, model::StreetEdge};

/// Matches street edges by their tags.
///
/// Textual form: `bridge` (or `is_bridge`), `highway=<class>`, `name=<street>`,
/// `category=<tag>`; any other string is a category that also matches the
/// highway class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EdgeSelector {
    Bridge,
    Highway(String),
    Name(String),
    Category(String),
}

impl EdgeSelector {
    pub fn matches(&self, edge: &StreetEdge) -> bool {
        match self {
            EdgeSelector::Bridge => edge.bridge,
            EdgeSelector::Highway(class) => edge
                .highway
                .as_deref()
                .is_some_and(|highway| highway.eq_ignore_ascii_case(class)),
            EdgeSelector::Name(name) => edge
                .name
                .as_deref()
                .is_some_and(|street| street.eq_ignore_ascii_case(name)),
            EdgeSelector::Category(category) => {
                edge.has_category(category)
                    || edge
                        .highway
                        .as_deref()
                        .is_some_and(|highway| highway.eq_ignore_ascii_case(category))
            }
        }
    }
}

impl FromStr for EdgeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidPerturbation("Empty edge selector".into()));
        }
        if s.eq_ignore_ascii_case("bridge") || s.eq_ignore_ascii_case("is_bridge") {
            return Ok(EdgeSelector::Bridge);
        }

        let selector = match s.split_once('=') {
            Some((key, value)) => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(Error::InvalidPerturbation(format!(
                        "Edge selector '{s}' has no value"
                    )));
                }
                match key.trim().to_ascii_lowercase().as_str() {
                    "highway" => EdgeSelector::Highway(value.to_string()),
                    "name" => EdgeSelector::Name(value.to_string()),
                    "category" => EdgeSelector::Category(value.to_string()),
                    other => {
                        return Err(Error::InvalidPerturbation(format!(
                            "Unknown edge selector key '{other}'"
                        )));
                    }
                }
            }
            None => EdgeSelector::Category(s.to_string()),
        };
        Ok(selector)
    }
}

impl TryFrom<String> for EdgeSelector {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for EdgeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeSelector::Bridge => write!(f, "bridge"),
            EdgeSelector::Highway(class) => write!(f, "highway={class}"),
            EdgeSelector::Name(name) => write!(f, "name={name}"),
            EdgeSelector::Category(category) => write!(f, "category={category}"),
        }
    }
}

impl From<EdgeSelector> for String {
    fn from(selector: EdgeSelector) -> Self {
        selector.to_string()
    }
}
