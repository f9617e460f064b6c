//! Pedestrian flow capacity and evacuation traversal cost of street segments.
//!
//! Capacity is derived from the usable width of a segment, and the cost of
//! walking it grows with its length, its incline and how narrow it is.

use serde::{Deserialize, Serialize};

use crate::{Error, model::StreetEdge};

/// Calibration constants of the capacity model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityParams {
    /// Width lost to street furniture and obstacles, meters
    pub obstacle_margin: f64,
    /// Lower bound of the usable width, meters
    pub min_effective_width: f64,
    /// Pedestrian flow per meter of usable width, people per second
    pub flow_per_meter: f64,
    /// Walking speed on flat ground, m/s
    pub base_walking_speed: f64,
    /// Speed lost per unit of gradient, m/s
    pub gradient_speed_penalty: f64,
    /// Lower bound of the walking speed, m/s
    pub min_walking_speed: f64,
    pub congestion_scale: f64,
    /// Width assumed when the source data has none, meters
    pub default_width: f64,
    pub default_gradient: f64,
}

impl Default for CapacityParams {
    fn default() -> Self {
        Self {
            obstacle_margin: 0.6,
            min_effective_width: 1.0,
            flow_per_meter: 1.3,
            base_walking_speed: 1.2,
            gradient_speed_penalty: 0.1,
            min_walking_speed: 0.5,
            congestion_scale: 10.0,
            default_width: 4.0,
            default_gradient: 0.0,
        }
    }
}

impl CapacityParams {
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for non-positive or non-finite constants
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("min_effective_width", self.min_effective_width),
            ("flow_per_meter", self.flow_per_meter),
            ("base_walking_speed", self.base_walking_speed),
            ("min_walking_speed", self.min_walking_speed),
            ("default_width", self.default_width),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::ConfigError(format!(
                    "capacity.{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("obstacle_margin", self.obstacle_margin),
            ("gradient_speed_penalty", self.gradient_speed_penalty),
            ("congestion_scale", self.congestion_scale),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!(
                    "capacity.{name} must not be negative, got {value}"
                )));
            }
        }

        if self.min_walking_speed > self.base_walking_speed {
            return Err(Error::ConfigError(
                "capacity.min_walking_speed exceeds base_walking_speed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Converts street segments into capacities and traversal costs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CapacityModel {
    params: CapacityParams,
}

impl CapacityModel {
    pub fn new(params: CapacityParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CapacityParams {
        &self.params
    }

    /// Usable width in meters
    pub fn effective_width(&self, edge: &StreetEdge) -> f64 {
        let width = edge.width.unwrap_or(self.params.default_width);
        (width - self.params.obstacle_margin).max(self.params.min_effective_width)
    }

    /// People per second, including any scenario capacity factor
    pub fn capacity_per_second(&self, edge: &StreetEdge) -> f64 {
        self.effective_width(edge) * self.params.flow_per_meter * edge.capacity_factor
    }

    /// People per minute
    pub fn edge_capacity(&self, edge: &StreetEdge) -> f64 {
        self.capacity_per_second(edge) * 60.0
    }

    /// Walking speed in m/s. Downhill and uphill slow pedestrians alike.
    pub fn walking_speed(&self, edge: &StreetEdge) -> f64 {
        let gradient = edge.gradient.unwrap_or(self.params.default_gradient).abs();
        (self.params.base_walking_speed - gradient * self.params.gradient_speed_penalty)
            .max(self.params.min_walking_speed)
    }

    /// Penalty factor that grows as capacity shrinks
    pub fn congestion_multiplier(&self, edge: &StreetEdge) -> f64 {
        1.0 + self.params.congestion_scale / self.capacity_per_second(edge).max(1.0)
    }

    /// Time-like edge weight in seconds used for evacuation routing
    pub fn evacuation_cost(&self, edge: &StreetEdge) -> f64 {
        (edge.length / self.walking_speed(edge)) * self.congestion_multiplier(edge)
    }
}

/// Capacity in people per minute with the default model
pub fn edge_capacity(edge: &StreetEdge) -> f64 {
    CapacityModel::default().edge_capacity(edge)
}

/// Evacuation cost in seconds with the default model
pub fn evacuation_cost(edge: &StreetEdge) -> f64 {
    CapacityModel::default().evacuation_cost(edge)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn four_meter_street() {
        let edge = StreetEdge::new(100.0).with_width(4.0).with_gradient(0.0);
        let model = CapacityModel::default();
        assert!((model.effective_width(&edge) - 3.4).abs() < EPS);
        assert!((model.capacity_per_second(&edge) - 4.42).abs() < EPS);
        assert!((model.edge_capacity(&edge) - 265.2).abs() < 1e-6);
        assert!((model.walking_speed(&edge) - 1.2).abs() < EPS);

        let congestion = 1.0 + 10.0 / 4.42;
        let expected = 100.0 / 1.2 * congestion;
        assert!((model.evacuation_cost(&edge) - expected).abs() < 1e-6);
    }

    #[test]
    fn missing_attributes_use_defaults() {
        let bare = StreetEdge::new(50.0);
        let explicit = StreetEdge::new(50.0).with_width(4.0).with_gradient(0.0);
        assert!((edge_capacity(&bare) - edge_capacity(&explicit)).abs() < EPS);
        assert!((evacuation_cost(&bare) - evacuation_cost(&explicit)).abs() < EPS);
    }

    #[test]
    fn narrow_street_floors_effective_width() {
        let model = CapacityModel::default();
        let edge = StreetEdge::new(10.0).with_width(0.5);
        assert!((model.effective_width(&edge) - 1.0).abs() < EPS);
        assert!((model.capacity_per_second(&edge) - 1.3).abs() < EPS);
    }

    #[test]
    fn capacity_increases_with_width() {
        let model = CapacityModel::default();
        let mut previous = 0.0;
        for tenth in 17..120 {
            let width = f64::from(tenth) / 10.0;
            let capacity = model.edge_capacity(&StreetEdge::new(10.0).with_width(width));
            assert!(capacity > previous, "width {width}");
            previous = capacity;
        }
    }

    #[test]
    fn walking_speed_decreases_with_gradient_down_to_floor() {
        let model = CapacityModel::default();
        let mut previous = f64::INFINITY;
        for gradient in 0..7 {
            let speed =
                model.walking_speed(&StreetEdge::new(10.0).with_gradient(f64::from(gradient)));
            assert!(speed < previous);
            previous = speed;
        }
        let steep = StreetEdge::new(10.0).with_gradient(25.0);
        assert!((model.walking_speed(&steep) - 0.5).abs() < EPS);
    }

    #[test]
    fn cost_is_positive() {
        let model = CapacityModel::default();
        for (length, width, gradient) in [
            (0.01, 0.1, 0.0),
            (1.0, 4.0, 3.0),
            (500.0, 30.0, -8.0),
            (1e6, 2.0, 100.0),
        ] {
            let edge = StreetEdge::new(length)
                .with_width(width)
                .with_gradient(gradient);
            assert!(model.evacuation_cost(&edge) > 0.0);
        }
    }

    #[test]
    fn capacity_factor_scales_capacity() {
        let model = CapacityModel::default();
        let mut edge = StreetEdge::new(10.0).with_width(4.0);
        let base = model.edge_capacity(&edge);
        edge.capacity_factor = 0.5;
        assert!((model.edge_capacity(&edge) - base * 0.5).abs() < EPS);
    }

    #[test]
    fn rejects_invalid_params() {
        let params = CapacityParams {
            flow_per_meter: 0.0,
            ..CapacityParams::default()
        };
        assert!(params.validate().is_err());
        assert!(CapacityParams::default().validate().is_ok());
    }
}
