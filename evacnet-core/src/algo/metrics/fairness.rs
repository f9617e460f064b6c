//! Spatial fairness of route coverage.
//!
//! Node coordinates are binned into a square grid over the graph's bounding
//! box. Each route adds one pass to every cell it touches, and the Gini
//! coefficient of the passes over the cells that hold at least one node
//! measures how unevenly the routes serve the area.

use geo::{Point, Rect};
use hashbrown::HashSet;

use super::{DegenerateInput, MetricsParams};
use crate::{model::StreetGraph, routing::Route};

struct Grid {
    bounds: Rect<f64>,
    size: usize,
}

impl Grid {
    fn new(bounds: Rect<f64>, size: usize) -> Self {
        Self {
            bounds,
            size: size.max(1),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn axis(&self, value: f64, min: f64, extent: f64) -> usize {
        if extent <= 0.0 {
            return 0;
        }
        let bin = ((value - min) / extent * self.size as f64).floor();
        (bin.max(0.0) as usize).min(self.size - 1)
    }

    fn cell(&self, point: &Point<f64>) -> usize {
        let min = self.bounds.min();
        let col = self.axis(point.x(), min.x, self.bounds.width());
        let row = self.axis(point.y(), min.y, self.bounds.height());
        row * self.size + col
    }
}

/// Gini coefficient of non-negative values, 0 for an all-zero input
#[allow(clippy::cast_precision_loss)]
fn gini(values: &mut [f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if values.is_empty() || total <= 0.0 {
        return 0.0;
    }
    values.sort_unstable_by(f64::total_cmp);
    let n = values.len() as f64;
    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, value)| (2.0 * (i as f64 + 1.0) - n - 1.0) * value)
        .sum();
    weighted / (n * total)
}

pub(super) fn fairness_with_note(
    graph: &StreetGraph,
    routes: &[Route],
    params: &MetricsParams,
) -> (f64, Option<DegenerateInput>) {
    let Some(bounds) = graph.bounding_rect() else {
        return (params.neutral, Some(DegenerateInput::TooFewOccupiedCells));
    };
    let grid = Grid::new(bounds, params.grid_size);
    let cells = grid.size * grid.size;

    let mut occupied = vec![false; cells];
    for (_, node) in graph.nodes() {
        occupied[grid.cell(&node.geometry)] = true;
    }
    if occupied.iter().filter(|&&cell| cell).count() < 2 {
        return (params.neutral, Some(DegenerateInput::TooFewOccupiedCells));
    }

    let mut passes = vec![0.0_f64; cells];
    for route in routes {
        let touched: HashSet<usize> = route
            .nodes
            .iter()
            .filter_map(|&idx| graph.node(idx))
            .map(|node| grid.cell(&node.geometry))
            .collect();
        for cell in touched {
            passes[cell] += 1.0;
        }
    }

    let mut coverage: Vec<f64> = passes
        .into_iter()
        .zip(occupied)
        .filter_map(|(count, occupied)| occupied.then_some(count))
        .collect();
    if coverage.iter().all(|&count| count == 0.0) {
        return (params.neutral, Some(DegenerateInput::NoRouteCoverage));
    }

    ((1.0 - gini(&mut coverage)).clamp(0.0, 1.0), None)
}

/// `1 - Gini` of route coverage over a 10×10 grid, in `[0, 1]`.
///
/// Returns 0.5 when fewer than two cells hold nodes or no route covers any.
pub fn fairness_index(graph: &StreetGraph, routes: &[Route]) -> f64 {
    fairness_with_note(graph, routes, &MetricsParams::default()).0
}
