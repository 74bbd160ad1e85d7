use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the simulation grid a sample lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub height: usize,
    pub width: usize,
}

impl GridShape {
    pub fn new(height: usize, width: usize) -> Self {
        assert!(height > 0, "height must be > 0");
        assert!(width > 0, "width must be > 0");
        Self { height, width }
    }

    pub fn num_nodes(&self) -> usize {
        self.height * self.width
    }

    fn node(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Directed 4-neighbour connectivity of a grid, both edge directions
/// included so every interior cell receives from all four sides.
pub fn grid_edges(shape: GridShape) -> Vec<(usize, usize)> {
    let mut edges = Vec::with_capacity(4 * shape.num_nodes());
    for row in 0..shape.height {
        for col in 0..shape.width {
            let here = shape.node(row, col);
            if col + 1 < shape.width {
                let right = shape.node(row, col + 1);
                edges.push((here, right));
                edges.push((right, here));
            }
            if row + 1 < shape.height {
                let below = shape.node(row + 1, col);
                edges.push((here, below));
                edges.push((below, here));
            }
        }
    }
    edges
}

/// Incoming-neighbour lists derived from the edge list.
pub fn neighbor_lists(shape: GridShape) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); shape.num_nodes()];
    for (src, dst) in grid_edges(shape) {
        neighbors[dst].push(src);
    }
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_two_grid() {
        let edges = grid_edges(GridShape::new(2, 2));
        assert_eq!(edges.len(), 8);
    }

    #[test]
    fn edge_count_matches_formula() {
        let shape = GridShape::new(3, 4);
        let edges = grid_edges(shape);
        // 2 * (H*(W-1) + (H-1)*W)
        assert_eq!(edges.len(), 2 * (3 * 3 + 2 * 4));
    }

    #[test]
    fn edges_are_symmetric() {
        let shape = GridShape::new(3, 3);
        let edges = grid_edges(shape);
        for &(src, dst) in &edges {
            assert!(edges.contains(&(dst, src)));
        }
    }

    #[test]
    fn interior_node_has_four_neighbors() {
        let shape = GridShape::new(3, 3);
        let neighbors = neighbor_lists(shape);
        assert_eq!(neighbors[4].len(), 4);
        assert_eq!(neighbors[0].len(), 2);
        assert_eq!(neighbors.len(), 9);
    }

    #[test]
    fn single_row_is_a_chain() {
        let edges = grid_edges(GridShape::new(1, 5));
        assert_eq!(edges.len(), 8);
    }
}
