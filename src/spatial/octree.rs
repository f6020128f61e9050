//! Arena-backed octree over bounded elements.
//!
//! Elements are stored in the deepest cell that fully contains their bounds.
//! Elements that do not fit the root bounds stay in the root, so the tree
//! accepts anything regardless of how it was sized.

use glam::DVec3;

use super::Aabb;

const DEFAULT_MAX_ELEMENTS: usize = 16;
const DEFAULT_MAX_DEPTH: u32 = 12;

#[derive(Debug, Clone)]
struct Cell {
    bounds: Aabb,
    depth: u32,
    elements: Vec<u32>,
    children: Option<[u32; 8]>,
}

impl Cell {
    fn new(bounds: Aabb, depth: u32) -> Self {
        Self { bounds, depth, elements: Vec::new(), children: None }
    }
}

/// Octree of `(bounds, T)` elements.
#[derive(Debug, Clone)]
pub struct Octree<T> {
    cells: Vec<Cell>,
    elements: Vec<(Aabb, T)>,
    max_elements: usize,
    max_depth: u32,
}

impl<T: Copy> Octree<T> {
    /// Cube centered on `center` with half-size `extent`.
    pub fn new(center: DVec3, extent: f64) -> Self {
        let extent = if extent.is_finite() && extent > 0.0 { extent } else { 1.0 };
        Self {
            cells: vec![Cell::new(Aabb::from_center_extents(center, DVec3::splat(extent)), 0)],
            elements: Vec::new(),
            max_elements: DEFAULT_MAX_ELEMENTS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Cube enclosing `bounds`.
    pub fn from_bounds(bounds: &Aabb) -> Self {
        Self::new(bounds.center(), bounds.extents().length())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn add_element(&mut self, bounds: Aabb, value: T) {
        let id = self.elements.len() as u32;
        self.elements.push((bounds, value));

        let mut cell = 0usize;
        loop {
            match self.cells[cell].children {
                Some(children) => {
                    match children.iter().find(|&&c| self.cells[c as usize].bounds.contains_box(&bounds)) {
                        Some(&child) => cell = child as usize,
                        None => {
                            self.cells[cell].elements.push(id);
                            return;
                        }
                    }
                }
                None => {
                    self.cells[cell].elements.push(id);
                    if self.cells[cell].elements.len() > self.max_elements
                        && self.cells[cell].depth < self.max_depth
                    {
                        self.split(cell);
                    }
                    return;
                }
            }
        }
    }

    fn split(&mut self, cell: usize) {
        let bounds = self.cells[cell].bounds;
        let depth = self.cells[cell].depth + 1;
        let center = bounds.center();
        let half = bounds.extents() * 0.5;

        let mut children = [0u32; 8];
        for (i, child) in children.iter_mut().enumerate() {
            let offset = DVec3::new(
                if i & 1 == 0 { -half.x } else { half.x },
                if i & 2 == 0 { -half.y } else { half.y },
                if i & 4 == 0 { -half.z } else { half.z },
            );
            *child = self.cells.len() as u32;
            self.cells.push(Cell::new(Aabb::from_center_extents(center + offset, half), depth));
        }

        let moved = std::mem::take(&mut self.cells[cell].elements);
        self.cells[cell].children = Some(children);

        for id in moved {
            let element_bounds = self.elements[id as usize].0;
            match children.iter().find(|&&c| self.cells[c as usize].bounds.contains_box(&element_bounds)) {
                Some(&child) => self.cells[child as usize].elements.push(id),
                None => self.cells[cell].elements.push(id),
            }
        }
    }

    /// Visit every element whose bounds intersect `query` (inclusive).
    pub fn find_elements_with_bounds_test(&self, query: &Aabb, mut visit: impl FnMut(&T)) {
        let mut stack = vec![0u32];
        while let Some(cell) = stack.pop() {
            let cell = &self.cells[cell as usize];
            for &id in &cell.elements {
                let (bounds, value) = &self.elements[id as usize];
                if bounds.intersects(query) {
                    visit(value);
                }
            }
            if let Some(children) = cell.children {
                for child in children {
                    if self.cells[child as usize].bounds.intersects(query) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Collect elements intersecting `query`.
    pub fn query(&self, query: &Aabb) -> Vec<T> {
        let mut out = Vec::new();
        self.find_elements_with_bounds_test(query, |v| out.push(*v));
        out
    }
}
