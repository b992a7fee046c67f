//! Quadtree spatial index over bounding boxes
//!
//! Items are stored at the deepest node whose bounds fully contain their bounding box, so an
//! item straddling a split line stays at the parent. The tree is built once from a fixed item
//! set; an index over a modified collection must be rebuilt.

use geo::{BoundingRect, Coord, Rect};

/// Maximum depth of the quadtree to prevent infinite recursion
const MAX_DEPTH: u32 = 20;

/// Number of items a leaf holds before it is subdivided
const MAX_ITEMS_PER_NODE: usize = 8;

/// Bounding-box candidate lookup
pub trait SpatialIndex {
    /// Ids of all items whose bounding box intersects `bbox`, ascending and without duplicates
    fn query(&self, bbox: Rect<f64>) -> Vec<usize>;
}

/// An item stored in the tree
#[derive(Debug, Clone, Copy)]
struct IndexedItem {
    id: usize,
    bbox: Rect<f64>,
}

/// Root container for the quadtree spatial index
#[derive(Debug, Clone)]
pub struct Quadtree {
    /// `None` when built from no items
    root: Option<QuadtreeNode>,
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode {
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    items: Vec<IndexedItem>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode; 4]>>,
}

impl Quadtree {
    /// Build an index over `(id, bbox)` pairs
    pub fn new(items: impl IntoIterator<Item = (usize, Rect<f64>)>) -> Self {
        let items: Vec<IndexedItem> = items
            .into_iter()
            .map(|(id, bbox)| IndexedItem { id, bbox })
            .collect();

        let Some(bounds) = items
            .iter()
            .map(|item| item.bbox)
            .reduce(union)
        else {
            return Self { root: None, len: 0 };
        };

        let mut root = QuadtreeNode::new(bounds, 0);
        for item in &items {
            root.insert(*item);
        }

        Self {
            root: Some(root),
            len: items.len(),
        }
    }

    /// Build an index over geometries, using their position as id.
    ///
    /// Geometries without a bounding box (empty ones) are left out.
    pub fn from_geometries<'a, G>(geometries: impl IntoIterator<Item = &'a G>) -> Self
    where
        G: BoundingRect<f64> + 'a,
        G::Output: Into<Option<Rect<f64>>>,
    {
        Self::new(
            geometries
                .into_iter()
                .enumerate()
                .filter_map(|(id, g)| g.bounding_rect().into().map(|bbox| (id, bbox))),
        )
    }

    /// Number of indexed items
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Depth of the deepest node
    pub fn depth(&self) -> u32 {
        self.root.as_ref().map_or(0, QuadtreeNode::depth)
    }
}

impl SpatialIndex for Quadtree {
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn query(&self, bbox: Rect<f64>) -> Vec<usize> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            root.query(bbox, &mut results);
        }
        results.sort_unstable();
        results.dedup();
        results
    }
}

impl QuadtreeNode {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            items: Vec::new(),
            children: None,
        }
    }

    /// Subdivide this node into 4 children
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;

        let child_level = self.level + 1;

        // Create 4 children: NW, NE, SW, SE
        let nw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );

        self.children = Some(Box::new([nw, ne, sw, se]));

        // Push down whatever fits entirely inside a child
        let items = std::mem::take(&mut self.items);
        for item in items {
            self.insert(item);
        }
    }

    /// Insert an item at the deepest node that fully contains it
    fn insert(&mut self, item: IndexedItem) {
        if let Some(children) = &mut self.children {
            if let Some(child) = children
                .iter_mut()
                .find(|child| contains(child.bounding_box, item.bbox))
            {
                child.insert(item);
                return;
            }
            self.items.push(item);
            return;
        }

        self.items.push(item);
        if self.items.len() > MAX_ITEMS_PER_NODE && self.level < MAX_DEPTH {
            self.subdivide();
        }
    }

    fn query(&self, bbox: Rect<f64>, results: &mut Vec<usize>) {
        if !intersects(self.bounding_box, bbox) {
            return;
        }

        results.extend(
            self.items
                .iter()
                .filter(|item| intersects(item.bbox, bbox))
                .map(|item| item.id),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(bbox, results);
            }
        }
    }

    fn depth(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(QuadtreeNode::depth).max().unwrap_or(self.level),
            None => self.level,
        }
    }
}

/// Closed-interval rectangle overlap (touching counts)
#[inline]
fn intersects(a: Rect<f64>, b: Rect<f64>) -> bool {
    let (amin, amax, bmin, bmax) = (a.min(), a.max(), b.min(), b.max());
    !(amax.x < bmin.x || amin.x > bmax.x || amax.y < bmin.y || amin.y > bmax.y)
}

#[inline]
fn contains(outer: Rect<f64>, inner: Rect<f64>) -> bool {
    let (omin, omax, imin, imax) = (outer.min(), outer.max(), inner.min(), inner.max());
    omin.x <= imin.x && omin.y <= imin.y && omax.x >= imax.x && omax.y >= imax.y
}

#[inline]
fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}
