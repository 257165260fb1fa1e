//! Host-side reference of the snowflake graph content.
//!
//! Mirrors what `shaders/snowflake.wgsl` computes on the device, one record at a
//! time. Startup logs the record counts it predicts and the tests use it to pin
//! down the properties of the graph.

use glam::Vec2;

/// Recursion bound of the snowflake node.
pub const MAX_SNOWFLAKE_RECURSIONS: u32 = 3;

const SQRT3: f32 = 1.732_050_8;

/// Half width of a drawn outline segment in clip space.
pub const LINE_WIDTH: f32 = 0.0075;
/// Clip-space depth of outline segments.
pub const LINE_DEPTH: f32 = 0.25;
/// Clip-space depth of triangle fills.
pub const FILL_DEPTH: f32 = 0.5;

/// Record sent to the recursive node and to the line mesh node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub start: Vec2,
    pub end: Vec2,
}

impl Edge {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

/// Record sent to the triangle mesh node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub verts: [Vec2; 3],
    /// Recursion depth the fill was produced at, 0 for the seed triangle.
    pub depth: u32,
}

/// What the recursive node emits for one edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subdivision {
    /// Four child edges back into the recursive node plus one fill.
    Split { edges: [Edge; 4], fill: Fill },
    /// One outline segment to draw.
    Terminal(Edge),
}

/// The entry node's output: three edges of an equilateral triangle and its fill.
pub fn seed() -> ([Edge; 3], Fill) {
    let v0 = Vec2::new(0.0, 0.9);
    let v1 = Vec2::new(SQRT3 * 0.45, -0.45);
    let v2 = Vec2::new(-SQRT3 * 0.45, -0.45);
    (
        [Edge::new(v0, v1), Edge::new(v1, v2), Edge::new(v2, v0)],
        Fill {
            verts: [v0, v1, v2],
            depth: 0,
        },
    )
}

/// Processes one edge with `remaining` recursion levels left.
pub fn subdivide(edge: Edge, remaining: u32, max_recursion: u32) -> Subdivision {
    if remaining == 0 {
        return Subdivision::Terminal(edge);
    }

    let Edge { start, end } = edge;
    let perpendicular = Vec2::new(start.y - end.y, end.x - start.x) * SQRT3 / 6.0;
    let left = start.lerp(end, 1.0 / 3.0);
    let mid = start.lerp(end, 0.5) + perpendicular;
    let right = start.lerp(end, 2.0 / 3.0);

    Subdivision::Split {
        edges: [
            Edge::new(start, left),
            Edge::new(left, mid),
            Edge::new(mid, right),
            Edge::new(right, end),
        ],
        fill: Fill {
            verts: [left, mid, right],
            depth: 1 + max_recursion.saturating_sub(remaining),
        },
    }
}

/// Every draw record one dispatch of the graph produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub lines: Vec<Edge>,
    pub fills: Vec<Fill>,
}

/// Runs the graph to completion on the host, level by level.
pub fn expand(max_recursion: u32) -> Expansion {
    let (edges, fill) = seed();
    let mut expansion = Expansion {
        lines: Vec::new(),
        fills: vec![fill],
    };

    let mut level = edges.to_vec();
    for depth in 0..=max_recursion {
        let remaining = max_recursion - depth;
        let mut next = Vec::with_capacity(level.len() * 4);
        for edge in level {
            match subdivide(edge, remaining, max_recursion) {
                Subdivision::Split { edges, fill } => {
                    next.extend(edges);
                    expansion.fills.push(fill);
                }
                Subdivision::Terminal(line) => expansion.lines.push(line),
            }
        }
        level = next;
    }
    expansion
}

/// Fill color for a recursion depth, cycling through four shades.
pub fn palette(depth: u32) -> [f32; 4] {
    const PALETTE: [[f32; 4]; 4] = [
        [0.13, 0.44, 0.71, 1.0],
        [0.42, 0.68, 0.84, 1.0],
        [0.74, 0.84, 0.91, 1.0],
        [0.94, 0.95, 1.00, 1.0],
    ];
    PALETTE[(depth % 4) as usize]
}

/// Outline color.
pub const LINE_COLOR: [f32; 4] = [0.03, 0.19, 0.42, 1.0];

/// Vertices drawn for one outline segment.
///
/// The segment becomes a hexagon with pointed ends, drawn as a fan of four
/// triangles around its first corner. `aspect` is width over height of the
/// render target. Horizontal offsets are divided by it, as `LineMeshShader`
/// does with `resolution.y / resolution.x`, so lines keep the same width on
/// screen in any window shape. At `aspect == 1.0` the correction is a no-op.
pub fn line_vertices(edge: Edge, aspect: f32) -> [Vec2; 12] {
    let direction = (edge.end - edge.start).normalize_or_zero();
    let perpendicular = Vec2::new(direction.y, -direction.x);
    let outwards = direction * SQRT3 / 3.0;
    let offsets = [perpendicular, outwards, -perpendicular];

    std::array::from_fn(|vertex| {
        let corner = vertex % 3;
        let hex = if corner == 0 { 0 } else { vertex / 3 + corner };

        let mut offset = outwards + offsets[hex % 3];
        offset.x /= aspect.max(f32::EPSILON);
        if hex < 3 {
            edge.start - offset * LINE_WIDTH
        } else {
            edge.end + offset * LINE_WIDTH
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::program::BackingLayout;
    use crate::state_object::DepthStencilDesc;
    use crate::topology::snowflake_program;

    #[test]
    fn edges_either_split_or_terminate() {
        let (edges, _) = seed();
        for remaining in 0..=MAX_SNOWFLAKE_RECURSIONS {
            match subdivide(edges[0], remaining, MAX_SNOWFLAKE_RECURSIONS) {
                Subdivision::Split { edges: children, fill } => {
                    assert!(remaining > 0);
                    assert_eq!(children[0].start, edges[0].start);
                    assert_eq!(children[3].end, edges[0].end);
                    for child in children {
                        assert!((child.length() - edges[0].length() / 3.0).abs() < 1e-5);
                    }
                    assert_eq!(fill.verts[0], children[0].end);
                }
                Subdivision::Terminal(line) => {
                    assert_eq!(remaining, 0);
                    assert_eq!(line, edges[0]);
                }
            }
        }
    }

    #[test]
    fn record_counts_grow_by_four_per_level() {
        for max in 0..=4 {
            let expansion = expand(max);
            assert_eq!(expansion.lines.len(), 3 * 4usize.pow(max));
            assert_eq!(expansion.fills.len(), 4usize.pow(max));
        }
    }

    #[test]
    fn fill_depths_stay_within_the_recursion_bound() {
        let expansion = expand(MAX_SNOWFLAKE_RECURSIONS);
        assert_eq!(expansion.fills[0].depth, 0);
        assert!(
            expansion
                .fills
                .iter()
                .all(|f| f.depth <= MAX_SNOWFLAKE_RECURSIONS)
        );
        // Fills are emitted breadth first, so a child never precedes its parent.
        assert!(expansion.fills.windows(2).all(|w| w[0].depth <= w[1].depth));
    }

    #[test]
    fn lineage_depth_increases_by_one_per_split() {
        let (edges, seed_fill) = seed();
        let mut edge = edges[1];
        let mut depth = seed_fill.depth;
        for remaining in (1..=MAX_SNOWFLAKE_RECURSIONS).rev() {
            let Subdivision::Split { edges, fill } = subdivide(edge, remaining, MAX_SNOWFLAKE_RECURSIONS)
            else {
                panic!("budget left but edge terminated");
            };
            assert_eq!(fill.depth, depth + 1);
            depth = fill.depth;
            edge = edges[1];
        }
        assert!(matches!(
            subdivide(edge, 0, MAX_SNOWFLAKE_RECURSIONS),
            Subdivision::Terminal(_)
        ));
    }

    #[test]
    fn outlines_draw_over_fills_in_any_order() {
        let depth = DepthStencilDesc::default();
        // Line first, then fill: the fill is rejected.
        assert!(depth.passes(LINE_DEPTH, 1.0));
        assert!(!depth.passes(FILL_DEPTH, LINE_DEPTH));
        // Fill first, then line: the line wins.
        assert!(depth.passes(FILL_DEPTH, 1.0));
        assert!(depth.passes(LINE_DEPTH, FILL_DEPTH));
    }

    #[test]
    fn palette_cycles_every_four_levels() {
        assert_eq!(palette(0), palette(4));
        assert_ne!(palette(0), palette(1));
        assert_eq!(palette(3)[3], 1.0);
    }

    #[test]
    fn line_geometry_hugs_its_segment() {
        let edge = Edge::new(Vec2::new(-0.5, 0.0), Vec2::new(0.5, 0.0));
        let vertices = line_vertices(edge, 1.0);
        let reach = LINE_WIDTH * 2.0;
        for v in vertices {
            assert!(v.x >= edge.start.x - reach && v.x <= edge.end.x + reach);
            assert!(v.y.abs() <= reach);
        }
        // Every fan triangle starts at the same corner.
        assert!(vertices.chunks(3).all(|t| t[0] == vertices[0]));
    }

    #[test]
    fn wide_targets_narrow_the_horizontal_offset() {
        let edge = Edge::new(Vec2::new(0.0, -0.5), Vec2::new(0.0, 0.5));
        let square = line_vertices(edge, 1.0);
        let wide = line_vertices(edge, 2.0);
        for (s, w) in square.iter().zip(&wide) {
            assert!((w.x - s.x / 2.0).abs() < 1e-6);
            assert_eq!(w.y, s.y);
        }
        assert!(square.iter().any(|v| v.x != 0.0));
    }

    #[test]
    fn backing_memory_holds_every_record() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        let layout = BackingLayout::compute(graph, 1).unwrap();
        let expansion = expand(MAX_SNOWFLAKE_RECURSIONS);

        let capacity = |name: &str| {
            let node = graph.node_index(&NodeId::new(name, 0)).unwrap();
            layout.region(node, 0).unwrap().capacity
        };
        assert!(expansion.lines.len() as u64 <= capacity("LineMeshNode"));
        assert!(expansion.fills.len() as u64 <= capacity("TriangleMeshNode"));
    }
}
