use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};
use tracing::instrument;

use crate::{
    error::Result,
    merge::{can_merge, MergeParams},
    quad::Quadrilateral,
    result::TextRegion,
};

type IndexedBox = GeomWithData<Rectangle<[f32; 2]>, usize>;

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            node = std::mem::replace(&mut self.parent[node], root);
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let (root_x, root_y) = (self.find(x), self.find(y));
        if root_x == root_y {
            return;
        }
        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}

/// All pairs `(i, j)` with `i < j` that pass [`can_merge`], sorted.
///
/// Only pairs whose boxes lie within `gap_limit * font_size` of each other are
/// tested; any pair further apart fails the gap test anyway.
#[instrument(level = "debug", skip(lines))]
pub fn merge_edges(lines: &[Quadrilateral], params: &MergeParams) -> Result<Vec<(usize, usize)>> {
    let font_sizes = lines
        .iter()
        .map(Quadrilateral::font_size)
        .collect::<Result<Vec<_>>>()?;

    let tree = RTree::bulk_load(
        lines
            .iter()
            .enumerate()
            .map(|(i, it)| {
                let rect = it.aabb();
                IndexedBox::new(
                    Rectangle::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    i,
                )
            })
            .collect(),
    );

    let mut edges = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let reach = (params.gap_limit * font_sizes[i]).max(0.0);
        let rect = line.aabb();
        let envelope = AABB::from_corners(
            [rect.min().x - reach, rect.min().y - reach],
            [rect.max().x + reach, rect.max().y + reach],
        );
        let mut candidates = tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|it| it.data)
            .filter(|j| *j > i)
            .collect::<Vec<_>>();
        candidates.sort_unstable();
        log::trace!("Line {i} has {} merge candidates", candidates.len());

        for j in candidates {
            if can_merge(line, &lines[j], params)? {
                edges.push((i, j));
            }
        }
    }
    Ok(edges)
}

/// Groups lines into regions: the connected components of the merge graph.
///
/// Regions come out ordered by the smallest input index among their members.
/// Every line must have valid geometry; the first degenerate one fails the call.
#[instrument(level = "debug", skip(lines))]
pub fn cluster(lines: Vec<Quadrilateral>, params: &MergeParams) -> Result<Vec<TextRegion>> {
    let edges = merge_edges(&lines, params)?;
    let mut components = UnionFind::new(lines.len());
    for (i, j) in &edges {
        components.union(*i, *j);
    }

    let mut slot_of_root = vec![None; lines.len()];
    let mut groups: Vec<Vec<Quadrilateral>> = Vec::new();
    for (i, line) in lines.into_iter().enumerate() {
        let root = components.find(i);
        let slot = *slot_of_root[root].get_or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(line);
    }
    log::debug!(
        "Merged {} edges into {} regions",
        edges.len(),
        groups.len()
    );

    groups.into_iter().map(TextRegion::new).collect()
}
