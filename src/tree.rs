use std::collections::VecDeque;
use std::fmt;

use crate::budget::{num_layers, point_budget};
use crate::chunk::{Branch, BuildContext, Chunk, ChunkId, NodeSpec};
use crate::config::TreeConfig;
use crate::error::Result;
use crate::grid::GridAccessor;

/// Multi-resolution quad-tree over a gridded dataset.
///
/// The whole tree is built eagerly by [`QuadTree::build`] and never changes
/// afterwards. Chunks live in an arena in breadth-first order, so the root is
/// always [`ChunkId::ROOT`] and every layer occupies a contiguous id range.
#[derive(Debug)]
pub struct QuadTree<G> {
    chunks: Vec<Chunk<G>>,
    num_layers: u32,
    point_budget: f64,
    config: TreeConfig,
}

impl<G: GridAccessor> QuadTree<G> {
    /// Builds a tree over `dataset`. `original_file_size` and
    /// `max_chunk_size` share a unit (typically bytes) and decide both the
    /// number of layers and the per-chunk point budget.
    pub fn build(dataset: G, original_file_size: f64, max_chunk_size: f64) -> Result<Self> {
        Self::build_with_config(dataset, TreeConfig::new(original_file_size, max_chunk_size))
    }

    pub fn build_with_config(dataset: G, config: TreeConfig) -> Result<Self> {
        let num_layers = num_layers(config.original_file_size, config.max_chunk_size)?;
        let point_budget = point_budget(
            dataset.total_point_count(),
            config.original_file_size,
            config.max_chunk_size,
        )?;
        log::debug!(
            "building quad-tree with {num_layers} layers and a budget of {point_budget:.1} points per chunk"
        );

        let ctx = BuildContext {
            max_depth: num_layers,
            point_budget,
            parallel: config.parallel,
            bounds_mode: config.bounds_mode,
        };
        let root = NodeSpec::root(dataset).build(&ctx)?;
        let chunks = flatten(root);
        log::debug!("built quad-tree with {} chunks", chunks.len());

        Ok(Self {
            chunks,
            num_layers,
            point_budget,
            config,
        })
    }
}

impl<G> QuadTree<G> {
    pub fn root(&self) -> &Chunk<G> {
        &self.chunks[ChunkId::ROOT.0]
    }

    /// Panics if `id` was not handed out by this tree.
    pub fn chunk(&self, id: ChunkId) -> &Chunk<G> {
        &self.chunks[id.0]
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk<G>> {
        self.chunks.get(id.0)
    }

    /// All chunks in breadth-first order.
    pub fn chunks(&self) -> &[Chunk<G>] {
        &self.chunks
    }

    pub fn children(&self, id: ChunkId) -> impl Iterator<Item = &Chunk<G>> {
        self.chunk(id).children().iter().map(|child| self.chunk(*child))
    }

    pub fn parent(&self, id: ChunkId) -> Option<&Chunk<G>> {
        self.chunk(id).parent().map(|parent| self.chunk(parent))
    }

    pub fn chunks_at_depth(&self, depth: u32) -> impl Iterator<Item = &Chunk<G>> {
        self.chunks.iter().filter(move |chunk| chunk.depth() == depth)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Chunk<G>> {
        self.chunks.iter().filter(|chunk| chunk.is_leaf())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn num_layers(&self) -> u32 {
        self.num_layers
    }

    pub fn num_chunks_bottom_layer(&self) -> usize {
        4usize.pow(self.num_layers - 1)
    }

    pub fn point_budget(&self) -> f64 {
        self.point_budget
    }

    pub fn resolution(&self, id: ChunkId) -> f64 {
        self.chunk(id).resolution()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Quadrant digits from the root down to `id`; empty for the root.
    pub fn quadkey(&self, id: ChunkId) -> String {
        let mut digits = Vec::new();
        let mut current = self.chunk(id);
        while let Some(quadrant) = current.quadrant() {
            digits.push(char::from(b'0' + u8::from(quadrant)));
            match current.parent() {
                Some(parent) => current = self.chunk(parent),
                None => break,
            }
        }
        digits.iter().rev().collect()
    }
}

impl<G> fmt::Display for QuadTree<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuadTree with {} chunks at lowest level of max chunk size {}",
            self.num_chunks_bottom_layer(),
            self.config.max_chunk_size
        )
    }
}

/// Moves a built branch into breadth-first arena order, wiring up ids.
fn flatten<G>(root: Branch<G>) -> Vec<Chunk<G>> {
    let mut chunks = Vec::new();
    let mut queue = VecDeque::from([(root, None)]);
    while let Some((branch, parent)) = queue.pop_front() {
        let Branch {
            mut chunk,
            children,
        } = branch;
        let id = ChunkId(chunks.len());
        chunk.id = id;
        chunk.parent = parent;
        if let Some(children) = children {
            // Everything already queued gets an id before these children.
            let first = chunks.len() + 1 + queue.len();
            chunk.children = Some([0, 1, 2, 3].map(|i| ChunkId(first + i)));
            queue.extend((*children).map(|child| (child, Some(id))));
        }
        chunks.push(chunk);
    }
    chunks
}
