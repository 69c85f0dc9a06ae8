pub mod kd_tree;

pub use kd_tree::{KdTree, Neighbor};
