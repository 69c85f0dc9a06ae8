use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Yields 4-combinations of `0..n` ordered by increasing index sum.
///
/// With stars sorted brightest-first this visits combinations of the
/// brightest stars before those involving fainter ones.
pub struct QuadCombinations {
    n: usize,
    heap: BinaryHeap<Reverse<(usize, [usize; 4])>>,
    seen: HashSet<[usize; 4]>,
}

impl QuadCombinations {
    pub fn new(n: usize) -> Self {
        let mut combinations = Self {
            n,
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
        };
        if n >= 4 {
            let initial = [0, 1, 2, 3];
            combinations.seen.insert(initial);
            combinations.heap.push(Reverse((6, initial)));
        }
        combinations
    }
}

impl Iterator for QuadCombinations {
    type Item = [usize; 4];

    fn next(&mut self) -> Option<[usize; 4]> {
        let Reverse((sum, combo)) = self.heap.pop()?;

        // Each position may advance by one while the sequence stays strictly increasing.
        for i in 0..4 {
            let next_val = combo[i] + 1;
            let upper = if i + 1 < 4 { combo[i + 1] } else { self.n };
            if next_val < upper {
                let mut successor = combo;
                successor[i] = next_val;
                if self.seen.insert(successor) {
                    self.heap.push(Reverse((sum + 1, successor)));
                }
            }
        }

        Some(combo)
    }
}

/// Number of 4-combinations of `n` items.
pub fn quad_count(n: usize) -> usize {
    if n < 4 {
        0
    } else {
        n * (n - 1) * (n - 2) * (n - 3) / 24
    }
}
