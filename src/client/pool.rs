// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Node pool: an ordered list of candidate nodes tried in round-robin
//! order across reconnects, starting from a random index.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::cfg::config::NodeConfig;

pub struct NodePool {
    nodes: Vec<NodeConfig>,
    index: AtomicUsize,
}

impl NodePool {
    pub fn new(nodes: Vec<NodeConfig>, random_start: bool) -> Self {
        assert!(!nodes.is_empty(), "node pool must not be empty");
        let start = if random_start {
            rand::rng().random_range(0..nodes.len())
        } else {
            0
        };
        Self {
            nodes,
            index: AtomicUsize::new(start),
        }
    }

    /// Returns the node at the current index and advances the index,
    /// wrapping modulo the pool size.
    pub fn next(&self) -> NodeConfig {
        let len = self.nodes.len();
        let i = self.index.fetch_add(1, Ordering::Relaxed) % len;
        self.nodes[i].clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
