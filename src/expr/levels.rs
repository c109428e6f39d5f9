// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The precalculation scheduler.

Nodes are grouped by dependency level (0 for the evaluation roots, 1 + the
maximum parent level otherwise). Levels are processed deepest first, so by
the time a level runs, everything it depends on is already in the cache;
nodes *within* a level never depend on each other and are evaluated in
parallel with rayon.

Only nodes with two or more parents are worth caching: anything else is
computed exactly once per evaluation anyway.
 */

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;

use super::{eval::EvalShared, CachePolicy, ExprId};
use crate::value::Value;

/// Run the precalculation pass, returning the populated cache. The result
/// stays valid until the grid, the solvable set, or a parameter changes.
pub(crate) fn precompute(
    shared: &EvalShared,
    policy: CachePolicy,
) -> HashMap<ExprId, Arc<Value>> {
    let mut cache: HashMap<ExprId, Arc<Value>> = HashMap::new();
    if policy == CachePolicy::None {
        return cache;
    }

    let max_level = shared.graph.max_level();
    for level in (1..=max_level).rev() {
        let ids: Vec<ExprId> = shared
            .graph
            .nodes_at_level(level)
            .iter()
            .copied()
            .filter(|&id| shared.graph.parent_count(id) >= 2)
            .collect();
        if ids.is_empty() {
            continue;
        }
        log::trace!("precalculating {} nodes at level {level}", ids.len());
        let results: Vec<(ExprId, Arc<Value>)> = ids
            .into_par_iter()
            .map(|id| {
                let mut memo = HashMap::new();
                let v = shared.eval(id, &cache, &mut memo);
                (id, v)
            })
            .collect();
        cache.extend(results);
    }
    log::debug!("precalculated {} of {} nodes", cache.len(), shared.graph.len());
    cache
}
