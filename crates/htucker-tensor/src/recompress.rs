//! Rank truncation of a tensor already in HT format

use htucker_core::left_svd_via_gram;
use scirs2_core::ndarray_ext::{s, Array2};

use crate::config::TruncationConfig;
use crate::error::HtResult;
use crate::kernels::mode_product3;
use crate::report::TruncationReport;
use crate::tensor::{collect_nodes, HTucker, NodeData};

impl HTucker {
    /// Truncate the ranks of `self`
    ///
    /// Every non-root node keeps the leading left singular vectors of its
    /// matricization, computed from the reduced Gramians of the orthogonalized
    /// tensor. All projections are chosen from the untruncated tensor, so the
    /// total error is bounded by [`TruncationReport::total_error`]. The result
    /// is not orthogonal.
    #[tracing::instrument(level = "debug", skip_all, fields(order = self.order(), max_rank = config.max_rank))]
    pub fn recompress(&self, config: &TruncationConfig) -> HtResult<(HTucker, TruncationReport)> {
        config.validate()?;
        let node_config = config.per_node(self.order());
        let x = self.orthogonalize()?;
        let grams = x.gramians_orthog()?;
        let tree = x.tree();
        let n = tree.nr_nodes();

        let mut report = TruncationReport::new(n);
        let mut bases: Vec<Array2<f64>> = Vec::with_capacity(n);
        bases.push(Array2::ones((1, 1)));
        for (t, gram) in grams.iter().enumerate().skip(1) {
            let (u, sv) = left_svd_via_gram(&gram.view())?;
            let choice = node_config.choose_rank(&sv.to_vec())?;
            bases.push(u.slice(s![.., ..choice.rank]).to_owned());
            report.record(t, choice, sv);
        }

        let mut nodes = Vec::with_capacity(n);
        for (t, uk) in bases.iter().enumerate() {
            let node = match tree.children(t) {
                None => NodeData::Leaf(x.u(t)?.dot(uk)),
                Some((l, r)) => {
                    let b = mode_product3(x.b(t)?, &bases[l].t(), 0)?;
                    let b = mode_product3(&b, &bases[r].t(), 1)?;
                    NodeData::Transfer(mode_product3(&b, &uk.t(), 2)?)
                }
            };
            nodes.push(Some(node));
        }
        let y = HTucker::new(collect_nodes(nodes)?, tree.clone(), false)?;
        Ok((y, report))
    }
}
