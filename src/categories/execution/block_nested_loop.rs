//! Block Nested Loop Join
//!
//! Like the page nested loop join, but loads up to `B - 2` left pages at a
//! time (one page stays reserved for the right input, one for output) and
//! scans the right input once per block instead of once per page.
//!
//! Output order: left block, right page, left record within the block (page
//! then slot), right slot. With `B = 3` the block is a single page and the
//! output order is exactly that of the page nested loop join.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `pages_read` | Counter | Data pages fetched |
//! | `blocks_loaded` | Counter | Left blocks loaded |
//! | `records_compared` | Counter | Key comparisons |
//! | `matches` | Counter | Joined records emitted |

use crate::categories::storage::{PageIterator, PageRef};
use crate::core::constraint::{Constraint, Guarantee, GuaranteeType};
use crate::core::metrics::{names, MetricDefinition};
use crate::core::operator::{
    Complexity, ExecResult, ExecutionContext, Operator, OperatorCategory, OperatorDocumentation,
    OperatorMetadata, Reference, ReferenceType, RecordIterator,
};
use crate::core::parameter::Parameter;
use crate::core::record::{Record, Schema};

use super::join::{
    join_metric_definitions, JoinCore, JoinEnv, JoinIterator, JoinSpec, JoinState,
    MIN_JOIN_BUFFER_PAGES,
};
use super::materialize::MaterializedInput;

pub const OPERATOR_ID: &str = "block_nested_loop_join";

pub struct BlockNestedLoopJoin {
    metadata: OperatorMetadata,
    requires: Vec<Constraint>,
    guarantees: Vec<Guarantee>,
    metric_defs: Vec<MetricDefinition>,
    core: JoinCore,
}

impl BlockNestedLoopJoin {
    pub fn new(spec: JoinSpec) -> ExecResult<Self> {
        let mut metric_defs = join_metric_definitions();
        metric_defs.push(MetricDefinition::counter(
            names::BLOCKS_LOADED,
            "Blocks Loaded",
            "blocks",
            "Left blocks of up to B - 2 pages loaded",
        ));
        Ok(Self {
            metadata: Self::build_metadata(),
            requires: vec![Constraint::minimum_buffer_pages(
                MIN_JOIN_BUFFER_PAGES,
                "at least one block page, one right page and one output page",
            )],
            guarantees: vec![
                Guarantee::strict(GuaranteeType::BoundedMemory, "B - 2 left pages plus one right page"),
                Guarantee::strict(
                    GuaranteeType::DeterministicOrder,
                    "left block, right page, left record, right slot order",
                ),
            ],
            metric_defs,
            core: JoinCore::new(spec)?,
        })
    }

    pub fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: OPERATOR_ID.into(),
            name: "Block Nested Loop Join".into(),
            category: OperatorCategory::Join,
            description: "Joins blocks of B - 2 left pages against every right page".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "Uses the whole buffer budget to hold a block of left pages so the \
                           right input is rescanned once per block rather than once per page."
                    .into(),
                algorithm: "for each block of B-2 left pages:\n  for each right page Q:\n    \
                            for each left record l in block:\n      for each right record r in Q:\n        \
                            if l.key == r.key: emit l ++ r"
                    .into(),
                complexity: Complexity {
                    io: "[R] + ceil([R] / (B - 2)) * [S]".into(),
                    space: "B pages".into(),
                },
                use_cases: vec![
                    "Small left input that nearly fits in the buffer".into(),
                    "Fallback when neither sorting nor hashing pays off".into(),
                ],
                tradeoffs: vec![
                    "Still quadratic in comparisons".into(),
                    "Cost drops as the buffer grows; equals the page nested loop at B = 3".into(),
                ],
            },
            references: vec![Reference {
                ref_type: ReferenceType::Book,
                title: "Database Management Systems, ch. 14.4.1: Nested Loops Join".into(),
                url: None,
                citation: Some("Ramakrishnan, R. & Gehrke, J. (2003). McGraw-Hill.".into()),
            }],
        }
    }
}

impl Operator for BlockNestedLoopJoin {
    fn metadata(&self) -> &OperatorMetadata {
        &self.metadata
    }

    fn output_schema(&self) -> &Schema {
        self.core.schema()
    }

    fn parameters(&self) -> &[Parameter] {
        self.core.params()
    }

    fn requires(&self) -> &[Constraint] {
        &self.requires
    }

    fn guarantees(&self) -> &[Guarantee] {
        &self.guarantees
    }

    fn metrics(&self) -> &[MetricDefinition] {
        &self.metric_defs
    }

    fn iter(&self, ctx: &ExecutionContext) -> ExecResult<Box<dyn RecordIterator>> {
        let Some(env) = self.core.open(ctx, OPERATOR_ID, &self.requires)? else {
            return Ok(Box::new(JoinIterator::empty()));
        };
        let (left, right) = self.core.inputs(ctx, OPERATOR_ID)?;
        let state = BlockNestedState::new(left, right, &env);
        Ok(Box::new(JoinIterator::new(JoinState::BlockNested(state), env)))
    }
}

// ---------------------------------------------------------------------------
// Iterator state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    LoadBlock,
    NextRightPage,
    ScanBlock,
    Exhausted,
}

pub(crate) struct BlockNestedState {
    left: MaterializedInput,
    right: MaterializedInput,
    block_capacity: usize,
    left_pages: PageIterator,
    right_pages: Option<PageIterator>,
    block: Vec<PageRef>,
    right_page: Option<PageRef>,
    /// Index into `block` of the page holding the current left record
    block_page: usize,
    /// Next left slot to try on `block[block_page]`
    left_slot: usize,
    right_slot: usize,
    left_record: Option<Record>,
    phase: Phase,
}

impl BlockNestedState {
    pub(crate) fn new(left: MaterializedInput, right: MaterializedInput, env: &JoinEnv) -> Self {
        let left_pages = left.data_pages(&env.access, &env.metrics);
        let block_capacity = env.buffer_pages.saturating_sub(2).max(1);
        Self {
            left,
            right,
            block_capacity,
            left_pages,
            right_pages: None,
            block: Vec::with_capacity(block_capacity),
            right_page: None,
            block_page: 0,
            left_slot: 0,
            right_slot: 0,
            left_record: None,
            phase: Phase::LoadBlock,
        }
    }

    pub(crate) fn advance(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        loop {
            match self.phase {
                Phase::Exhausted => return Ok(None),
                Phase::LoadBlock => {
                    self.block.clear();
                    while self.block.len() < self.block_capacity {
                        match self.left_pages.next() {
                            Some(page) => self.block.push(page?),
                            None => break,
                        }
                    }
                    if self.block.is_empty() {
                        self.right_page = None;
                        self.phase = Phase::Exhausted;
                        continue;
                    }
                    env.metrics.increment(names::BLOCKS_LOADED);
                    self.right_pages = Some(self.right.data_pages(&env.access, &env.metrics));
                    self.phase = Phase::NextRightPage;
                }
                Phase::NextRightPage => {
                    match self.right_pages.as_mut().and_then(|pages| pages.next()) {
                        Some(page) => {
                            self.right_page = Some(page?);
                            self.block_page = 0;
                            self.left_slot = 0;
                            self.left_record = None;
                            self.phase = Phase::ScanBlock;
                        }
                        None => {
                            self.right_page = None;
                            self.phase = Phase::LoadBlock;
                        }
                    }
                }
                Phase::ScanBlock => {
                    if let Some(record) = self.scan_block(env)? {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    /// Next valid left record in the block, in page then slot order
    fn next_left_record(&mut self) -> ExecResult<Option<Record>> {
        let layout = self.left.layout();
        while let Some(page) = self.block.get(self.block_page) {
            while self.left_slot < layout.entries_per_page() {
                let slot = self.left_slot;
                self.left_slot += 1;
                if let Some(record) = layout.read_record(self.left.schema(), page, slot)? {
                    return Ok(Some(record));
                }
            }
            self.block_page += 1;
            self.left_slot = 0;
        }
        Ok(None)
    }

    fn scan_block(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        let right_layout = self.right.layout();
        loop {
            if self.left_record.is_none() {
                match self.next_left_record()? {
                    Some(record) => {
                        self.left_record = Some(record);
                        self.right_slot = 0;
                    }
                    None => {
                        self.phase = Phase::NextRightPage;
                        return Ok(None);
                    }
                }
            }

            if let (Some(left_record), Some(right_page)) = (&self.left_record, &self.right_page) {
                while self.right_slot < right_layout.entries_per_page() {
                    let slot = self.right_slot;
                    self.right_slot += 1;
                    if let Some(right_record) = right_layout.read_record(self.right.schema(), right_page, slot)? {
                        if env.keys_match(left_record, &right_record)? {
                            return Ok(Some(left_record.concat(&right_record)));
                        }
                    }
                }
            }
            self.left_record = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::execution::SequentialScan;
    use crate::core::operator::drain;
    use crate::tests::fixtures;

    fn join(storage: &crate::categories::storage::StorageContext, budget: usize) -> BlockNestedLoopJoin {
        let left = storage.table("l").unwrap();
        let right = storage.table("r").unwrap();
        BlockNestedLoopJoin::new(JoinSpec::new(
            Box::new(SequentialScan::new(storage, left).unwrap()),
            Box::new(SequentialScan::new(storage, right).unwrap()),
            "id",
            "id",
            budget,
        ))
        .unwrap()
    }

    #[test]
    fn test_blocks_cut_right_rescans() {
        let (ctx, storage) = fixtures::context(256);
        // 5 left pages, 2 right pages at 24 records per page
        let left_rows: Vec<(i32, i32)> = (0..120).map(|i| (i % 40, i)).collect();
        let right_rows: Vec<(i32, i32)> = (0..40).map(|i| (i, -i)).collect();
        fixtures::int_table(&storage, "l", &left_rows);
        fixtures::int_table(&storage, "r", &right_rows);

        let out = drain(join(&storage, 5).iter(&ctx).unwrap()).unwrap();

        assert_eq!(out.len(), 120);
        // blocks of 3 pages: ceil(5 / 3) = 2 blocks
        assert_eq!(ctx.metrics.counter(names::BLOCKS_LOADED), 2);
        assert_eq!(ctx.metrics.counter(names::PAGES_READ), 5 + 2 * 2);
    }

    #[test]
    fn test_block_order_left_then_right_page() {
        let (ctx, storage) = fixtures::context(256);
        // two left pages in one block; every right record matches every left one
        let left_rows: Vec<(i32, i32)> = (0..48).map(|i| (7, i)).collect();
        let right_rows: Vec<(i32, i32)> = (0..48).map(|i| (7, 100 + i)).collect();
        fixtures::int_table(&storage, "l", &left_rows);
        fixtures::int_table(&storage, "r", &right_rows);

        let out = drain(join(&storage, 4).iter(&ctx).unwrap()).unwrap();
        let pairs: Vec<(i32, i32)> = out.iter().map(|r| fixtures::ints(r, 1, 3)).collect();

        assert_eq!(pairs.len(), 48 * 48);
        // right page 1 against the whole block first
        assert_eq!(pairs[0], (0, 100));
        assert_eq!(pairs[23], (0, 123));
        assert_eq!(pairs[24], (1, 100));
        assert_eq!(pairs[24 * 47], (47, 100));
        // then right page 2
        assert_eq!(pairs[48 * 24], (0, 124));
    }
}
