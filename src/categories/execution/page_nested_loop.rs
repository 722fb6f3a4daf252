//! Page Nested Loop Join
//!
//! For every page of the left input, scan every page of the right input and
//! compare every left record on the left page with every right record on the
//! right page. At most one left page and one right page are resident.
//!
//! ## How it works
//!
//! The iterator is a small state machine:
//!
//! - **NeedLeftPage**: fetch the next left data page, restart the right
//!   input from its first data page. No more left pages ends the join.
//! - **NeedRightPage**: fetch the next right data page. No more right pages
//!   sends us back for the next left page.
//! - **ScanSlotPair**: pick the next valid left slot on the left page, then
//!   walk the right page's valid slots looking for equal keys. When the left
//!   page is used up, move to the next right page.
//!
//! Output order: left page, right page, left slot, right slot.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `pages_read` | Counter | Data pages fetched |
//! | `records_compared` | Counter | Key comparisons |
//! | `matches` | Counter | Joined records emitted |

use crate::categories::storage::{PageIterator, PageRef};
use crate::core::constraint::{Constraint, Guarantee, GuaranteeType};
use crate::core::metrics::MetricDefinition;
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

pub const OPERATOR_ID: &str = "page_nested_loop_join";

// ---------------------------------------------------------------------------
// PageNestedLoopJoin
// ---------------------------------------------------------------------------

pub struct PageNestedLoopJoin {
    metadata: OperatorMetadata,
    requires: Vec<Constraint>,
    guarantees: Vec<Guarantee>,
    metric_defs: Vec<MetricDefinition>,
    core: JoinCore,
}

impl PageNestedLoopJoin {
    pub fn new(spec: JoinSpec) -> ExecResult<Self> {
        Ok(Self {
            metadata: Self::build_metadata(),
            requires: vec![Constraint::minimum_buffer_pages(
                MIN_JOIN_BUFFER_PAGES,
                "one left page, one right page and one output page",
            )],
            guarantees: vec![
                Guarantee::strict(GuaranteeType::BoundedMemory, "two input pages resident"),
                Guarantee::strict(
                    GuaranteeType::DeterministicOrder,
                    "left page, right page, left slot, right slot order",
                ),
            ],
            metric_defs: join_metric_definitions(),
            core: JoinCore::new(spec)?,
        })
    }

    pub fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: OPERATOR_ID.into(),
            name: "Page Nested Loop Join".into(),
            category: OperatorCategory::Join,
            description: "Joins every left page against every right page".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "The simplest page-aware join. It never needs more than two input \
                           pages in memory and works for any pair of inputs, at the price of \
                           rescanning the right input once per left page."
                    .into(),
                algorithm: "for each left page P:\n  for each right page Q:\n    for each \
                            left record l in P:\n      for each right record r in Q:\n        \
                            if l.key == r.key: emit l ++ r"
                    .into(),
                complexity: Complexity {
                    io: "[R] + [R] * [S]".into(),
                    space: "3 pages".into(),
                },
                use_cases: vec![
                    "Tiny inputs".into(),
                    "Join keys with no usable order or hash".into(),
                ],
                tradeoffs: vec![
                    "Extra buffer pages are never used".into(),
                    "Right input is rescanned once per left page".into(),
                ],
            },
            references: vec![Reference {
                ref_type: ReferenceType::Book,
                title: "Database Management Systems, ch. 14.4: The Join Operation".into(),
                url: None,
                citation: Some("Ramakrishnan, R. & Gehrke, J. (2003). McGraw-Hill.".into()),
            }],
        }
    }
}

impl Operator for PageNestedLoopJoin {
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
        let state = PageNestedState::new(left, right, &env);
        Ok(Box::new(JoinIterator::new(JoinState::PageNested(state), env)))
    }
}

// ---------------------------------------------------------------------------
// Iterator state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NeedLeftPage,
    NeedRightPage,
    ScanSlotPair,
    Exhausted,
}

pub(crate) struct PageNestedState {
    left: MaterializedInput,
    right: MaterializedInput,
    left_pages: PageIterator,
    right_pages: Option<PageIterator>,
    left_page: Option<PageRef>,
    right_page: Option<PageRef>,
    /// Next left slot to try on the left page
    left_slot: usize,
    /// Next right slot to try against `left_record`
    right_slot: usize,
    left_record: Option<Record>,
    phase: Phase,
}

impl PageNestedState {
    pub(crate) fn new(left: MaterializedInput, right: MaterializedInput, env: &JoinEnv) -> Self {
        let left_pages = left.data_pages(&env.access, &env.metrics);
        Self {
            left,
            right,
            left_pages,
            right_pages: None,
            left_page: None,
            right_page: None,
            left_slot: 0,
            right_slot: 0,
            left_record: None,
            phase: Phase::NeedLeftPage,
        }
    }

    pub(crate) fn advance(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        loop {
            match self.phase {
                Phase::Exhausted => return Ok(None),
                Phase::NeedLeftPage => match self.left_pages.next() {
                    Some(page) => {
                        self.left_page = Some(page?);
                        self.right_pages = Some(self.right.data_pages(&env.access, &env.metrics));
                        self.phase = Phase::NeedRightPage;
                    }
                    None => {
                        self.left_page = None;
                        self.right_page = None;
                        self.phase = Phase::Exhausted;
                    }
                },
                Phase::NeedRightPage => {
                    match self.right_pages.as_mut().and_then(|pages| pages.next()) {
                        Some(page) => {
                            self.right_page = Some(page?);
                            self.left_slot = 0;
                            self.left_record = None;
                            self.phase = Phase::ScanSlotPair;
                        }
                        None => {
                            self.right_page = None;
                            self.phase = Phase::NeedLeftPage;
                        }
                    }
                }
                Phase::ScanSlotPair => {
                    if let Some(record) = self.scan_slot_pair(env)? {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    /// Emit the next match on the current page pair, or move on to the next
    /// right page once the left page is used up.
    fn scan_slot_pair(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        let (Some(left_page), Some(right_page)) = (&self.left_page, &self.right_page) else {
            self.phase = Phase::NeedRightPage;
            return Ok(None);
        };
        let left_layout = self.left.layout();
        let right_layout = self.right.layout();

        loop {
            if self.left_record.is_none() {
                let mut next = None;
                while self.left_slot < left_layout.entries_per_page() {
                    let slot = self.left_slot;
                    self.left_slot += 1;
                    if let Some(record) = left_layout.read_record(self.left.schema(), left_page, slot)? {
                        next = Some(record);
                        break;
                    }
                }
                match next {
                    Some(record) => {
                        self.left_record = Some(record);
                        self.right_slot = 0;
                    }
                    None => {
                        self.phase = Phase::NeedRightPage;
                        return Ok(None);
                    }
                }
            }

            if let Some(left_record) = &self.left_record {
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
    use crate::core::metrics::names;
    use crate::core::operator::drain;
    use crate::tests::fixtures;

    #[test]
    fn test_small_join() {
        let (ctx, storage) = fixtures::context(256);
        let left = fixtures::int_table(&storage, "l", &[(1, 10), (2, 20), (2, 21)]);
        let right = fixtures::int_table(&storage, "r", &[(2, 200), (3, 300), (1, 100)]);

        let join = PageNestedLoopJoin::new(JoinSpec::new(
            Box::new(SequentialScan::new(&storage, left).unwrap()),
            Box::new(SequentialScan::new(&storage, right).unwrap()),
            "id",
            "id",
            3,
        ))
        .unwrap();

        let out = drain(join.iter(&ctx).unwrap()).unwrap();
        let pairs: Vec<(i32, i32)> = out.iter().map(|r| fixtures::ints(r, 1, 3)).collect();
        assert_eq!(pairs, vec![(10, 100), (20, 200), (21, 200)]);
        assert_eq!(join.output_schema().len(), 4);
        assert_eq!(ctx.metrics.counter(names::MATCHES), 3);
        assert_eq!(ctx.metrics.counter(names::RECORDS_COMPARED), 9);
    }

    #[test]
    fn test_io_cost_matches_page_counts() {
        let (ctx, storage) = fixtures::context(256);
        // 24 records per page: 3 left pages, 2 right pages
        let left_rows: Vec<(i32, i32)> = (0..60).map(|i| (i, i)).collect();
        let right_rows: Vec<(i32, i32)> = (0..30).map(|i| (i * 2, i)).collect();
        let left = fixtures::int_table(&storage, "l", &left_rows);
        let right = fixtures::int_table(&storage, "r", &right_rows);

        let join = PageNestedLoopJoin::new(JoinSpec::new(
            Box::new(SequentialScan::new(&storage, left).unwrap()),
            Box::new(SequentialScan::new(&storage, right).unwrap()),
            "id",
            "id",
            3,
        ))
        .unwrap();
        let out = drain(join.iter(&ctx).unwrap()).unwrap();

        assert_eq!(out.len(), 30);
        assert_eq!(ctx.metrics.counter(names::PAGES_READ), 3 + 3 * 2);
    }
}
