//! Grace Hash Join
//!
//! Two phases over a buffer budget of `B` pages:
//!
//! 1. **Partition**: stream each input once and route every record into one
//!    of `B - 1` temporary relations by the hash of its join key. Both sides
//!    use the same [`HashPartitioner`], so matching keys always land in
//!    partitions with the same index.
//! 2. **Build/probe**: for each partition index in order, build an in-memory
//!    table of the left partition keyed by raw key hash, then stream the right
//!    partition through it. Hash equality only selects candidates; every
//!    candidate's key is compared before a pair is emitted.
//!
//! Only one partition's table is resident at a time, and each partition pair
//! is released as soon as it has been probed.
//!
//! Output order: partition index, right record, bucket position.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `partitions` | Counter | Partitions created per side |
//! | `hash_buckets` | Counter | Distinct hash buckets built across partitions |
//! | `records_compared` | Counter | Key comparisons against bucket candidates |
//! | `matches` | Counter | Joined records emitted |

use std::collections::HashMap;
use std::sync::Arc;

use crate::categories::partitioning::{hash_value, HashPartitioner};
use crate::categories::storage::{RecordIter, RelationAccess, TempRelation};
use crate::core::constraint::{Constraint, Guarantee, GuaranteeType};
use crate::core::metrics::{names, MetricDefinition};
use crate::core::operator::{
    Complexity, ExecResult, ExecutionContext, Operator, OperatorCategory, OperatorDocumentation,
    OperatorMetadata, Reference, ReferenceType, RecordIterator,
};
use crate::core::parameter::Parameter;
use crate::core::record::{Record, Schema};

use super::join::{
    join_metric_definitions, key_at, JoinCore, JoinEnv, JoinIterator, JoinSpec, JoinState,
    MIN_JOIN_BUFFER_PAGES,
};
use super::materialize::MaterializedInput;

pub const OPERATOR_ID: &str = "grace_hash_join";

pub struct GraceHashJoin {
    metadata: OperatorMetadata,
    requires: Vec<Constraint>,
    guarantees: Vec<Guarantee>,
    metric_defs: Vec<MetricDefinition>,
    core: JoinCore,
}

impl GraceHashJoin {
    pub fn new(spec: JoinSpec) -> ExecResult<Self> {
        let mut metric_defs = join_metric_definitions();
        metric_defs.push(MetricDefinition::counter(
            names::PARTITIONS,
            "Partitions",
            "partitions",
            "Partitions created per input side",
        ));
        metric_defs.push(MetricDefinition::counter(
            names::HASH_BUCKETS,
            "Hash Buckets",
            "buckets",
            "Distinct key hashes in the build tables",
        ));
        Ok(Self {
            metadata: Self::build_metadata(),
            requires: vec![Constraint::minimum_buffer_pages(
                MIN_JOIN_BUFFER_PAGES,
                "at least two partitions plus one input page",
            )],
            guarantees: vec![
                Guarantee::best_effort(
                    GuaranteeType::BoundedMemory,
                    "one partition's hash table resident at a time",
                ),
                Guarantee::strict(
                    GuaranteeType::DeterministicOrder,
                    "partition index, right record, bucket position order",
                ),
            ],
            metric_defs,
            core: JoinCore::new(spec)?,
        })
    }

    pub fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: OPERATOR_ID.into(),
            name: "Grace Hash Join".into(),
            category: OperatorCategory::Join,
            description: "Partitions both inputs by key hash, then builds and probes per partition".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "Splits both inputs into B - 1 co-partitioned runs so that each \
                           left partition's hash table fits in memory, then joins partition \
                           pairs independently."
                    .into(),
                algorithm: "for each record in R, S: write to partition h(key) mod (B-1)\n\
                            for each partition i:\n  build table over R_i keyed by h(key)\n  \
                            for each s in S_i: for each r in table[h(s.key)]:\n    \
                            if r.key == s.key: emit r ++ s"
                    .into(),
                complexity: Complexity {
                    io: "3 * ([R] + [S])".into(),
                    space: "B pages plus one partition's hash table".into(),
                },
                use_cases: vec![
                    "Large unsorted equi-joins".into(),
                    "Inputs with well spread join keys".into(),
                ],
                tradeoffs: vec![
                    "Skewed keys make one partition's table outgrow the budget".into(),
                    "Output carries no useful order".into(),
                ],
            },
            references: vec![
                Reference {
                    ref_type: ReferenceType::Paper,
                    title: "Application of Hash to Data Base Machine and Its Architecture".into(),
                    url: None,
                    citation: Some(
                        "Kitsuregawa, M., Tanaka, H. & Moto-Oka, T. (1983). New Generation Computing 1(1)."
                            .into(),
                    ),
                },
                Reference {
                    ref_type: ReferenceType::Book,
                    title: "Database Management Systems, ch. 14.4.3: Hash Join".into(),
                    url: None,
                    citation: Some("Ramakrishnan, R. & Gehrke, J. (2003). McGraw-Hill.".into()),
                },
            ],
        }
    }
}

impl Operator for GraceHashJoin {
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
        let state = GraceHashState::new(left, right, &env)?;
        Ok(Box::new(JoinIterator::new(JoinState::GraceHash(state), env)))
    }
}

// ---------------------------------------------------------------------------
// Partition phase
// ---------------------------------------------------------------------------

/// Route every record of `input` into `partitioner.partition_count()`
/// temporary relations by the hash of the column at `key`.
fn partition_input(
    access: &Arc<dyn RelationAccess>,
    input: &MaterializedInput,
    key: usize,
    partitioner: &HashPartitioner,
    side: &str,
) -> ExecResult<Vec<Option<TempRelation>>> {
    let partitions = (0..partitioner.partition_count())
        .map(|i| TempRelation::create(access.clone(), input.schema(), &format!("{}-{}-p{}", OPERATOR_ID, side, i)))
        .collect::<ExecResult<Vec<_>>>()?;
    for record in input.records(access)? {
        let record = record?;
        let index = partitioner.partition_for_hash(hash_value(key_at(&record, key)?));
        partitions[index].append(record.into_values())?;
    }
    Ok(partitions.into_iter().map(Some).collect())
}

// ---------------------------------------------------------------------------
// Iterator state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Build,
    Probe,
    Exhausted,
}

pub(crate) struct GraceHashState {
    left_partitions: Vec<Option<TempRelation>>,
    right_partitions: Vec<Option<TempRelation>>,
    /// Next partition index to build
    partition: usize,
    table: HashMap<u64, Vec<Record>>,
    /// Right partition being probed, kept alive while its stream is open
    probe_source: Option<TempRelation>,
    probe: Option<RecordIter>,
    probe_record: Option<(u64, Record)>,
    /// Next bucket position to check against `probe_record`
    candidate: usize,
    phase: Phase,
}

impl GraceHashState {
    pub(crate) fn new(left: MaterializedInput, right: MaterializedInput, env: &JoinEnv) -> ExecResult<Self> {
        let partitioner = HashPartitioner::new(env.buffer_pages.saturating_sub(1).max(1))?;
        let left_partitions = partition_input(&env.access, &left, env.keys.left, &partitioner, "left")?;
        drop(left);
        let right_partitions = partition_input(&env.access, &right, env.keys.right, &partitioner, "right")?;
        drop(right);

        env.metrics.add(names::PARTITIONS, partitioner.partition_count() as u64);
        env.logger.debug(&format!(
            "partitioned both inputs into {} partitions",
            partitioner.partition_count()
        ));

        Ok(Self {
            left_partitions,
            right_partitions,
            partition: 0,
            table: HashMap::new(),
            probe_source: None,
            probe: None,
            probe_record: None,
            candidate: 0,
            phase: Phase::Build,
        })
    }

    pub(crate) fn advance(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        loop {
            match self.phase {
                Phase::Exhausted => return Ok(None),
                Phase::Build => self.build_next(env)?,
                Phase::Probe => {
                    if let Some(record) = self.probe_step(env)? {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    /// Load the next partition's hash table and open its probe stream
    fn build_next(&mut self, env: &JoinEnv) -> ExecResult<()> {
        let index = self.partition;
        if index >= self.left_partitions.len() {
            self.phase = Phase::Exhausted;
            return Ok(());
        }
        self.partition += 1;

        let left = self.left_partitions[index].take();
        let right = self.right_partitions[index].take();
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(());
        };

        self.table.clear();
        for record in env.access.record_iterator(left.handle())? {
            let record = record?;
            let hash = hash_value(env.left_key(&record)?);
            self.table.entry(hash).or_default().push(record);
        }
        drop(left);

        if self.table.is_empty() {
            return Ok(());
        }
        env.metrics.add(names::HASH_BUCKETS, self.table.len() as u64);
        env.logger.debug(&format!(
            "partition {}: {} buckets built",
            index,
            self.table.len()
        ));

        self.probe = Some(env.access.record_iterator(right.handle())?);
        self.probe_source = Some(right);
        self.probe_record = None;
        self.phase = Phase::Probe;
        Ok(())
    }

    fn probe_step(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        if let Some((hash, right_record)) = &self.probe_record {
            if let Some(bucket) = self.table.get(hash) {
                while let Some(left_record) = bucket.get(self.candidate) {
                    self.candidate += 1;
                    if env.keys_match(left_record, right_record)? {
                        return Ok(Some(left_record.concat(right_record)));
                    }
                }
            }
            self.probe_record = None;
        }

        match self.probe.as_mut().and_then(|probe| probe.next()) {
            Some(record) => {
                let record = record?;
                let hash = hash_value(env.right_key(&record)?);
                self.probe_record = Some((hash, record));
                self.candidate = 0;
            }
            None => {
                self.probe = None;
                self.probe_source = None;
                self.table.clear();
                self.phase = Phase::Build;
            }
        }
        Ok(None)
    }
}
