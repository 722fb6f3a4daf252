//! Session
//!
//! Owns the storage context, join registry, metrics and configuration of one
//! user of the engine. Builds scans, filters and joins over its tables and
//! drains operators into record vectors, timing each run.
//!
//! Temporary relations belong to the iterators that create them; whatever is
//! still alive when the session is dropped goes with its storage.

use crate::categories::execution::{Filter, IndexScan, JoinSpec, PredicateOperator, SequentialScan};
use crate::categories::storage::{RelationHandle, StorageContext};
use crate::core::metrics::{names, Logger, MetricsCollector};
use crate::core::operator::{drain, ExecError, ExecResult, ExecutionContext, Operator};
use crate::core::record::{Record, RecordId, Schema, Value};
use crate::core::registry::{JoinStrategy, OperatorRegistry};

use super::config::EngineConfig;
use super::timer::Timer;

pub struct Session {
    config: EngineConfig,
    storage: StorageContext,
    registry: OperatorRegistry,
    context: ExecutionContext,
}

impl Session {
    pub fn new(config: EngineConfig) -> ExecResult<Self> {
        let validation = config.validate();
        if validation.has_errors() {
            return Err(ExecError::Configuration(validation.errors.join("; ")));
        }
        let storage = StorageContext::with_page_size(config.page_size);
        let context = ExecutionContext::new(storage.clone()).with_logger(Logger::new().scoped("session"));
        context.logger.info(&format!(
            "session started: page_size={} buffer_pages={} default_join={}",
            config.page_size, config.buffer_pages, config.default_join
        ));
        Ok(Self {
            config,
            storage,
            registry: OperatorRegistry::with_builtin_joins(),
            context,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageContext {
        &self.storage
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.context.metrics
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    // ── Tables ──────────────────────────────────────────────────────────

    pub fn create_table(&self, name: &str, schema: Schema) -> ExecResult<RelationHandle> {
        self.storage.create_table(name, schema)
    }

    pub fn table(&self, name: &str) -> ExecResult<RelationHandle> {
        self.storage.table(name)
    }

    pub fn insert(&self, table: &RelationHandle, values: Vec<Value>) -> ExecResult<RecordId> {
        self.storage.insert(table, values)
    }

    pub fn delete(&self, table: &RelationHandle, rid: RecordId) -> ExecResult<Record> {
        self.storage.delete(table, rid)
    }

    pub fn create_index(&self, table: &RelationHandle, column: &str) -> ExecResult<()> {
        self.storage.create_index(table, column)
    }

    // ── Operators ───────────────────────────────────────────────────────

    pub fn scan(&self, table: &str) -> ExecResult<Box<dyn Operator>> {
        Ok(Box::new(SequentialScan::new(&self.storage, self.table(table)?)?))
    }

    pub fn index_scan(
        &self,
        table: &str,
        column: &str,
        predicate: Option<(PredicateOperator, Value)>,
    ) -> ExecResult<Box<dyn Operator>> {
        let handle = self.table(table)?;
        Ok(Box::new(IndexScan::new(&self.storage, &self.storage, handle, column, predicate)?))
    }

    pub fn filter(
        &self,
        source: Box<dyn Operator>,
        column: &str,
        op: PredicateOperator,
        value: Value,
    ) -> ExecResult<Box<dyn Operator>> {
        Ok(Box::new(Filter::new(source, column, op, value)?))
    }

    /// Join with the configured buffer budget
    pub fn join(
        &self,
        strategy: JoinStrategy,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_column: &str,
        right_column: &str,
    ) -> ExecResult<Box<dyn Operator>> {
        self.join_with_budget(strategy, left, right, left_column, right_column, self.config.buffer_pages)
    }

    pub fn join_with_budget(
        &self,
        strategy: JoinStrategy,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_column: &str,
        right_column: &str,
        buffer_pages: usize,
    ) -> ExecResult<Box<dyn Operator>> {
        let spec = JoinSpec::new(left, right, left_column, right_column, buffer_pages);
        self.registry.build(strategy, spec)
    }

    /// Join with the configured default strategy and budget
    pub fn default_join(
        &self,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_column: &str,
        right_column: &str,
    ) -> ExecResult<Box<dyn Operator>> {
        self.join(self.config.default_join, left, right, left_column, right_column)
    }

    /// Run `operator` to completion and collect its output
    pub fn execute(&self, operator: &dyn Operator) -> ExecResult<Vec<Record>> {
        let timer = Timer::now();
        let records = drain(operator.iter(&self.context)?)?;
        let elapsed = timer.elapsed_ms();
        self.context.metrics.record(names::EXECUTION_MS, elapsed);
        self.context.logger.info(&format!(
            "{} produced {} records in {:.3} ms",
            operator.metadata().id,
            records.len(),
            elapsed
        ));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Field;

    fn session() -> Session {
        Session::new(EngineConfig {
            page_size: 256,
            buffer_pages: 4,
            ..Default::default()
        })
        .unwrap()
    }

    fn people(session: &Session) -> RelationHandle {
        let table = session
            .create_table("people", Schema::new(vec![Field::int("id"), Field::int("dept")]))
            .unwrap();
        for (id, dept) in [(1, 10), (2, 20), (3, 10)] {
            session.insert(&table, vec![Value::Int(id), Value::Int(dept)]).unwrap();
        }
        table
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Session::new(EngineConfig {
            page_size: 1,
            ..Default::default()
        });
        assert!(matches!(result, Err(ExecError::Configuration(_))));
    }

    #[test]
    fn test_scan_and_filter() {
        let session = session();
        people(&session);
        let scan = session.scan("people").unwrap();
        let filter = session
            .filter(scan, "dept", PredicateOperator::Equals, Value::Int(10))
            .unwrap();
        let out = session.execute(filter.as_ref()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(session.metrics().samples(names::EXECUTION_MS).len(), 1);
    }

    #[test]
    fn test_default_join_uses_config() {
        let session = session();
        people(&session);
        let join = session
            .default_join(session.scan("people").unwrap(), session.scan("people").unwrap(), "dept", "dept")
            .unwrap();
        assert_eq!(join.metadata().id, "block_nested_loop_join");
        let out = session.execute(join.as_ref()).unwrap();
        // dept 10 twice on each side, dept 20 once
        assert_eq!(out.len(), 5);
        assert_eq!(join.output_schema().len(), 4);
    }

    #[test]
    fn test_index_scan_needs_index() {
        let session = session();
        let table = people(&session);
        assert!(session.index_scan("people", "dept", None).is_err());
        session.create_index(&table, "dept").unwrap();
        let scan = session
            .index_scan("people", "dept", Some((PredicateOperator::LessThan, Value::Int(20))))
            .unwrap();
        assert_eq!(session.execute(scan.as_ref()).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_visible_to_scans() {
        let session = session();
        let table = people(&session);
        let rid = session.insert(&table, vec![Value::Int(4), Value::Int(30)]).unwrap();
        session.delete(&table, rid).unwrap();
        let out = session.execute(session.scan("people").unwrap().as_ref()).unwrap();
        assert_eq!(out.len(), 3);
    }
}
