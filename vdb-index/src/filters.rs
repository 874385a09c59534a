//! Caller-supplied retrieval filters and the parameterized SQL fragments
//! they compose into. Every caller value travels as a numbered bind; nothing
//! is interpolated into the query text.

use bigdecimal::BigDecimal;
use diesel::{
    pg::Pg,
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_types::{Array, Integer, Numeric, Text, VarChar},
};

/// One bind parameter for a dynamically assembled query.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    TextArray(Vec<String>),
    Int(i32),
    BlockNumber(u64),
    Bytes(Vec<u8>),
}

/// Incrementally builds a `sql_query` string with `$n` placeholders and the
/// bind list that backs them.
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    sql: String,
    binds: Vec<Bind>,
}

impl QueryBuilder {
    pub fn new(base: &str) -> Self {
        Self {
            sql: base.to_string(),
            binds: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Appends a bind and writes its `$n` placeholder.
    pub fn push_bind(&mut self, bind: Bind) {
        self.binds.push(bind);
        self.sql.push_str(&format!("${}", self.binds.len()));
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    /// Materializes the boxed diesel query with every bind attached.
    pub fn build(self) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let query = diesel::sql_query(self.sql).into_boxed();
        self.binds.into_iter().fold(query, |query, bind| match bind {
            Bind::Text(v) => query.bind::<Text, _>(v),
            Bind::TextArray(v) => query.bind::<Array<VarChar>, _>(v),
            Bind::Int(v) => query.bind::<Integer, _>(v),
            Bind::BlockNumber(v) => query.bind::<Numeric, _>(BigDecimal::from(v)),
            Bind::Bytes(v) => query.bind::<diesel::sql_types::Bytea, _>(v),
        })
    }
}

/// Transaction selection: optional source and destination address lists.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    pub off: bool,
    pub src: Vec<String>,
    pub dst: Vec<String>,
}

/// Receipt/log selection. Topic position `i` matches when the log's
/// `topic_i` is in `topics[i]`; an empty inner list matches anything.
#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    pub off: bool,
    pub log_addresses: Vec<String>,
    pub topics: [Vec<String>; 4],
    pub match_txs: bool,
}

impl ReceiptFilter {
    pub fn has_topics(&self) -> bool {
        self.topics.iter().any(|set| !set.is_empty())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.log_addresses.is_empty() && !self.has_topics() && !self.match_txs
    }
}

/// State node selection for a header: optional address list (hashed into
/// leaf keys by the store) and whether intermediate nodes are wanted.
#[derive(Debug, Clone, Default)]
pub struct StateFilter {
    pub off: bool,
    pub addresses: Vec<String>,
    pub intermediate_nodes: bool,
}

/// Storage node selection: as [`StateFilter`] plus an optional storage leaf
/// key list.
#[derive(Debug, Clone, Default)]
pub struct StorageFilter {
    pub off: bool,
    pub addresses: Vec<String>,
    pub storage_keys: Vec<String>,
    pub intermediate_nodes: bool,
}

/// Appends ` [AND] eth.log_cids.topicN = ANY($n)` for each restricted topic
/// position. `first` suppresses the leading AND for the first emitted
/// condition.
pub fn topic_filter_condition(query: &mut QueryBuilder, topics: &[Vec<String>; 4], first: bool) {
    let mut first = first;
    for (position, topic_set) in topics.iter().enumerate() {
        if topic_set.is_empty() {
            continue;
        }
        if !first {
            query.push(" AND");
        } else {
            first = false;
        }
        query.push(&format!(" eth.log_cids.topic{position} = ANY ("));
        query.push_bind(Bind::TextArray(topic_set.clone()));
        query.push(")");
    }
}

/// Log-row conditions: address restriction and topic restrictions compose
/// conjunctively.
pub fn log_filter_condition(query: &mut QueryBuilder, filter: &ReceiptFilter) {
    if !filter.log_addresses.is_empty() {
        query.push(" AND eth.log_cids.address = ANY (");
        query.push_bind(Bind::TextArray(filter.log_addresses.clone()));
        query.push(")");
    }
    if filter.has_topics() {
        topic_filter_condition(query, &filter.topics, false);
    }
}

/// Receipt-row conditions: OR composition of "has a log matching the
/// address+topic restrictions" with "is the receipt of a watched
/// transaction". With no restrictions at all, every receipt of the header
/// passes and no condition is emitted.
pub fn receipt_filter_conditions(
    query: &mut QueryBuilder,
    filter: &ReceiptFilter,
    tx_hashes: &[String],
) {
    let match_txs = filter.match_txs && !tx_hashes.is_empty();
    let log_sub = " AND (receipt_cids.tx_id = ANY (SELECT rct_id FROM eth.log_cids WHERE";

    if !filter.log_addresses.is_empty() {
        query.push(log_sub);
        query.push(" eth.log_cids.address = ANY (");
        query.push_bind(Bind::TextArray(filter.log_addresses.clone()));
        query.push(")");
        if filter.has_topics() {
            topic_filter_condition(query, &filter.topics, false);
        }
        query.push(")");
        if match_txs {
            query.push(" OR receipt_cids.tx_id = ANY(");
            query.push_bind(Bind::TextArray(tx_hashes.to_vec()));
            query.push(")");
        }
        query.push(")");
    } else if filter.has_topics() {
        query.push(log_sub);
        topic_filter_condition(query, &filter.topics, true);
        query.push(")");
        if match_txs {
            query.push(" OR receipt_cids.tx_id = ANY(");
            query.push_bind(Bind::TextArray(tx_hashes.to_vec()));
            query.push(")");
        }
        query.push(")");
    } else if match_txs {
        query.push(" AND receipt_cids.tx_id = ANY(");
        query.push_bind(Bind::TextArray(tx_hashes.to_vec()));
        query.push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(t0: &[&str], t1: &[&str]) -> [Vec<String>; 4] {
        [
            t0.iter().map(|s| s.to_string()).collect(),
            t1.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            Vec::new(),
        ]
    }

    #[test]
    fn placeholders_number_in_bind_order() {
        let mut query = QueryBuilder::new("SELECT 1 WHERE a = ");
        query.push_bind(Bind::Text("x".into()));
        query.push(" AND b = ");
        query.push_bind(Bind::Int(7));
        assert_eq!(query.sql(), "SELECT 1 WHERE a = $1 AND b = $2");
        assert_eq!(query.binds().len(), 2);
    }

    #[test]
    fn topic_matrix_restricts_each_given_position() {
        let mut query = QueryBuilder::new("");
        topic_filter_condition(&mut query, &topics(&["0xa", "0xb"], &["0xc"]), true);
        assert_eq!(
            query.sql(),
            " eth.log_cids.topic0 = ANY ($1) AND eth.log_cids.topic1 = ANY ($2)"
        );
        assert_eq!(
            query.binds(),
            &[
                Bind::TextArray(vec!["0xa".into(), "0xb".into()]),
                Bind::TextArray(vec!["0xc".into()]),
            ]
        );
    }

    #[test]
    fn empty_topic_position_matches_anything() {
        let mut query = QueryBuilder::new("");
        let t = [Vec::new(), vec!["0xc".to_string()], Vec::new(), Vec::new()];
        topic_filter_condition(&mut query, &t, true);
        assert_eq!(query.sql(), " eth.log_cids.topic1 = ANY ($1)");
    }

    #[test]
    fn address_and_topics_restrict_jointly() {
        let mut query = QueryBuilder::new("");
        let filter = ReceiptFilter {
            log_addresses: vec!["0xdead".into()],
            topics: topics(&["0xa"], &[]),
            ..Default::default()
        };
        log_filter_condition(&mut query, &filter);
        assert_eq!(
            query.sql(),
            " AND eth.log_cids.address = ANY ($1) AND eth.log_cids.topic0 = ANY ($2)"
        );
    }

    #[test]
    fn receipt_conditions_compose_logs_or_watched_txs() {
        let mut query = QueryBuilder::new("");
        let filter = ReceiptFilter {
            log_addresses: vec!["0xdead".into()],
            topics: topics(&[], &[]),
            match_txs: true,
            ..Default::default()
        };
        receipt_filter_conditions(&mut query, &filter, &["0xtx1".to_string()]);
        let sql = query.sql();
        assert!(sql.contains("SELECT rct_id FROM eth.log_cids"));
        assert!(sql.contains("OR receipt_cids.tx_id = ANY($2)"));
        assert_eq!(query.binds().len(), 2);
    }

    #[test]
    fn topics_only_receipt_conditions_use_log_subquery() {
        let mut query = QueryBuilder::new("");
        let filter = ReceiptFilter {
            topics: topics(&["0xa"], &[]),
            ..Default::default()
        };
        receipt_filter_conditions(&mut query, &filter, &[]);
        assert_eq!(
            query.sql(),
            " AND (receipt_cids.tx_id = ANY (SELECT rct_id FROM eth.log_cids WHERE \
             eth.log_cids.topic0 = ANY ($1)))"
        );
    }

    #[test]
    fn unrestricted_receipt_filter_emits_no_condition() {
        let mut query = QueryBuilder::new("BASE");
        receipt_filter_conditions(&mut query, &ReceiptFilter::default(), &[]);
        assert_eq!(query.sql(), "BASE");
        assert!(query.binds().is_empty());
    }

    #[test]
    fn match_txs_without_hashes_emits_no_condition() {
        let mut query = QueryBuilder::new("BASE");
        let filter = ReceiptFilter {
            match_txs: true,
            ..Default::default()
        };
        receipt_filter_conditions(&mut query, &filter, &[]);
        assert_eq!(query.sql(), "BASE");
    }
}
