//! The rigid index schema written by the external chain indexer. Read-only
//! from this side.

diesel::table! {
    eth.header_cids (block_hash, block_number) {
        cid -> Text,
        mh_key -> Text,
        block_number -> Numeric,
        block_hash -> Varchar,
        parent_hash -> Varchar,
        state_root -> Varchar,
        tx_root -> Varchar,
        receipt_root -> Varchar,
        uncle_root -> Varchar,
        td -> Numeric,
        bloom -> Bytea,
        timestamp -> Int8,
        times_validated -> Int4,
        coinbase -> Varchar,
    }
}

diesel::table! {
    eth.uncle_cids (block_hash) {
        cid -> Text,
        mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        block_hash -> Varchar,
        parent_hash -> Varchar,
        index -> Int4,
        reward -> Numeric,
    }
}

diesel::table! {
    eth.transaction_cids (tx_hash, block_number) {
        cid -> Text,
        mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        index -> Int4,
        tx_hash -> Varchar,
        src -> Varchar,
        dst -> Varchar,
        tx_data -> Bytea,
        tx_type -> Int4,
        value -> Numeric,
    }
}

diesel::table! {
    eth.receipt_cids (tx_id, block_number) {
        leaf_cid -> Text,
        leaf_mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        tx_id -> Varchar,
        contract -> Nullable<Varchar>,
        contract_hash -> Nullable<Varchar>,
        post_status -> Int4,
    }
}

diesel::table! {
    eth.log_cids (rct_id, index, block_number) {
        leaf_cid -> Text,
        leaf_mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        rct_id -> Varchar,
        index -> Int4,
        address -> Varchar,
        topic0 -> Nullable<Varchar>,
        topic1 -> Nullable<Varchar>,
        topic2 -> Nullable<Varchar>,
        topic3 -> Nullable<Varchar>,
        log_data -> Bytea,
    }
}

diesel::table! {
    eth.state_cids (header_id, state_path, block_number) {
        cid -> Text,
        mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        state_path -> Bytea,
        state_leaf_key -> Nullable<Varchar>,
        node_type -> Int4,
    }
}

diesel::table! {
    eth.storage_cids (header_id, state_path, storage_path, block_number) {
        cid -> Text,
        mh_key -> Text,
        header_id -> Varchar,
        block_number -> Numeric,
        state_path -> Bytea,
        storage_path -> Bytea,
        storage_leaf_key -> Nullable<Varchar>,
        node_type -> Int4,
    }
}

diesel::table! {
    public.blocks (key, block_number) {
        key -> Text,
        block_number -> Numeric,
        data -> Bytea,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    header_cids,
    uncle_cids,
    transaction_cids,
    receipt_cids,
    log_cids,
    state_cids,
    storage_cids,
    blocks,
);

diesel::define_sql_function! {
    /// Index-side canonical selection helper: the block hash winning by
    /// maximum total difficulty at a height, or null when the height is
    /// unindexed.
    fn canonical_header_hash(block_number: diesel::sql_types::Numeric)
        -> diesel::sql_types::Nullable<diesel::sql_types::Varchar>;
}
