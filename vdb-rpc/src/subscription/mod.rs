pub mod backfill;
pub mod params;
pub mod payload;
pub mod service;

pub use backfill::{BackfillSource, IndexBackfill};
pub use params::{
    HeaderFilterSpec, ReceiptFilterSpec, StateFilterSpec, StorageFilterSpec, SubscriptionParams,
    TxFilterSpec,
};
pub use payload::{
    ConvertedPayload, IpldsResponse, SubscriptionPayload, BACK_FILL_COMPLETE_FLAG, EMPTY_FLAG,
};
pub use service::{payload_channel, Subscription, SubscriptionService, PAYLOAD_CHAN_BUFFER_SIZE};
