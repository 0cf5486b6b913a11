pub use crate::{
    codec::{
        decode_request, decode_response_chunk, encode_request, encode_response_chunk,
        request_protocol_id, ResponseChunk, ResponseCode,
    },
    error::Error,
    gossip::{legacy_message_id, message_id, GossipOutcome, GossipValidators, TopicKind},
    peer_pool::{
        ConnectionState, GoodbyeReason, Peer, PeerAction, PeerDirection, PeerId, PeerPool,
        PeerPoolConfig,
    },
    sync_manager::{SyncBatch, SyncDirection, SyncManager, SLOTS_PER_REQUEST},
};

mod codec;
mod error;
mod gossip;
mod peer_pool;
mod sync_manager;
