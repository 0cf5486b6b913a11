use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    time::Duration,
};
use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use itertools::Itertools as _;
use log::debug;

/// An opaque peer identity assigned by the transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl Display for PeerId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", hex::encode(&self.0[..8]))
    }
}

impl Debug for PeerId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "PeerId({self})")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeerDirection {
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectionState {
    None,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// On-wire goodbye codes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GoodbyeReason {
    ClientShutdown,
    IrrelevantNetwork,
    Fault,
    LowScore,
}

impl GoodbyeReason {
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::ClientShutdown => 1,
            Self::IrrelevantNetwork => 2,
            Self::Fault => 3,
            Self::LowScore => 237,
        }
    }

    #[must_use]
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::ClientShutdown),
            2 => Some(Self::IrrelevantNetwork),
            3 => Some(Self::Fault),
            237 => Some(Self::LowScore),
            _ => None,
        }
    }

    /// How long a departed peer stays unredialable.
    #[must_use]
    pub const fn ban_duration(self) -> Duration {
        match self {
            Self::ClientShutdown | Self::Fault => Duration::from_secs(10 * 60),
            Self::IrrelevantNetwork => Duration::from_secs(24 * 60 * 60),
            Self::LowScore => Duration::from_secs(60 * 60),
        }
    }
}

/// Score adjustments for observed behavior.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeerAction {
    InvalidRequest,
    FailedDecode,
    ProtocolViolation,
    InvalidConsensusObject,
    UsefulResponse,
}

impl PeerAction {
    const fn score_delta(self) -> i64 {
        match self {
            Self::InvalidRequest => -10,
            Self::FailedDecode => -15,
            Self::ProtocolViolation => -25,
            Self::InvalidConsensusObject => -20,
            Self::UsefulResponse => 2,
        }
    }
}

const BASELINE_SCORE: i64 = 10;
const MAX_SCORE: i64 = 100;
const SCORE_FLOOR: i64 = -20;

const THROUGHPUT_SMOOTHING: f64 = 0.1;
const REQUEST_QUOTA_PER_SECOND: f64 = 8.0;
const REQUEST_QUOTA_BURST: f64 = 64.0;

pub struct Peer {
    pub id: PeerId,
    pub direction: PeerDirection,
    pub score: i64,
    /// Exponentially smoothed response throughput in bytes per second.
    pub throughput_avg: f64,
    pub connection_state: ConnectionState,
    pub request_quota: f64,
    pub last_request_time: Option<Instant>,
    /// Attestation subnet subscriptions from the peer's metadata.
    pub attnets: u64,
    /// Sync committee subnet subscriptions from the peer's metadata.
    pub syncnets: u8,
    metadata_refreshed_at: Option<Instant>,
    metadata_failures: u32,
}

impl Peer {
    fn new(id: PeerId, direction: PeerDirection) -> Self {
        Self {
            id,
            direction,
            score: BASELINE_SCORE,
            throughput_avg: 0.0,
            connection_state: ConnectionState::Connecting,
            request_quota: REQUEST_QUOTA_BURST,
            last_request_time: None,
            attnets: 0,
            syncnets: 0,
            metadata_refreshed_at: None,
            metadata_failures: 0,
        }
    }
}

pub struct PeerPoolConfig {
    pub target_peers: usize,
    /// The trimmer kicks peers above this. Defaults to 1.5 times the
    /// target.
    pub hard_max_peers: usize,
    pub dial_timeout: Duration,
    pub max_concurrent_dials: usize,
    pub metadata_refresh_interval: Duration,
    pub max_metadata_failures: u32,
}

impl PeerPoolConfig {
    #[must_use]
    pub fn with_target_peers(target_peers: usize) -> Self {
        Self {
            target_peers,
            hard_max_peers: target_peers + target_peers / 2,
            dial_timeout: Duration::from_secs(60),
            max_concurrent_dials: 16,
            metadata_refresh_interval: Duration::from_secs(30 * 60),
            max_metadata_failures: 3,
        }
    }

    /// Local testnets dial loopback addresses; failures surface quickly.
    #[must_use]
    pub fn local_testnet(target_peers: usize) -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            ..Self::with_target_peers(target_peers)
        }
    }
}

/// Tracks peers, their scores, and their connection lifecycle.
pub struct PeerPool {
    config: PeerPoolConfig,
    peers: HashMap<PeerId, Peer>,
    /// Recently departed peers with a per-reason expiry. In-memory only;
    /// entries do not survive a restart.
    seen: HashMap<PeerId, SeenEntry>,
    dial_queue: VecDeque<PeerId>,
    active_dials: usize,
}

struct SeenEntry {
    reason: GoodbyeReason,
    until: Instant,
}

impl PeerPool {
    #[must_use]
    pub fn new(config: PeerPoolConfig) -> Self {
        Self {
            config,
            peers: HashMap::new(),
            seen: HashMap::new(),
            dial_queue: VecDeque::new(),
            active_dials: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PeerPoolConfig {
        &self.config
    }

    #[must_use]
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|peer| peer.connection_state == ConnectionState::Connected)
            .count()
    }

    #[must_use]
    pub fn is_banned(&self, id: PeerId, now: Instant) -> bool {
        self.seen
            .get(&id)
            .is_some_and(|entry| entry.until > now)
    }

    // Connection lifecycle

    /// Queues an address for the dial workers. Banned and already-known
    /// peers are dropped here so the workers never waste a slot on them.
    pub fn enqueue_dial(&mut self, id: PeerId, now: Instant) {
        if self.is_banned(id, now)
            || self.peers.contains_key(&id)
            || self.dial_queue.contains(&id)
        {
            return;
        }

        self.dial_queue.push_back(id);
    }

    /// Hands out the next address once a dial worker is free.
    pub fn next_dial(&mut self) -> Option<PeerId> {
        if self.active_dials >= self.config.max_concurrent_dials {
            return None;
        }

        let id = self.dial_queue.pop_front()?;
        self.active_dials += 1;

        self.peers.insert(id, Peer::new(id, PeerDirection::Outbound));

        Some(id)
    }

    pub fn on_dial_result(&mut self, id: PeerId, connected: bool) {
        self.active_dials = self.active_dials.saturating_sub(1);

        match self.peers.get_mut(&id) {
            Some(peer) if connected => peer.connection_state = ConnectionState::Connected,
            _ => {
                self.peers.remove(&id);
            }
        }
    }

    /// Returns whether the connection is acceptable; banned peers are not.
    pub fn on_inbound_connection(&mut self, id: PeerId, now: Instant) -> bool {
        if self.is_banned(id, now) {
            return false;
        }

        let peer = self
            .peers
            .entry(id)
            .or_insert_with(|| Peer::new(id, PeerDirection::Inbound));
        peer.connection_state = ConnectionState::Connected;

        true
    }

    pub fn on_disconnected(&mut self, id: PeerId, reason: Option<GoodbyeReason>, now: Instant) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.connection_state = ConnectionState::Disconnected;
        }

        self.peers.remove(&id);

        if let Some(reason) = reason {
            self.seen.insert(
                id,
                SeenEntry {
                    reason,
                    until: now + reason.ban_duration(),
                },
            );
        }
    }

    #[must_use]
    pub fn ban_reason(&self, id: PeerId) -> Option<GoodbyeReason> {
        self.seen.get(&id).map(|entry| entry.reason)
    }

    // Scoring

    /// Adjusts a peer's score. Returns the goodbye reason when the peer
    /// dropped below the floor and should be disconnected.
    pub fn report_peer(&mut self, id: PeerId, action: PeerAction) -> Option<GoodbyeReason> {
        let peer = self.peers.get_mut(&id)?;

        peer.score = (peer.score + action.score_delta()).min(MAX_SCORE);

        if peer.score < SCORE_FLOOR && peer.connection_state == ConnectionState::Connected {
            debug!("peer {id} dropped below the score floor ({})", peer.score);
            peer.connection_state = ConnectionState::Disconnecting;
            return Some(GoodbyeReason::LowScore);
        }

        None
    }

    /// Records a served request for quota and throughput accounting.
    /// Returns whether the peer is within its request quota.
    pub fn record_request(&mut self, id: PeerId, response_bytes: u64, now: Instant) -> bool {
        let Some(peer) = self.peers.get_mut(&id) else {
            return false;
        };

        if let Some(last) = peer.last_request_time {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();

            peer.request_quota = (peer.request_quota
                + elapsed * REQUEST_QUOTA_PER_SECOND)
                .min(REQUEST_QUOTA_BURST);

            if elapsed > 0.0 {
                let instantaneous = response_bytes as f64 / elapsed;
                peer.throughput_avg = peer.throughput_avg * (1.0 - THROUGHPUT_SMOOTHING)
                    + instantaneous * THROUGHPUT_SMOOTHING;
            }
        }

        peer.last_request_time = Some(now);

        if peer.request_quota < 1.0 {
            return false;
        }

        peer.request_quota -= 1.0;
        true
    }

    // Trimming

    /// Peers to kick to get back under the hard maximum.
    ///
    /// Lowest scores go first, but peers covering subnets few others cover
    /// are retained over better-scored peers with redundant coverage.
    #[must_use]
    pub fn peers_to_trim(&self) -> Vec<PeerId> {
        let connected = self
            .peers
            .values()
            .filter(|peer| peer.connection_state == ConnectionState::Connected)
            .collect::<Vec<_>>();

        let excess = connected.len().saturating_sub(self.config.hard_max_peers);

        if excess == 0 {
            return vec![];
        }

        let subnet_coverage = (0_u32..64)
            .map(|subnet| {
                connected
                    .iter()
                    .filter(|peer| peer.attnets >> subnet & 1 == 1)
                    .count()
            })
            .collect::<Vec<_>>();

        // A peer is load-bearing if it is among the few covering some
        // subnet.
        let rarity = |peer: &Peer| {
            (0..64)
                .filter(|subnet| peer.attnets >> subnet & 1 == 1)
                .map(|subnet| subnet_coverage[subnet as usize])
                .min()
                .unwrap_or(usize::MAX)
        };

        connected
            .into_iter()
            .sorted_by_key(|peer| (core::cmp::Reverse(rarity(peer)), peer.score))
            .take(excess)
            .map(|peer| peer.id)
            .collect()
    }

    // Metadata

    /// Peers whose attnets/syncnets bitfields are due for a refresh.
    #[must_use]
    pub fn peers_needing_metadata_refresh(&self, now: Instant) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|peer| peer.connection_state == ConnectionState::Connected)
            .filter(|peer| match peer.metadata_refreshed_at {
                Some(refreshed_at) => {
                    now.saturating_duration_since(refreshed_at)
                        >= self.config.metadata_refresh_interval
                }
                None => true,
            })
            .map(|peer| peer.id)
            .collect()
    }

    /// Returns the goodbye reason when repeated failures exhaust the
    /// allowance.
    pub fn on_metadata_response(
        &mut self,
        id: PeerId,
        response: Option<(u64, u8)>,
        now: Instant,
    ) -> Option<GoodbyeReason> {
        let peer = self.peers.get_mut(&id)?;

        match response {
            Some((attnets, syncnets)) => {
                peer.attnets = attnets;
                peer.syncnets = syncnets;
                peer.metadata_refreshed_at = Some(now);
                peer.metadata_failures = 0;
                None
            }
            None => {
                peer.metadata_failures += 1;

                if peer.metadata_failures >= self.config.max_metadata_failures {
                    peer.connection_state = ConnectionState::Disconnecting;
                    Some(GoodbyeReason::Fault)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_id(byte: u8) -> PeerId {
        PeerId([byte; 32])
    }

    fn pool_with_connected_peers(config: PeerPoolConfig, count: u8) -> (PeerPool, Instant) {
        let mut pool = PeerPool::new(config);
        let now = Instant::now();

        for byte in 1..=count {
            assert!(pool.on_inbound_connection(peer_id(byte), now));
        }

        (pool, now)
    }

    #[test]
    fn new_peers_start_at_the_positive_baseline() {
        let (pool, _) = pool_with_connected_peers(PeerPoolConfig::with_target_peers(8), 1);

        assert_eq!(
            pool.peer(peer_id(1)).map(|peer| peer.score),
            Some(BASELINE_SCORE),
        );
    }

    #[test]
    fn scores_are_capped() {
        let (mut pool, _) = pool_with_connected_peers(PeerPoolConfig::with_target_peers(8), 1);

        for _ in 0..100 {
            pool.report_peer(peer_id(1), PeerAction::UsefulResponse);
        }

        assert_eq!(pool.peer(peer_id(1)).map(|peer| peer.score), Some(MAX_SCORE));
    }

    #[test]
    fn dropping_below_the_floor_disconnects_and_bans() {
        let (mut pool, now) =
            pool_with_connected_peers(PeerPoolConfig::with_target_peers(8), 1);

        let mut goodbye = None;

        for _ in 0..3 {
            goodbye = goodbye.or(pool.report_peer(peer_id(1), PeerAction::ProtocolViolation));
        }

        assert_eq!(goodbye, Some(GoodbyeReason::LowScore));

        pool.on_disconnected(peer_id(1), goodbye, now);

        assert!(pool.is_banned(peer_id(1), now));
        assert!(!pool.is_banned(peer_id(1), now + Duration::from_secs(60 * 60)));
        assert!(!pool.on_inbound_connection(peer_id(1), now));
    }

    #[test]
    fn ban_durations_depend_on_the_reason() {
        assert_eq!(
            GoodbyeReason::ClientShutdown.ban_duration(),
            Duration::from_secs(600),
        );
        assert_eq!(
            GoodbyeReason::Fault.ban_duration(),
            Duration::from_secs(600),
        );
        assert_eq!(
            GoodbyeReason::IrrelevantNetwork.ban_duration(),
            Duration::from_secs(86_400),
        );
        assert_eq!(
            GoodbyeReason::LowScore.ban_duration(),
            Duration::from_secs(3600),
        );
    }

    #[test]
    fn goodbye_codes_match_the_wire_values() {
        for reason in [
            GoodbyeReason::ClientShutdown,
            GoodbyeReason::IrrelevantNetwork,
            GoodbyeReason::Fault,
            GoodbyeReason::LowScore,
        ] {
            assert_eq!(GoodbyeReason::from_wire(reason.to_wire()), Some(reason));
        }

        assert_eq!(GoodbyeReason::ClientShutdown.to_wire(), 1);
        assert_eq!(GoodbyeReason::IrrelevantNetwork.to_wire(), 2);
        assert_eq!(GoodbyeReason::Fault.to_wire(), 3);
        assert_eq!(GoodbyeReason::LowScore.to_wire(), 237);
        assert_eq!(GoodbyeReason::from_wire(99), None);
    }

    #[test]
    fn the_trimmer_prefers_peers_covering_rare_subnets() {
        let config = PeerPoolConfig {
            hard_max_peers: 2,
            ..PeerPoolConfig::with_target_peers(2)
        };

        let (mut pool, now) = pool_with_connected_peers(config, 3);

        // Peer 1 is the only one covering subnet 0, but has the worst
        // score. Peers 2 and 3 cover subnet 1 redundantly.
        pool.on_metadata_response(peer_id(1), Some((0b01, 0)), now);
        pool.on_metadata_response(peer_id(2), Some((0b10, 0)), now);
        pool.on_metadata_response(peer_id(3), Some((0b10, 0)), now);

        pool.report_peer(peer_id(1), PeerAction::InvalidRequest);

        let trimmed = pool.peers_to_trim();

        assert_eq!(trimmed.len(), 1);
        assert_ne!(trimmed[0], peer_id(1));
    }

    #[test]
    fn repeated_metadata_failures_disconnect() {
        let (mut pool, now) =
            pool_with_connected_peers(PeerPoolConfig::with_target_peers(8), 1);

        assert_eq!(pool.on_metadata_response(peer_id(1), None, now), None);
        assert_eq!(pool.on_metadata_response(peer_id(1), None, now), None);
        assert_eq!(
            pool.on_metadata_response(peer_id(1), None, now),
            Some(GoodbyeReason::Fault),
        );
    }

    #[test]
    fn dial_workers_are_bounded() {
        let config = PeerPoolConfig {
            max_concurrent_dials: 2,
            ..PeerPoolConfig::with_target_peers(8)
        };

        let mut pool = PeerPool::new(config);
        let now = Instant::now();

        for byte in 1..=3 {
            pool.enqueue_dial(peer_id(byte), now);
        }

        assert!(pool.next_dial().is_some());
        assert!(pool.next_dial().is_some());
        assert!(pool.next_dial().is_none());

        pool.on_dial_result(peer_id(1), true);

        assert!(pool.next_dial().is_some());
    }

    #[test]
    fn request_quota_is_enforced() {
        let (mut pool, now) =
            pool_with_connected_peers(PeerPoolConfig::with_target_peers(8), 1);

        for _ in 0..64 {
            assert!(pool.record_request(peer_id(1), 100, now));
        }

        assert!(!pool.record_request(peer_id(1), 100, now));

        let later = now + Duration::from_secs(1);
        assert!(pool.record_request(peer_id(1), 100, later));
    }
}
