//! UDP Ingress (§4.4, C4): packet normalization, per-source authentication
//! cache, and backpressure ahead of the Processor.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AuthError, CollectorError};
use crate::parser;
use crate::processor::Processor;
use crate::store::{ServerId, Store};
use crate::util::rate_limit::SourceRateLimiter;

const MAX_DATAGRAM_SIZE: usize = 8192;
const PARTITION_CHANNEL_CAPACITY: usize = 1024;

struct SourceLine {
    server_id: ServerId,
    game: String,
    line: String,
}

/// Owns the AuthCache exclusively (§9) and the UDP socket's lifecycle.
pub struct Ingress {
    socket: Arc<UdpSocket>,
    store: Arc<dyn Store>,
    auth_cache: Arc<DashMap<(IpAddr, u16), (ServerId, String)>>,
    rate_limiters: Arc<DashMap<(IpAddr, u16), SourceRateLimiter>>,
    partitions: Vec<mpsc::Sender<SourceLine>>,
    skip_auth: bool,
    grace_period: Duration,
}

impl Ingress {
    pub async fn bind(
        port: u16,
        store: Arc<dyn Store>,
        processor: Arc<Processor>,
        skip_auth: bool,
        grace_period: Duration,
        worker_count: usize,
    ) -> Result<(Self, Vec<JoinHandle<()>>), CollectorError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| CollectorError::Handler(format!("failed to bind UDP ingress: {e}")))?;

        info!(port, "ingress bound");

        let mut partitions = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for partition_id in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<SourceLine>(PARTITION_CHANNEL_CAPACITY);
            let processor = processor.clone();
            let handle = tokio::spawn(async move {
                while let Some(item) = rx.recv().await {
                    match parser::parse(&item.line, item.server_id) {
                        Ok(event) => {
                            if let Err(err) = processor.process_event(event, &item.game).await {
                                warn!(partition_id, %err, "handler error, dropping datagram");
                            }
                        }
                        Err(err) => {
                            debug!(partition_id, %err, line = %truncate(&item.line), "parse error, dropping datagram");
                        }
                    }
                }
            });
            partitions.push(tx);
            workers.push(handle);
        }

        Ok((
            Self {
                socket: Arc::new(socket),
                store,
                auth_cache: Arc::new(DashMap::new()),
                rate_limiters: Arc::new(DashMap::new()),
                partitions,
                skip_auth,
                grace_period,
            },
            workers,
        ))
    }

    fn partition_for(&self, ip: IpAddr, port: u16) -> usize {
        if self.partitions.len() <= 1 {
            return 0;
        }
        // Stable per-source hash so one (ip, port) always lands on the same
        // worker, preserving arrival order within a source (§5).
        let hash: u64 = match ip {
            IpAddr::V4(v4) => u32::from(v4) as u64,
            IpAddr::V6(v6) => u128::from(v6) as u64,
        };
        let hash = hash.wrapping_mul(31).wrapping_add(port as u64);
        (hash as usize) % self.partitions.len()
    }

    /// Runs the read loop until `shutdown` resolves, then drains workers with
    /// a bounded grace period (§4.4 Shutdown).
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("ingress received shutdown signal");
                    break;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                        Err(err) => {
                            warn!(%err, "UDP read error");
                        }
                    }
                }
            }
        }
        self.auth_cache.clear();
    }

    async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) {
        let Some(normalized) = parser::normalize(payload) else {
            debug!(%peer, "datagram dropped: not parseable after normalization");
            return;
        };
        let line = normalized.to_string();
        let key = (peer.ip(), peer.port());

        if let Some(entry) = self.auth_cache.get(&key) {
            let (server_id, game) = entry.value().clone();
            drop(entry);
            self.forward(key, server_id, game, line).await;
            return;
        }

        self.authenticate_and_forward(key, line).await;
    }

    async fn authenticate_and_forward(&self, key: (IpAddr, u16), line: String) {
        let (ip, port) = key;

        if self.skip_auth {
            match self.store.auto_register_dev_server(ip, port).await {
                Ok(server_id) => {
                    let game = "valve".to_string();
                    self.auth_cache.insert(key, (server_id, game.clone()));
                    self.forward(key, server_id, game, line).await;
                }
                Err(err) => warn!(%err, %ip, port, "auto-register failed"),
            }
            return;
        }

        match self.store.get_server_by_address(ip, port).await {
            Ok(Some((server_id, game))) => {
                self.auth_cache.insert(key, (server_id, game));
                // §4.4 step 3: per legacy behavior the first line from a
                // newly-authorized source is dropped.
                debug!(%ip, port, server_id, "source authorized; dropping first line");
            }
            Ok(None) => {
                let err = AuthError::UnknownSender { ip, port };
                warn!(%err, "unauthenticated source rejected");
            }
            Err(err) => warn!(%err, %ip, port, "auth lookup failed"),
        }
    }

    async fn forward(&self, key: (IpAddr, u16), server_id: ServerId, game: String, line: String) {
        let limiter = self
            .rate_limiters
            .entry(key)
            .or_insert_with(SourceRateLimiter::new)
            .clone();
        if !limiter.check() {
            debug!(ip = %key.0, port = key.1, "datagram dropped: rate limit exceeded");
            return;
        }

        let partition = self.partition_for(key.0, key.1);
        if let Some(tx) = self.partitions.get(partition) {
            if tx.try_send(SourceLine { server_id, game, line }).is_err() {
                warn!(ip = %key.0, port = key.1, partition, "partition channel full, dropping datagram");
            }
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

fn truncate(line: &str) -> String {
    line.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WeaponCatalog;
    use crate::handlers::{MatchHandler, PlayerHandler, RankingHandler, WeaponHandler};
    use crate::store::memory::InMemoryStore;
    use std::net::Ipv4Addr;

    fn test_processor(store: Arc<dyn Store>) -> Arc<Processor> {
        let catalog = Arc::new(WeaponCatalog::new(store.clone()));
        let ranking = Arc::new(RankingHandler::new(store.clone(), catalog.clone()));
        let player = Arc::new(PlayerHandler::new(store.clone(), ranking.clone()));
        let weapon = Arc::new(WeaponHandler::new(store.clone(), catalog));
        let match_handler = Arc::new(MatchHandler::new());
        Arc::new(Processor::new(store, player, weapon, match_handler, ranking, false))
    }

    #[tokio::test]
    async fn known_source_resolves_to_same_partition() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let processor = test_processor(store.clone());
        let (ingress, workers) =
            Ingress::bind(0, store, processor, false, Duration::from_secs(1), 4)
                .await
                .unwrap();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let a = ingress.partition_for(ip, 1234);
        let b = ingress.partition_for(ip, 1234);
        assert_eq!(a, b);
        for w in workers {
            w.abort();
        }
    }

    #[tokio::test]
    async fn unknown_source_in_strict_mode_is_rejected_not_cached() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let processor = test_processor(store.clone());
        let (ingress, workers) =
            Ingress::bind(0, store, processor, false, Duration::from_secs(1), 2)
                .await
                .unwrap();
        let key = (IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 1111);
        ingress
            .authenticate_and_forward(key, "L 10/18/2023 - 20:00:00: World triggered \"Round_Start\"".into())
            .await;
        assert!(ingress.auth_cache.get(&key).is_none());
        for w in workers {
            w.abort();
        }
    }

    /// §8 end-to-end scenario 4: two lookups against the same unregistered
    /// source in dev mode must resolve to the same serverId and populate the
    /// AuthCache only once — `InMemoryStore::auto_register_dev_server`'s
    /// `entry().or_insert_with()` makes the underlying race safe.
    #[tokio::test]
    async fn dev_auto_register_is_idempotent_across_two_lookups() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let processor = test_processor(store.clone());
        let (ingress, workers) = Ingress::bind(0, store, processor, true, Duration::from_secs(1), 2)
            .await
            .unwrap();
        let key = (IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), 2222);
        let line = "L 10/18/2023 - 20:00:00: World triggered \"Round_Start\"".to_string();

        ingress.authenticate_and_forward(key, line.clone()).await;
        let (first_id, _) = ingress.auth_cache.get(&key).unwrap().value().clone();

        ingress.auth_cache.remove(&key);
        ingress.authenticate_and_forward(key, line).await;
        let (second_id, _) = ingress.auth_cache.get(&key).unwrap().value().clone();

        assert_eq!(first_id, second_id);
        for w in workers {
            w.abort();
        }
    }
}
