use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dest;
use crate::error::Result;
use crate::handler::{self, State};
use crate::packet::{BOOTREQUEST, DhcpPacket};
use crate::pool::AddressPool;
use crate::reply::ReplyOptions;
use crate::sink::{self, PacketSink, UdpSink};

const RECV_BUFFER_SIZE: usize = 1500;
/// Reader→dispatcher queue depth. DHCP is lossy by design; overflow drops
/// the oldest datagrams and clients retransmit.
const CHANNEL_CAPACITY: usize = 100;
/// Read deadline so the reader notices shutdown within this bound.
const READ_DEADLINE: Duration = Duration::from_millis(500);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Datagram {
    data: Vec<u8>,
    source: SocketAddr,
}

/// The server runtime: owns the socket, the `{pool, leases}` state behind
/// one reader-writer lock, and the immutable reply-option snapshot.
pub struct DhcpServer {
    config: Arc<Config>,
    reply_options: Arc<ReplyOptions>,
    state: Arc<RwLock<State>>,
    socket: Arc<UdpSocket>,
    sink: Arc<dyn PacketSink>,
    shutdown: watch::Sender<bool>,
}

impl DhcpServer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = AddressPool::new(config.pool_start, config.pool_end)?;
        let socket = Arc::new(sink::bind_socket(&config)?);
        let sink = Arc::new(UdpSink::new(Arc::clone(&socket)));

        info!(
            server_ip = %config.server_ip,
            port = dest::DHCP_SERVER_PORT,
            "DHCP server starting"
        );
        info!(
            start = %config.pool_start,
            end = %config.pool_end,
            size = config.pool_size(),
            "IP pool"
        );

        let (shutdown, _) = watch::channel(false);
        let reply_options = Arc::new(config.reply_options());

        Ok(Self {
            config: Arc::new(config),
            reply_options,
            state: Arc::new(RwLock::new(State::new(pool))),
            socket,
            sink,
            shutdown,
        })
    }

    /// Runs the reader, dispatcher, and reaper until [`shutdown`] is
    /// called, then joins them under a 5-second deadline.
    ///
    /// [`shutdown`]: DhcpServer::shutdown
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);

        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.socket),
            tx,
            self.shutdown.subscribe(),
            self.shutdown.clone(),
        ));
        let dispatcher = tokio::spawn(dispatch_loop(
            rx,
            Arc::clone(&self.state),
            Arc::clone(&self.reply_options),
            Arc::clone(&self.sink),
        ));
        let reaper = tokio::spawn(reap_loop(
            Arc::clone(&self.state),
            self.shutdown.subscribe(),
        ));

        info!("DHCP server ready and listening");

        let mut shutdown = self.shutdown.subscribe();
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("waiting for tasks to finish");
        let join = async {
            let _ = tokio::join!(reader, dispatcher, reaper);
        };
        if timeout(SHUTDOWN_DEADLINE, join).await.is_err() {
            warn!("shutdown deadline elapsed before all tasks stopped");
        }

        info!("DHCP server stopped");
        Ok(())
    }

    /// Signals every task to stop. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Reads datagrams under a short deadline and forwards them to the
/// dispatcher. Transient socket errors are swallowed; anything else takes
/// the whole server down.
async fn read_loop(
    socket: Arc<UdpSocket>,
    tx: broadcast::Sender<Datagram>,
    shutdown: watch::Receiver<bool>,
    shutdown_trigger: watch::Sender<bool>,
) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        if *shutdown.borrow() {
            debug!("stopping read loop");
            break;
        }

        match timeout(READ_DEADLINE, socket.recv_from(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok((len, source))) => {
                let datagram = Datagram {
                    data: buf[..len].to_vec(),
                    source,
                };
                if tx.send(datagram).is_err() {
                    debug!("dispatcher gone, stopping read loop");
                    break;
                }
            }
            Ok(Err(err)) => {
                use std::io::ErrorKind;
                match err.kind() {
                    ErrorKind::WouldBlock
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::ConnectionReset => {
                        debug!(error = %err, "transient receive error");
                    }
                    _ => {
                        error!(error = %err, "unrecoverable socket error, shutting down");
                        let _ = shutdown_trigger.send(true);
                        break;
                    }
                }
            }
        }
    }
    // dropping tx closes the channel and stops the dispatcher
}

/// Consumes the queue and spawns a worker per datagram. Exits when the
/// reader closes the channel; a lag report means the queue overflowed and
/// the oldest datagrams were discarded.
async fn dispatch_loop(
    mut rx: broadcast::Receiver<Datagram>,
    state: Arc<RwLock<State>>,
    opts: Arc<ReplyOptions>,
    sink: Arc<dyn PacketSink>,
) {
    loop {
        match rx.recv().await {
            Ok(datagram) => {
                tokio::spawn(handle_datagram(
                    datagram,
                    Arc::clone(&state),
                    Arc::clone(&opts),
                    Arc::clone(&sink),
                ));
            }
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!(dropped = count, "receive queue overflow");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("stopping dispatcher");
                break;
            }
        }
    }
}

/// One worker: decode, mutate state under the write lock, send the reply.
///
/// A failed OFFER send returns the just-allocated IP to the pool and drops
/// the tentative binding so the address does not leak.
async fn handle_datagram(
    datagram: Datagram,
    state: Arc<RwLock<State>>,
    opts: Arc<ReplyOptions>,
    sink: Arc<dyn PacketSink>,
) {
    let packet = match DhcpPacket::parse(&datagram.data) {
        Ok(packet) => packet,
        Err(err) => {
            warn!(source = %datagram.source, error = %err, "dropping undecodable packet");
            return;
        }
    };

    if packet.op != BOOTREQUEST {
        debug!(source = %datagram.source, op = packet.op, "ignoring non-request packet");
        return;
    }

    let reply = {
        let mut state = state.write().await;
        handler::handle_message(&mut state, &packet, &opts, Instant::now())
    };

    let Some(mut reply) = reply else {
        return;
    };

    let destination = dest::resolve(&packet, &mut reply.packet);
    let encoded = reply.packet.encode();

    if let Err(err) = sink.send(destination, &encoded).await {
        error!(%destination, error = %err, "failed to send reply");
        if let Some((mac, ip)) = reply.offered {
            let mut state = state.write().await;
            if state.leases.get(mac).is_some_and(|binding| binding.ip == ip) {
                state.leases.remove_by_mac(mac);
                state.pool.release(ip);
                warn!(%mac, %ip, "rolled back unsent offer");
            }
        }
    }
}

/// Ticks every minute: expired bindings go back to the pool, and IPs
/// quarantined by DECLINE become eligible again.
async fn reap_loop(state: Arc<RwLock<State>>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(REAPER_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut state = state.write().await;
                let expired = state.leases.sweep(Instant::now());
                let quarantined = state.leases.drain_quarantine();
                let count = expired.len() + quarantined.len();
                for ip in expired.into_iter().chain(quarantined) {
                    state.pool.release(ip);
                }
                if count > 0 {
                    info!(reclaimed = count, "lease sweep");
                }
            }
            _ = shutdown.changed() => {
                debug!("stopping lease sweep");
                break;
            }
        }
    }
}
