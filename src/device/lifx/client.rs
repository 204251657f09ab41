//! UDP client for LIFX bulbs.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::net::UdpSocket;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::protocol::{message_type, Message, Packet, LEVEL_ON, SERVICE_UDP};
use super::LifxConfig;
use crate::device::{
    Device, DeviceIdentity, DeviceInfo, DeviceTransport, MacAddr, PowerState, Result,
    TransportError,
};

/// Largest datagram a bulb sends.
const RECV_BUFFER_SIZE: usize = 1024;
/// GetService broadcasts sent per sweep; UDP broadcast is lossy.
const DISCOVERY_BROADCASTS: u32 = 3;

/// Shared request machinery: source id and sequence counter.
struct LifxClient {
    config: LifxConfig,
    source: u32,
    sequence: AtomicU8,
}

impl LifxClient {
    fn new(config: LifxConfig) -> Self {
        // Source 0 asks bulbs to broadcast their replies, so avoid it.
        let source = (uuid::Uuid::new_v4().as_u128() as u32).max(1);
        Self {
            config,
            source,
            sequence: AtomicU8::new(0),
        }
    }

    fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one request and wait for the reply of type `expected`.
    ///
    /// Each attempt waits `request_timeout`; the request is resent up to
    /// `retries` times.
    async fn request(
        &self,
        address: SocketAddr,
        target: MacAddr,
        message: Message,
        expected: u16,
    ) -> Result<Message> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let sequence = self.next_sequence();
        let bytes = Packet::request(self.source, sequence, target, message).encode();
        let attempts = self.config.retries.max(1);

        for attempt in 1..=attempts {
            socket.send_to(&bytes, address).await?;

            match timeout(
                self.config.request_timeout(),
                self.recv_reply(&socket, sequence, expected),
            )
            .await
            {
                Ok(reply) => return reply,
                Err(_) => {
                    debug!(
                        address = %address,
                        attempt = attempt,
                        message_type = expected,
                        "LIFX request timed out"
                    );
                }
            }
        }

        Err(TransportError::Timeout { address, attempts })
    }

    async fn recv_reply(&self, socket: &UdpSocket, sequence: u8, expected: u16) -> Result<Message> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(from = %from, error = %e, "Ignoring undecodable LIFX packet");
                    continue;
                }
            };

            if packet.header.source != self.source || packet.header.sequence != sequence {
                continue;
            }
            let actual = packet.message.message_type();
            if actual != expected {
                return Err(TransportError::UnexpectedResponse { expected, actual });
            }
            return Ok(packet.message);
        }
    }

    /// Broadcast GetService and collect distinct bulbs until `wait` elapses.
    async fn scan(&self, wait: Duration) -> Result<Vec<DeviceIdentity>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        let broadcast = SocketAddr::from((self.config.broadcast_address, self.config.port));

        let deadline = Instant::now() + wait;
        let resend_every = wait / DISCOVERY_BROADCASTS;
        let mut next_broadcast = Instant::now();
        let mut sent = 0;

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            if sent < DISCOVERY_BROADCASTS && Instant::now() >= next_broadcast {
                let packet = Packet::discovery(self.source, self.next_sequence()).encode();
                socket.send_to(&packet, broadcast).await?;
                sent += 1;
                next_broadcast += resend_every;
            }

            let recv_until = if sent < DISCOVERY_BROADCASTS {
                next_broadcast.min(deadline)
            } else {
                deadline
            };

            match timeout_at(recv_until, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    let Ok(packet) = Packet::decode(&buf[..len]) else {
                        continue;
                    };
                    if packet.header.source != self.source {
                        continue;
                    }
                    if let Message::StateService { service, port } = packet.message {
                        if service != SERVICE_UDP {
                            continue;
                        }
                        let mac = packet.header.target;
                        let Ok(port) = u16::try_from(port) else {
                            debug!(mac = %mac, port = port, "Ignoring service on invalid port");
                            continue;
                        };
                        if seen.insert(mac) {
                            let address = SocketAddr::new(from.ip(), port);
                            debug!(mac = %mac, address = %address, "Discovered LIFX bulb");
                            found.push(DeviceIdentity { address, mac });
                        }
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
            }
        }

        Ok(found)
    }

    /// Read label, group and location. Failed reads leave the field empty.
    async fn fetch_info(&self, identity: DeviceIdentity) -> DeviceInfo {
        let label = self
            .request(
                identity.address,
                identity.mac,
                Message::GetLabel,
                message_type::STATE_LABEL,
            )
            .await;
        let group = self
            .request(
                identity.address,
                identity.mac,
                Message::GetGroup,
                message_type::STATE_GROUP,
            )
            .await;
        let location = self
            .request(
                identity.address,
                identity.mac,
                Message::GetLocation,
                message_type::STATE_LOCATION,
            )
            .await;

        let info = DeviceInfo {
            label: match label {
                Ok(Message::StateLabel { label }) => Some(label),
                _ => None,
            },
            group: match group {
                Ok(Message::StateGroup { label }) => Some(label),
                _ => None,
            },
            location: match location {
                Ok(Message::StateLocation { label }) => Some(label),
                _ => None,
            },
        };

        if !info.is_complete() {
            warn!(device = %identity, info = ?info, "Incomplete LIFX device metadata");
        }
        info
    }
}

/// Handle to one LIFX bulb.
pub struct LifxDevice {
    identity: DeviceIdentity,
    info: DeviceInfo,
    client: Arc<LifxClient>,
}

#[async_trait]
impl Device for LifxDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn get_power(&self) -> Result<PowerState> {
        let reply = self
            .client
            .request(
                self.identity.address,
                self.identity.mac,
                Message::GetPower,
                message_type::STATE_POWER,
            )
            .await?;

        match reply {
            Message::StatePower { level } => Ok(PowerState::from(level > 0)),
            other => Err(TransportError::UnexpectedResponse {
                expected: message_type::STATE_POWER,
                actual: other.message_type(),
            }),
        }
    }

    async fn set_power(&self, state: PowerState) -> Result<()> {
        let level = if state.is_on() { LEVEL_ON } else { 0 };
        self.client
            .request(
                self.identity.address,
                self.identity.mac,
                Message::SetPower { level },
                message_type::ACKNOWLEDGEMENT,
            )
            .await?;
        debug!(device = %self.identity, power = %state, "LIFX power set");
        Ok(())
    }
}

/// Device transport backed by the LIFX LAN protocol.
pub struct LifxTransport {
    client: Arc<LifxClient>,
}

impl LifxTransport {
    pub fn new(config: LifxConfig) -> Self {
        Self {
            client: Arc::new(LifxClient::new(config)),
        }
    }
}

#[async_trait]
impl DeviceTransport for LifxTransport {
    async fn discover(&self, wait: Duration) -> Result<Vec<Arc<dyn Device>>> {
        let identities = self.client.scan(wait).await?;
        info!(count = identities.len(), "LIFX scan complete");

        let infos = join_all(
            identities
                .iter()
                .map(|identity| self.client.fetch_info(*identity)),
        )
        .await;

        Ok(identities
            .into_iter()
            .zip(infos)
            .map(|(identity, info)| {
                Arc::new(LifxDevice {
                    identity,
                    info,
                    client: Arc::clone(&self.client),
                }) as Arc<dyn Device>
            })
            .collect())
    }

    fn create_device(&self, identity: DeviceIdentity, info: DeviceInfo) -> Result<Arc<dyn Device>> {
        Ok(Arc::new(LifxDevice {
            identity,
            info,
            client: Arc::clone(&self.client),
        }) as Arc<dyn Device>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal fake bulb answering on a loopback socket.
    async fn spawn_fake_bulb(mac: MacAddr, label: &'static str, level: u16) -> SocketAddr {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let address = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(request) = Packet::decode(&buf[..len]) else {
                    continue;
                };
                let message = match request.message {
                    Message::GetService => Message::StateService {
                        service: SERVICE_UDP,
                        port: address.port() as u32,
                    },
                    Message::GetLabel => Message::StateLabel {
                        label: label.to_string(),
                    },
                    Message::GetGroup => Message::StateGroup {
                        label: "Kitchen".to_string(),
                    },
                    Message::GetLocation => Message::StateLocation {
                        label: "Home".to_string(),
                    },
                    Message::GetPower => Message::StatePower { level },
                    Message::SetPower { .. } => Message::Acknowledgement,
                    _ => continue,
                };
                let reply = Packet::request(
                    request.header.source,
                    request.header.sequence,
                    mac,
                    message,
                );
                let _ = socket.send_to(&reply.encode(), from).await;
            }
        });

        address
    }

    fn loopback_config(port: u16) -> LifxConfig {
        LifxConfig {
            broadcast_address: Ipv4Addr::LOCALHOST,
            port,
            request_timeout_ms: 200,
            retries: 2,
        }
    }

    #[tokio::test]
    async fn test_discover_reads_device_metadata() {
        let mac = MacAddr([0xd0, 0x73, 0xd5, 0, 0, 1]);
        let address = spawn_fake_bulb(mac, "Ceiling", LEVEL_ON).await;
        let transport = LifxTransport::new(loopback_config(address.port()));

        let devices = transport.discover(Duration::from_millis(300)).await.unwrap();

        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.identity().mac, mac);
        assert_eq!(device.identity().address, address);
        assert_eq!(device.info(), &DeviceInfo::new("Home", "Kitchen", "Ceiling"));
        assert_eq!(device.get_power().await.unwrap(), PowerState::On);
    }

    #[tokio::test]
    async fn test_set_power_waits_for_acknowledgement() {
        let mac = MacAddr([0xd0, 0x73, 0xd5, 0, 0, 2]);
        let address = spawn_fake_bulb(mac, "Desk", 0).await;
        let transport = LifxTransport::new(loopback_config(address.port()));

        let device = transport
            .create_device(DeviceIdentity { address, mac }, DeviceInfo::default())
            .unwrap();

        device.turn_on().await.unwrap();
        // The fake bulb acknowledges without changing its reported level.
        assert_eq!(device.get_power().await.unwrap(), PowerState::Off);
    }

    #[tokio::test]
    async fn test_request_times_out_without_reply() {
        // Bound but silent socket.
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let address = silent.local_addr().unwrap();
        let transport = LifxTransport::new(loopback_config(address.port()));

        let device = transport
            .create_device(
                DeviceIdentity {
                    address,
                    mac: MacAddr::default(),
                },
                DeviceInfo::default(),
            )
            .unwrap();

        let result = device.get_power().await;
        assert!(matches!(
            result,
            Err(TransportError::Timeout { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_discover_skips_service_on_out_of_range_port() {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let address = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let Ok(request) = Packet::decode(&buf[..len]) else {
                    continue;
                };
                let reply = Packet::request(
                    request.header.source,
                    request.header.sequence,
                    MacAddr([0xd0, 0x73, 0xd5, 0, 0, 3]),
                    Message::StateService {
                        service: SERVICE_UDP,
                        port: 70_000,
                    },
                );
                let _ = socket.send_to(&reply.encode(), from).await;
            }
        });
        let transport = LifxTransport::new(loopback_config(address.port()));

        let devices = transport.discover(Duration::from_millis(300)).await.unwrap();

        assert!(devices.is_empty());
    }

    #[test]
    fn test_client_source_is_never_zero() {
        for _ in 0..32 {
            assert_ne!(LifxClient::new(LifxConfig::default()).source, 0);
        }
    }
}
