// # Network Connectivity Probe
//
// This crate provides a socket and sysfs based ConnectivityProbe for Linux.
//
// ## Checks
//
// - Link: `/sys/class/net/<if>/carrier` (operstate as fallback)
// - Router: TCP connect to the default gateway from `/proc/net/route`
// - Internet: TCP connect to any configured `host:port` target
// - NTP: one SNTP v4 client query to any configured server
//
// A check that cannot complete reports `Some(false)`. Only an interface
// that does not exist fails the probe as a whole.
//
// ## Platform Support
//
// The sysfs and procfs paths are configurable, which is how the tests run
// against temporary directories.

use linkwatch_core::traits::{Check, CheckMask, ConnectivityProbe, ProbeReport};
use linkwatch_core::{Error, Result};

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

/// Linux route flag: route is usable
const RTF_UP: u32 = 0x0001;

/// Linux route flag: destination is reached through a gateway
const RTF_GATEWAY: u32 = 0x0002;

/// Size of an SNTP packet without extensions
const SNTP_PACKET_LEN: usize = 48;

/// LI = 0, VN = 4, Mode = 3 (client)
const SNTP_CLIENT_HEADER: u8 = 0x23;

/// Leap indicator value meaning "clock not synchronized"
const SNTP_LI_UNSYNCHRONIZED: u8 = 3;

/// SNTP server mode
const SNTP_MODE_SERVER: u8 = 4;

/// Configuration for [`NetProbe`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetProbeConfig {
    /// Directory holding one entry per network interface
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// IPv4 routing table in procfs format
    #[serde(default = "default_route_table")]
    pub route_table: PathBuf,

    /// TCP port used to test gateway reachability
    #[serde(default = "default_router_port")]
    pub router_port: u16,

    /// `host:port` targets for the Internet check
    #[serde(default = "default_internet_targets")]
    pub internet_targets: Vec<String>,

    /// `host:port` NTP servers
    #[serde(default = "default_ntp_servers")]
    pub ntp_servers: Vec<String>,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_route_table() -> PathBuf {
    PathBuf::from("/proc/net/route")
}

fn default_router_port() -> u16 {
    53
}

fn default_internet_targets() -> Vec<String> {
    vec!["1.1.1.1:443".to_string(), "8.8.8.8:53".to_string()]
}

fn default_ntp_servers() -> Vec<String> {
    vec!["pool.ntp.org:123".to_string()]
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for NetProbeConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            route_table: default_route_table(),
            router_port: default_router_port(),
            internet_targets: default_internet_targets(),
            ntp_servers: default_ntp_servers(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl NetProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config("Probe timeout must be > 0"));
        }
        if self.router_port == 0 {
            return Err(Error::config("Router probe port must be > 0"));
        }
        if self.internet_targets.is_empty() {
            return Err(Error::config("At least one Internet target is required"));
        }
        if self.ntp_servers.is_empty() {
            return Err(Error::config("At least one NTP server is required"));
        }
        Ok(())
    }
}

/// Connectivity probe backed by sysfs, procfs and plain sockets
#[derive(Debug, Clone)]
pub struct NetProbe {
    config: NetProbeConfig,
    timeout: Duration,
}

impl NetProbe {
    pub fn new(config: NetProbeConfig) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self { config, timeout })
    }

    fn interface_dir(&self, if_name: &str) -> PathBuf {
        self.config.sysfs_root.join(if_name)
    }

    /// Carrier state of the interface
    async fn check_link(&self, if_name: &str) -> bool {
        let dir = self.interface_dir(if_name);

        match tokio::fs::read_to_string(dir.join("carrier")).await {
            Ok(carrier) => carrier.trim() == "1",
            Err(e) => {
                // Reading carrier fails with EINVAL while the interface is down
                tracing::debug!("Carrier unreadable for {} ({}), using operstate", if_name, e);
                match tokio::fs::read_to_string(dir.join("operstate")).await {
                    Ok(state) => state.trim() == "up",
                    Err(e) => {
                        tracing::debug!("Operstate unreadable for {}: {}", if_name, e);
                        false
                    }
                }
            }
        }
    }

    /// Whether the default gateway answers on the router port
    async fn check_router(&self, if_name: &str) -> bool {
        let table = match tokio::fs::read_to_string(&self.config.route_table).await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(
                    "Failed to read route table {}: {}",
                    self.config.route_table.display(),
                    e
                );
                return false;
            }
        };

        let Some(gateway) = default_gateway(&table, if_name) else {
            tracing::debug!("No default gateway for {}", if_name);
            return false;
        };

        let addr = SocketAddr::from((gateway, self.config.router_port));
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            // A refusal still proves the gateway is up
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => true,
            Ok(Err(e)) => {
                tracing::debug!("Gateway {} unreachable: {}", addr, e);
                false
            }
            Err(_) => {
                tracing::debug!("Gateway {} timed out", addr);
                false
            }
        }
    }

    /// Whether any Internet target accepts a connection
    async fn check_internet(&self) -> bool {
        for target in &self.config.internet_targets {
            match timeout(self.timeout, TcpStream::connect(target.as_str())).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => tracing::debug!("Internet target {} failed: {}", target, e),
                Err(_) => tracing::debug!("Internet target {} timed out", target),
            }
        }
        false
    }

    /// Whether any NTP server reports a synchronized clock
    async fn check_ntp(&self) -> bool {
        for server in &self.config.ntp_servers {
            match timeout(self.timeout, query_sntp(server)).await {
                Ok(Ok(true)) => return true,
                Ok(Ok(false)) => tracing::debug!("NTP server {} is not synchronized", server),
                Ok(Err(e)) => tracing::debug!("NTP query to {} failed: {}", server, e),
                Err(_) => tracing::debug!("NTP query to {} timed out", server),
            }
        }
        false
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for NetProbe {
    async fn check(&self, if_name: &str, mask: CheckMask) -> Result<ProbeReport> {
        if !self.interface_dir(if_name).exists() {
            return Err(Error::probe(format!("{} interface does not exist", if_name)));
        }

        let mut report = ProbeReport::default();
        for check in mask.iter() {
            let passed = match check {
                Check::Link => self.check_link(if_name).await,
                Check::Router => self.check_router(if_name).await,
                Check::Internet => self.check_internet().await,
                Check::Ntp => self.check_ntp().await,
            };
            tracing::trace!("{} check on {}: {}", check, if_name, passed);
            report.set(check, passed);
        }

        Ok(report)
    }
}

/// One routing table entry that matters for gateway lookup
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteEntry {
    iface: String,
    destination: u32,
    gateway: Ipv4Addr,
    flags: u32,
}

impl RouteEntry {
    fn is_default_gateway(&self) -> bool {
        self.destination == 0 && self.flags & (RTF_UP | RTF_GATEWAY) == (RTF_UP | RTF_GATEWAY)
    }
}

/// Parse one data line of `/proc/net/route`
///
/// Addresses are printed as the hex of a network-order word read on a
/// little-endian host.
fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let mut fields = line.split_whitespace();
    let iface = fields.next()?.to_string();
    let destination = u32::from_str_radix(fields.next()?, 16).ok()?;
    let gateway = u32::from_str_radix(fields.next()?, 16).ok()?;
    let flags = u32::from_str_radix(fields.next()?, 16).ok()?;

    Some(RouteEntry {
        iface,
        destination,
        gateway: Ipv4Addr::from(gateway.to_le_bytes()),
        flags,
    })
}

/// Default gateway for `if_name`, or any default gateway if it has none
fn default_gateway(table: &str, if_name: &str) -> Option<Ipv4Addr> {
    let defaults: Vec<RouteEntry> = table
        .lines()
        .skip(1)
        .filter_map(parse_route_line)
        .filter(RouteEntry::is_default_gateway)
        .collect();

    defaults
        .iter()
        .find(|entry| entry.iface == if_name)
        .or_else(|| defaults.first())
        .map(|entry| entry.gateway)
}

/// Send one SNTP request and report whether the answer is synchronized
async fn query_sntp(server: &str) -> std::io::Result<bool> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(server).await?;

    let mut request = [0u8; SNTP_PACKET_LEN];
    request[0] = SNTP_CLIENT_HEADER;
    socket.send(&request).await?;

    let mut reply = [0u8; SNTP_PACKET_LEN];
    let len = socket.recv(&mut reply).await?;

    parse_sntp_reply(&reply[..len]).ok_or_else(|| {
        std::io::Error::new(ErrorKind::InvalidData, "malformed SNTP reply")
    })
}

/// Synchronization state from an SNTP server reply
fn parse_sntp_reply(reply: &[u8]) -> Option<bool> {
    if reply.len() < SNTP_PACKET_LEN {
        return None;
    }

    let leap = reply[0] >> 6;
    let mode = reply[0] & 0x07;
    let stratum = reply[1];

    if mode != SNTP_MODE_SERVER {
        return None;
    }

    Some(leap != SNTP_LI_UNSYNCHRONIZED && (1..=15).contains(&stratum))
}

/// Create a probe whose sysfs and procfs roots live under `root`
///
/// Used by tests and by setups that mount the host's `/sys` and `/proc`
/// elsewhere.
pub fn with_roots(root: &Path, config: NetProbeConfig) -> Result<NetProbe> {
    NetProbe::new(NetProbeConfig {
        sysfs_root: root.join("sys/class/net"),
        route_table: root.join("proc/net/route"),
        ..config
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    const ROUTE_HEADER: &str =
        "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT";

    fn fake_host(interfaces: &[(&str, Option<&str>, &str)], routes: &[&str]) -> TempDir {
        let root = tempfile::tempdir().unwrap();
        for (name, carrier, operstate) in interfaces {
            let dir = root.path().join("sys/class/net").join(name);
            fs::create_dir_all(&dir).unwrap();
            if let Some(carrier) = carrier {
                fs::write(dir.join("carrier"), format!("{}\n", carrier)).unwrap();
            }
            fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
        }

        let proc_net = root.path().join("proc/net");
        fs::create_dir_all(&proc_net).unwrap();
        let mut table = vec![ROUTE_HEADER.to_string()];
        table.extend(routes.iter().map(|r| r.to_string()));
        fs::write(proc_net.join("route"), table.join("\n")).unwrap();
        root
    }

    fn local_config(router_port: u16, internet_targets: Vec<String>) -> NetProbeConfig {
        NetProbeConfig {
            router_port,
            internet_targets,
            ntp_servers: vec!["127.0.0.1:1".to_string()],
            timeout_ms: 500,
            ..NetProbeConfig::default()
        }
    }

    fn link_only() -> CheckMask {
        CheckMask::from(Check::Link)
    }

    #[test]
    fn test_parse_default_gateway() {
        let table = format!(
            "{}\n{}\n{}\n",
            ROUTE_HEADER,
            "eth0\t0000A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0",
            "eth0\t00000000\t0101A8C0\t0003\t0\t0\t0\t00000000\t0\t0\t0"
        );
        assert_eq!(
            default_gateway(&table, "eth0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn test_default_gateway_prefers_interface() {
        let table = format!(
            "{}\n{}\n{}\n",
            ROUTE_HEADER,
            "br-wan\t00000000\t0100000A\t0003\t0\t0\t0\t00000000\t0\t0\t0",
            "eth1\t00000000\t0101A8C0\t0003\t0\t0\t0\t00000000\t0\t0\t0"
        );
        assert_eq!(default_gateway(&table, "eth1"), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(default_gateway(&table, "eth0"), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(default_gateway(ROUTE_HEADER, "eth0"), None);
    }

    #[test]
    fn test_down_route_is_ignored() {
        let table = format!(
            "{}\n{}\n",
            ROUTE_HEADER, "eth0\t00000000\t0101A8C0\t0002\t0\t0\t0\t00000000\t0\t0\t0"
        );
        assert_eq!(default_gateway(&table, "eth0"), None);
    }

    #[test]
    fn test_sntp_reply_parsing() {
        let mut reply = [0u8; SNTP_PACKET_LEN];

        reply[0] = 0x24; // LI 0, VN 4, server
        reply[1] = 2;
        assert_eq!(parse_sntp_reply(&reply), Some(true));

        reply[0] = 0xE4; // LI 3
        assert_eq!(parse_sntp_reply(&reply), Some(false));

        reply[0] = 0x24;
        reply[1] = 0; // kiss-o'-death
        assert_eq!(parse_sntp_reply(&reply), Some(false));

        reply[1] = 16;
        assert_eq!(parse_sntp_reply(&reply), Some(false));

        reply[0] = 0x23; // client mode echoed back
        reply[1] = 2;
        assert_eq!(parse_sntp_reply(&reply), None);

        assert_eq!(parse_sntp_reply(&reply[..12]), None);
    }

    #[test]
    fn test_config_validation() {
        assert!(NetProbeConfig::default().validate().is_ok());

        let config = NetProbeConfig {
            timeout_ms: 0,
            ..NetProbeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NetProbeConfig {
            internet_targets: vec![],
            ..NetProbeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_unknown_interface_fails_probe() {
        let root = fake_host(&[("eth0", Some("1"), "up")], &[]);
        let probe = with_roots(root.path(), NetProbeConfig::default()).unwrap();

        let result = probe.check("eth9", link_only()).await;
        assert!(matches!(result, Err(Error::Probe(_))));
    }

    #[tokio::test]
    async fn test_link_from_carrier_and_operstate() {
        let root = fake_host(
            &[
                ("eth0", Some("1"), "up"),
                ("eth1", Some("0"), "down"),
                ("eth2", None, "up"),
            ],
            &[],
        );
        let probe = with_roots(root.path(), NetProbeConfig::default()).unwrap();

        let report = probe.check("eth0", link_only()).await.unwrap();
        assert_eq!(report.link, Some(true));
        assert_eq!(report.router, None);
        assert_eq!(report.internet, None);
        assert_eq!(report.ntp, None);

        let report = probe.check("eth1", link_only()).await.unwrap();
        assert_eq!(report.link, Some(false));

        let report = probe.check("eth2", link_only()).await.unwrap();
        assert_eq!(report.link, Some(true));
    }

    #[tokio::test]
    async fn test_router_reachable_when_listening_or_refusing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();

        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let root = fake_host(
            &[("eth0", Some("1"), "up")],
            &["eth0\t00000000\t0100007F\t0003\t0\t0\t0\t00000000\t0\t0\t0"],
        );
        let router = CheckMask::from(Check::Router);
        let dummy = vec!["127.0.0.1:1".to_string()];

        let probe = with_roots(root.path(), local_config(open_port, dummy.clone())).unwrap();
        assert_eq!(probe.check("eth0", router).await.unwrap().router, Some(true));

        let probe = with_roots(root.path(), local_config(closed_port, dummy)).unwrap();
        assert_eq!(probe.check("eth0", router).await.unwrap().router, Some(true));
    }

    #[tokio::test]
    async fn test_router_without_gateway_fails() {
        let root = fake_host(&[("eth0", Some("1"), "up")], &[]);
        let probe = with_roots(root.path(), NetProbeConfig::default()).unwrap();

        let report = probe.check("eth0", CheckMask::from(Check::Router)).await.unwrap();
        assert_eq!(report.router, Some(false));
    }

    #[tokio::test]
    async fn test_internet_any_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();

        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused = closed.local_addr().unwrap().to_string();
        drop(closed);

        let root = fake_host(&[("eth0", Some("1"), "up")], &[]);
        let internet = CheckMask::from(Check::Internet);

        let probe =
            with_roots(root.path(), local_config(53, vec![refused.clone(), open])).unwrap();
        assert_eq!(probe.check("eth0", internet).await.unwrap().internet, Some(true));

        let probe = with_roots(root.path(), local_config(53, vec![refused])).unwrap();
        assert_eq!(probe.check("eth0", internet).await.unwrap().internet, Some(false));
    }

    #[tokio::test]
    async fn test_ntp_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let mut request = [0u8; SNTP_PACKET_LEN];
            let (_, peer) = server.recv_from(&mut request).await.unwrap();
            assert_eq!(request[0], SNTP_CLIENT_HEADER);

            let mut reply = [0u8; SNTP_PACKET_LEN];
            reply[0] = 0x24;
            reply[1] = 1;
            server.send_to(&reply, peer).await.unwrap();
        });

        let root = fake_host(&[("eth0", Some("1"), "up")], &[]);
        let config = NetProbeConfig {
            ntp_servers: vec![server_addr],
            timeout_ms: 1000,
            ..NetProbeConfig::default()
        };
        let probe = with_roots(root.path(), config).unwrap();

        let report = probe.check("eth0", CheckMask::from(Check::Ntp)).await.unwrap();
        assert_eq!(report.ntp, Some(true));
    }
}
