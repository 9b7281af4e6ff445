//! Minimal STUN (RFC 5389) client for finding the public address and port
//! this host is seen as, and for a rough guess at the kind of NAT in between.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use thiserror::Error;
use tokio::{net::UdpSocket, time::Instant};

use crate::{Result, config::StunConfig};

pub const DEFAULT_SERVER: &str = "stun.l.google.com:19302";
pub const SECONDARY_SERVER: &str = "stun1.l.google.com:19302";

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
const HEADER_LEN: usize = 20;

/// Upper bound for a single wait between retransmissions.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;
const BINDING_ERROR: u16 = 0x0111;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_XOR_MAPPED_ADDRESS_LEGACY: u16 = 0x8020;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

pub type TransactionId = [u8; 12];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StunError {
    #[error("message truncated")]
    Truncated,
    #[error("not a STUN message")]
    NotStun,
    #[error("transaction id does not match the request")]
    TransactionMismatch,
    #[error("unexpected message type {0:#06x}")]
    UnexpectedType(u16),
    #[error("server answered with error {0}")]
    ErrorResponse(u16),
    #[error("response carries no mapped address")]
    NoMappedAddress,
    #[error("could not resolve {0} to an IPv4 address")]
    Resolve(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatType {
    Blocked,
    OpenInternet,
    ConeNat,
    SymmetricNat,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NatType::Blocked => "Blocked",
            NatType::OpenInternet => "Open Internet",
            NatType::ConeNat => "Cone NAT",
            NatType::SymmetricNat => "Symmetric NAT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub server: String,
    pub nat_type: NatType,
    pub external: Option<SocketAddr>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ip, port) = match self.external {
            Some(addr) => (addr.ip().to_string(), addr.port().to_string()),
            None => ("None".to_owned(), "None".to_owned()),
        };
        writeln!(f, "=== STUN Diagnostic ===")?;
        writeln!(f, "STUN Server     : {}", self.server)?;
        writeln!(f, "NAT Type        : {}", self.nat_type)?;
        writeln!(f, "Public IP       : {ip}")?;
        write!(f, "Public Port     : {port}")
    }
}

pub fn binding_request(id: &TransactionId) -> [u8; HEADER_LEN] {
    let mut msg = [0u8; HEADER_LEN];
    msg[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    msg[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    msg[8..20].copy_from_slice(id);
    msg
}

/// The mapped address from a Binding success response to request `id`.
/// XOR-MAPPED-ADDRESS wins over MAPPED-ADDRESS when both are present.
pub fn parse_binding_response(
    msg: &[u8],
    id: &TransactionId,
) -> std::result::Result<SocketAddr, StunError> {
    if msg.len() < HEADER_LEN {
        return Err(StunError::Truncated);
    }
    let kind = u16::from_be_bytes([msg[0], msg[1]]);
    let length = usize::from(u16::from_be_bytes([msg[2], msg[3]]));
    let cookie = u32::from_be_bytes([msg[4], msg[5], msg[6], msg[7]]);
    if kind & 0xC000 != 0 || cookie != MAGIC_COOKIE {
        return Err(StunError::NotStun);
    }
    if msg[8..HEADER_LEN] != id[..] {
        return Err(StunError::TransactionMismatch);
    }
    let body = msg
        .get(HEADER_LEN..HEADER_LEN + length)
        .ok_or(StunError::Truncated)?;

    let mut mapped = None;
    let mut xor_mapped = None;
    let mut error_code = None;
    let mut rest = body;
    while rest.len() >= 4 {
        let attr = u16::from_be_bytes([rest[0], rest[1]]);
        let len = usize::from(u16::from_be_bytes([rest[2], rest[3]]));
        let value = rest.get(4..4 + len).ok_or(StunError::Truncated)?;
        match attr {
            ATTR_XOR_MAPPED_ADDRESS | ATTR_XOR_MAPPED_ADDRESS_LEGACY => {
                xor_mapped = xor_mapped.or_else(|| decode_address(value, Some(id)));
            }
            ATTR_MAPPED_ADDRESS => mapped = mapped.or_else(|| decode_address(value, None)),
            ATTR_ERROR_CODE if value.len() >= 4 => {
                error_code = Some(u16::from(value[2] & 0x07) * 100 + u16::from(value[3]));
            }
            _ => {}
        }
        // attributes are padded to four bytes
        let padded = (len + 3) & !3;
        rest = rest.get(4 + padded..).unwrap_or_default();
    }

    match kind {
        BINDING_SUCCESS => xor_mapped.or(mapped).ok_or(StunError::NoMappedAddress),
        BINDING_ERROR => Err(StunError::ErrorResponse(error_code.unwrap_or(0))),
        other => Err(StunError::UnexpectedType(other)),
    }
}

fn decode_address(value: &[u8], xor: Option<&TransactionId>) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if xor.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    let ip = match value[1] {
        FAMILY_IPV4 => {
            let raw: [u8; 4] = value.get(4..8)?.try_into().ok()?;
            let mut ip = u32::from_be_bytes(raw);
            if xor.is_some() {
                ip ^= MAGIC_COOKIE;
            }
            IpAddr::V4(Ipv4Addr::from(ip))
        }
        FAMILY_IPV6 => {
            let mut raw: [u8; 16] = value.get(4..20)?.try_into().ok()?;
            if let Some(id) = xor {
                let key = MAGIC_COOKIE.to_be_bytes().into_iter().chain(id.iter().copied());
                for (byte, k) in raw.iter_mut().zip(key) {
                    *byte ^= k;
                }
            }
            IpAddr::V6(Ipv6Addr::from(raw))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Send a Binding request from `socket` to `server` and wait for the answer.
///
/// The request is retransmitted up to `retries` times, doubling the wait
/// each time. Datagrams from other peers or for other transactions are
/// ignored. `Ok(None)` means the server never answered.
pub async fn binding(
    socket: &UdpSocket,
    server: SocketAddr,
    timeout: Duration,
    retries: u32,
) -> Result<Option<SocketAddr>> {
    let id: TransactionId = rand::random();
    let request = binding_request(&id);
    let mut buf = [0u8; 1024];

    for (attempt, wait) in (1..).zip(retransmit_waits(timeout, retries)) {
        socket.send_to(&request, server).await?;
        let deadline = Instant::now() + wait;
        loop {
            let Ok(received) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await
            else {
                break;
            };
            let (len, from) = received?;
            if from != server {
                log::debug!("ignoring datagram from {from}");
                continue;
            }
            match parse_binding_response(&buf[..len], &id) {
                Ok(mapped) => return Ok(Some(mapped)),
                Err(err @ StunError::ErrorResponse(_)) => return Err(err.into()),
                Err(err) => log::debug!("ignoring reply from {from}: {err}"),
            }
        }
        log::debug!("no answer from {server} (attempt {attempt})");
    }
    Ok(None)
}

/// How long to wait after each send: `timeout`, doubling, capped at
/// [`MAX_WAIT`]. Always at least one send.
fn retransmit_waits(timeout: Duration, retries: u32) -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(timeout.min(MAX_WAIT)), |wait| {
        Some(wait.saturating_mul(2).min(MAX_WAIT))
    })
    .take(retries.max(1) as usize)
}

pub fn classify(
    local: IpAddr,
    primary: Option<SocketAddr>,
    secondary: Option<SocketAddr>,
) -> NatType {
    match (primary, secondary) {
        (None, _) => NatType::Blocked,
        (Some(mapped), _) if mapped.ip() == local => NatType::OpenInternet,
        (Some(mapped), Some(other)) if mapped != other => NatType::SymmetricNat,
        _ => NatType::ConeNat,
    }
}

/// Ask the configured servers how this host is seen from outside.
pub async fn discover(config: &StunConfig) -> Result<Report> {
    let server = resolve(&config.server).await?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    log::debug!("querying {server} from {}", socket.local_addr()?);

    let primary = binding(&socket, server, config.timeout(), config.retries).await?;
    let secondary = match (&config.secondary, primary) {
        (Some(name), Some(_)) => match resolve(name).await {
            Ok(addr) => binding(&socket, addr, config.timeout(), config.retries).await?,
            Err(err) => {
                log::warn!("skipping second STUN server: {err}");
                None
            }
        },
        _ => None,
    };

    let local = local_ip_towards(server).await?;
    Ok(Report {
        server: config.server.clone(),
        nat_type: classify(local, primary, secondary),
        external: primary,
    })
}

async fn resolve(server: &str) -> Result<SocketAddr> {
    let addr = tokio::net::lookup_host(server)
        .await
        .ok()
        .and_then(|mut addrs| addrs.find(SocketAddr::is_ipv4))
        .ok_or_else(|| StunError::Resolve(server.to_owned()))?;
    Ok(addr)
}

/// Source address the kernel picks for traffic to `server`.
async fn local_ip_towards(server: SocketAddr) -> Result<IpAddr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    probe.connect(server).await?;
    Ok(probe.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    const ID: TransactionId = [0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae];

    fn message(kind: u16, id: &TransactionId, attrs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (attr, value) in attrs {
            body.extend_from_slice(&attr.to_be_bytes());
            body.extend_from_slice(&(value.len() as u16).to_be_bytes());
            body.extend_from_slice(value);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }
        let mut msg = Vec::new();
        msg.extend_from_slice(&kind.to_be_bytes());
        msg.extend_from_slice(&(body.len() as u16).to_be_bytes());
        msg.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        msg.extend_from_slice(id);
        msg.extend_from_slice(&body);
        msg
    }

    fn xor_mapped_v4(id: &TransactionId, addr: SocketAddrV4) -> Vec<u8> {
        let mut value = vec![0, FAMILY_IPV4];
        value.extend_from_slice(&(addr.port() ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());
        value.extend_from_slice(&(u32::from(*addr.ip()) ^ MAGIC_COOKIE).to_be_bytes());
        message(BINDING_SUCCESS, id, &[(ATTR_XOR_MAPPED_ADDRESS, value)])
    }

    #[test]
    fn test_request_layout() {
        let request = binding_request(&ID);
        assert_eq!(&request[0..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&request[4..8], &[0x21, 0x12, 0xa4, 0x42]);
        assert_eq!(&request[8..], &ID);
    }

    #[test]
    fn test_xor_mapped_ipv4() {
        // 192.0.2.1:32853, as encoded in the RFC 5769 sample response
        let value = vec![0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43];
        let msg = message(BINDING_SUCCESS, &ID, &[(ATTR_XOR_MAPPED_ADDRESS, value)]);
        assert_eq!(
            parse_binding_response(&msg, &ID),
            Ok("192.0.2.1:32853".parse().unwrap())
        );
    }

    #[test]
    fn test_xor_mapped_ipv6() {
        // 2001:db8:1234:5678:11:2233:4455:6677 port 32853, RFC 5769
        let value = vec![
            0x00, 0x02, 0xa1, 0x47, 0x01, 0x13, 0xa9, 0xfa, 0xa5, 0xd3, 0xf1, 0x79, 0xbc, 0x25,
            0xf4, 0xb5, 0xbe, 0xd2, 0xb9, 0xd9,
        ];
        let msg = message(BINDING_SUCCESS, &ID, &[(ATTR_XOR_MAPPED_ADDRESS, value)]);
        assert_eq!(
            parse_binding_response(&msg, &ID),
            Ok("[2001:db8:1234:5678:11:2233:4455:6677]:32853".parse().unwrap())
        );
    }

    #[test]
    fn test_plain_mapped_address_fallback() {
        let value = vec![0x00, FAMILY_IPV4, 0x1f, 0x90, 203, 0, 113, 9];
        let msg = message(
            BINDING_SUCCESS,
            &ID,
            &[(0x8022, b"server".to_vec()), (ATTR_MAPPED_ADDRESS, value)],
        );
        assert_eq!(
            parse_binding_response(&msg, &ID),
            Ok("203.0.113.9:8080".parse().unwrap())
        );
    }

    #[test]
    fn test_xor_mapped_wins_over_mapped() {
        let plain = vec![0x00, FAMILY_IPV4, 0x00, 0x50, 10, 0, 0, 1];
        let mut msg = xor_mapped_v4(&ID, "198.51.100.7:40000".parse().unwrap());
        let extra = message(BINDING_SUCCESS, &ID, &[(ATTR_MAPPED_ADDRESS, plain)]);
        msg.extend_from_slice(&extra[HEADER_LEN..]);
        let length = (msg.len() - HEADER_LEN) as u16;
        msg[2..4].copy_from_slice(&length.to_be_bytes());

        assert_eq!(
            parse_binding_response(&msg, &ID),
            Ok("198.51.100.7:40000".parse().unwrap())
        );
    }

    #[test]
    fn test_rejects_malformed_messages() {
        let msg = xor_mapped_v4(&ID, "198.51.100.7:40000".parse().unwrap());

        assert_eq!(parse_binding_response(&msg[..10], &ID), Err(StunError::Truncated));
        assert_eq!(
            parse_binding_response(&msg[..msg.len() - 2], &ID),
            Err(StunError::Truncated)
        );

        let mut other = ID;
        other[0] ^= 0xff;
        assert_eq!(
            parse_binding_response(&msg, &other),
            Err(StunError::TransactionMismatch)
        );

        let mut bad_cookie = msg.clone();
        bad_cookie[4] = 0;
        assert_eq!(parse_binding_response(&bad_cookie, &ID), Err(StunError::NotStun));
    }

    #[test]
    fn test_error_response() {
        let msg = message(BINDING_ERROR, &ID, &[(ATTR_ERROR_CODE, vec![0, 0, 4, 20])]);
        assert_eq!(parse_binding_response(&msg, &ID), Err(StunError::ErrorResponse(420)));
    }

    #[test]
    fn test_success_without_address() {
        let msg = message(BINDING_SUCCESS, &ID, &[]);
        assert_eq!(parse_binding_response(&msg, &ID), Err(StunError::NoMappedAddress));
    }

    #[test]
    fn test_classify() {
        let local: IpAddr = "192.168.1.10".parse().unwrap();
        let a: SocketAddr = "203.0.113.5:40000".parse().unwrap();
        let b: SocketAddr = "203.0.113.5:40001".parse().unwrap();
        let open: SocketAddr = "192.168.1.10:40000".parse().unwrap();

        assert_eq!(classify(local, None, None), NatType::Blocked);
        assert_eq!(classify(local, Some(open), None), NatType::OpenInternet);
        assert_eq!(classify(local, Some(a), Some(b)), NatType::SymmetricNat);
        assert_eq!(classify(local, Some(a), Some(a)), NatType::ConeNat);
        assert_eq!(classify(local, Some(a), None), NatType::ConeNat);
    }

    #[test]
    fn test_retransmit_waits_double_and_stay_bounded() {
        let waits: Vec<_> = retransmit_waits(Duration::from_millis(500), 3).collect();
        assert_eq!(
            waits,
            [500, 1000, 2000].map(Duration::from_millis).to_vec()
        );

        let waits: Vec<_> = retransmit_waits(Duration::from_millis(u64::MAX), 4).collect();
        assert_eq!(waits, vec![MAX_WAIT; 4]);

        assert_eq!(retransmit_waits(Duration::from_millis(10), 0).count(), 1);
    }

    #[test]
    fn test_report_format() {
        let report = Report {
            server: "stun.example.com:3478".to_owned(),
            nat_type: NatType::ConeNat,
            external: Some("203.0.113.5:40000".parse().unwrap()),
        };
        assert_eq!(
            report.to_string(),
            "=== STUN Diagnostic ===\n\
             STUN Server     : stun.example.com:3478\n\
             NAT Type        : Cone NAT\n\
             Public IP       : 203.0.113.5\n\
             Public Port     : 40000"
        );

        let blocked = Report {
            external: None,
            nat_type: NatType::Blocked,
            ..report
        };
        assert!(blocked.to_string().ends_with("Public IP       : None\nPublic Port     : None"));
    }

    #[tokio::test]
    async fn test_binding_against_loopback_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, HEADER_LEN);
            let id: TransactionId = buf[8..20].try_into().unwrap();
            let SocketAddr::V4(from_v4) = from else {
                panic!("expected an IPv4 peer");
            };
            // a reply for some other transaction first
            let stray = xor_mapped_v4(&[0; 12], from_v4);
            server.send_to(&stray, from).await.unwrap();
            server.send_to(&xor_mapped_v4(&id, from_v4), from).await.unwrap();
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mapped = binding(&client, server_addr, Duration::from_secs(2), 1)
            .await
            .unwrap();
        assert_eq!(mapped, Some(client.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_silent_server_gives_none() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mapped = binding(
            &client,
            silent.local_addr().unwrap(),
            Duration::from_millis(20),
            2,
        )
        .await
        .unwrap();
        assert_eq!(mapped, None);
    }
}
