//! Peripheral network-isolation guard.
//!
//! Enumerates established outbound TCP connections for the current host and
//! flags anything that is neither loopback nor the configured LLM endpoint.
//! Not on the classification hot path — surfaced only through the `doctor`
//! CLI subcommand, so a caller can confirm the process really is talking to
//! nothing but a local Ollama instance before trusting it with file metadata.
//!
//! Ported from the original's `network.py` (see `DESIGN.md`): that module
//! shells out to `psutil.net_connections()`; here the same established-socket
//! enumeration is done by parsing `/proc/net/tcp`/`/proc/net/tcp6` directly,
//! following the teacher's own `platform::pal` convention of reading `/proc`
//! rather than adding a new dependency for it. Returns an empty (no-violation)
//! result on platforms without `/proc` in this build.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::core::errors::Result;

const TCP_ESTABLISHED: u8 = 0x01;

/// An established outbound connection that is neither loopback nor the
/// configured LLM endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkViolation {
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

/// Scan established TCP connections and report any that reach outside
/// loopback and the given LLM port. Best-effort: a platform or parse failure
/// yields an empty result rather than an error, since this check must never
/// block the pipeline it is auditing.
pub fn check_outbound_connections(llm_port: u16) -> Result<Vec<NetworkViolation>> {
    Ok(scan_proc_net(llm_port))
}

#[cfg(unix)]
fn scan_proc_net(llm_port: u16) -> Vec<NetworkViolation> {
    let mut violations = Vec::new();
    for path in ["/proc/net/tcp", "/proc/net/tcp6"] {
        let Ok(raw) = std::fs::read_to_string(path) else {
            continue;
        };
        violations.extend(parse_established(&raw, llm_port));
    }
    violations
}

#[cfg(not(unix))]
fn scan_proc_net(_llm_port: u16) -> Vec<NetworkViolation> {
    Vec::new()
}

#[cfg_attr(not(unix), allow(dead_code))]
fn parse_established(raw: &str, llm_port: u16) -> Vec<NetworkViolation> {
    raw.lines()
        .skip(1)
        .filter_map(parse_tcp_line)
        .filter(|(state, _, _)| *state == TCP_ESTABLISHED)
        .filter_map(|(_, addr, port)| {
            if addr.is_loopback() || port == llm_port {
                None
            } else {
                Some(NetworkViolation {
                    remote_addr: addr,
                    remote_port: port,
                })
            }
        })
        .collect()
}

/// Parse a single data line of `/proc/net/tcp[6]`, returning
/// `(connection_state, remote_address, remote_port)`.
#[cfg_attr(not(unix), allow(dead_code))]
fn parse_tcp_line(line: &str) -> Option<(u8, IpAddr, u16)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let rem_address = fields.get(2)?;
    let state = fields.get(3)?;

    let (addr_hex, port_hex) = rem_address.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let state = u8::from_str_radix(state, 16).ok()?;
    let addr = decode_hex_addr(addr_hex)?;

    Some((state, addr, port))
}

/// Decode the big-endian-per-word, byte-swapped hex address `/proc/net/tcp`
/// uses: 8 hex chars for IPv4, 32 for IPv6.
#[cfg_attr(not(unix), allow(dead_code))]
fn decode_hex_addr(hex: &str) -> Option<IpAddr> {
    match hex.len() {
        8 => {
            let bytes = decode_word(hex)?;
            Some(IpAddr::V4(Ipv4Addr::new(bytes[3], bytes[2], bytes[1], bytes[0])))
        }
        32 => {
            let mut bytes = [0u8; 16];
            for (word_idx, chunk) in hex.as_bytes().chunks(8).enumerate() {
                let word = decode_word(std::str::from_utf8(chunk).ok()?)?;
                for (i, b) in word.iter().enumerate() {
                    bytes[word_idx * 4 + (3 - i)] = *b;
                }
            }
            Some(IpAddr::V6(Ipv6Addr::from(bytes)))
        }
        _ => None,
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
fn decode_word(hex: &str) -> Option<[u8; 4]> {
    if hex.len() != 8 {
        return None;
    }
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ipv4_loopback() {
        // 0100007F -> bytes [01,00,00,7F] reversed -> 127.0.0.1
        let addr = decode_hex_addr("0100007F").unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn decodes_ipv4_non_loopback() {
        // 0100A8C0 -> bytes [01,00,A8,C0] reversed -> 192.168.0.1
        let addr = decode_hex_addr("0100A8C0").unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
    }

    #[test]
    fn established_loopback_connection_is_not_a_violation() {
        let raw = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
                    0: 0100007F:2B66 0100007F:0050 01 00000000:00000000 00:00000000 00000000     0        0 0 2 0000000000000000\n";
        let violations = parse_established(raw, 11434);
        assert!(violations.is_empty());
    }

    #[test]
    fn established_llm_port_connection_is_not_a_violation() {
        let raw = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
                    0: 0100007F:2B66 0100A8C0:0050 01 00000000:00000000 00:00000000 00000000     0        0 0 2 0000000000000000\n";
        // remote port 0x0050 = 80; passing it as the llm port shows a
        // non-loopback connection is still cleared when it matches.
        let violations = parse_established(raw, 0x0050);
        assert!(violations.is_empty());
    }

    #[test]
    fn established_non_llm_port_to_remote_host_is_a_violation() {
        let raw = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
                    0: 0100007F:2B66 0100A8C0:0050 01 00000000:00000000 00:00000000 00000000     0        0 0 2 0000000000000000\n";
        let violations = parse_established(raw, 11434);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn established_external_connection_is_a_violation() {
        let raw = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
                    0: 0100007F:2B66 0100A8C0:0050 01 00000000:00000000 00:00000000 00000000     0        0 0 2 0000000000000000\n";
        let violations = parse_established(raw, 11434);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].remote_addr, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(violations[0].remote_port, 80);
    }

    #[test]
    fn non_established_connection_is_ignored() {
        let raw = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
                    0: 0100007F:2B66 0100A8C0:0050 0A 00000000:00000000 00:00000000 00000000     0        0 0 2 0000000000000000\n";
        let violations = parse_established(raw, 11434);
        assert!(violations.is_empty());
    }

    #[test]
    fn check_outbound_connections_never_errors() {
        assert!(check_outbound_connections(11434).is_ok());
    }
}
