use std::io::Read;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const HEADER_LEN: usize = 12;
const PACKET_PAYLOAD: usize = 512;
const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Drops this sequence number instead of sending it.
const SKIP_ENV: &str = "FAKE_SENDER_SKIP_SEQ";

struct Args {
    window: u32,
    local_port: u16,
    remote: SocketAddr,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [flag, window, local, remote] = args.as_slice() else {
        bail!("usage: fake_sender -w <window> <local_port> <host:port>");
    };
    if flag != "-w" {
        bail!("expected -w, got {flag}");
    }
    // The receiver binds 0.0.0.0, so `localhost` must resolve to IPv4.
    let remote = remote
        .to_socket_addrs()
        .with_context(|| format!("resolving {remote}"))?
        .find(SocketAddr::is_ipv4)
        .with_context(|| format!("no ipv4 address for {remote}"))?;
    Ok(Args {
        window: window.parse().context("window size")?,
        local_port: local.parse().context("local port")?,
        remote,
    })
}

fn encode(seqno: u32, data: &[u8]) -> Vec<u8> {
    let len = (HEADER_LEN + data.len()) as u16;
    let mut packet = Vec::with_capacity(len as usize);
    packet.extend_from_slice(&0u16.to_be_bytes()); // cksum
    packet.extend_from_slice(&len.to_be_bytes());
    packet.extend_from_slice(&1u32.to_be_bytes()); // ackno
    packet.extend_from_slice(&seqno.to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let skip: Option<u32> = std::env::var(SKIP_ENV)
        .ok()
        .map(|value| value.parse())
        .transpose()
        .with_context(|| format!("parsing {SKIP_ENV}"))?;

    let socket = UdpSocket::bind(("0.0.0.0", args.local_port))
        .with_context(|| format!("binding udp port {}", args.local_port))?;

    let mut payload = Vec::new();
    std::io::stdin().read_to_end(&mut payload)?;

    let packets: Vec<Vec<u8>> = payload
        .chunks(PACKET_PAYLOAD)
        .zip(1..=args.window)
        .filter(|(_, seqno)| Some(*seqno) != skip)
        .map(|(chunk, seqno)| encode(seqno, chunk))
        .collect();

    // No acknowledgment ever arrives, so the whole window is retransmitted
    // until the harness kills us.
    loop {
        for packet in &packets {
            let _ = socket.send_to(packet, args.remote);
        }
        thread::sleep(RETRANSMIT_INTERVAL);
    }
}
