use std::net::UdpSocket;

use anyhow::{bail, Context, Result};

const HEADER_LEN: usize = 12;

/// `-w <window> <local_port> <host:port>`; the remote is never contacted.
fn parse_args() -> Result<(u32, u16)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [flag, window, local, _remote] = args.as_slice() else {
        bail!("usage: fake_silent_receiver -w <window> <local_port> <host:port>");
    };
    if flag != "-w" {
        bail!("expected -w, got {flag}");
    }
    let window = window.parse().context("window size")?;
    let local = local.parse().context("local port")?;
    Ok((window, local))
}

fn main() -> Result<()> {
    let (window, local_port) = parse_args()?;
    let socket = UdpSocket::bind(("0.0.0.0", local_port))
        .with_context(|| format!("binding udp port {local_port}"))?;
    eprintln!("listening on port {local_port} (window {window})");

    let mut buf = [0u8; 2048];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        if n < HEADER_LEN {
            eprintln!("runt packet from {from}: {n} bytes");
            continue;
        }
        let len = u16::from_be_bytes([buf[2], buf[3]]);
        let ackno = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let seqno = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        // Silent: nothing is ever sent back.
        eprintln!("recv data: len = {len}, ack = {ackno:x}, seq = {seqno:x}");
    }
}
