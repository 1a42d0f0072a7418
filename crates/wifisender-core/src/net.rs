//! 本机地址探测

use log::debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// 用于选择出站网卡的公网地址；UDP connect 不会真正发送数据
const PROBE_ADDR: &str = "8.8.8.8:80";

/// 获取本机在局域网中的地址，失败时返回 `127.0.0.1`
pub fn local_ip() -> IpAddr {
    match probe_local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            debug!("Local address probe failed: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn probe_local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_ADDR)?;
    Ok(socket.local_addr()?.ip())
}
