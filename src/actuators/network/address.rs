//! Address-hygiene classification (spec §4.G). A peer is "external" only
//! if it falls outside every non-routable/benchmark/documentation range
//! listed below; the generator may still send to a non-external peer, it
//! just must never report "external egress verified" for one.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    Loopback,
    LinkLocal,
    Multicast,
    Rfc1918,
    CarrierGradeNat,
    Rfc2544Benchmark,
    TestNet,
    Ipv6Documentation,
    OrchidV2,
    SixToFourRelay,
    Reserved,
    External,
}

pub fn classify(addr: IpAddr) -> AddressClass {
    match addr {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

pub fn is_external(addr: IpAddr) -> bool {
    classify(addr) == AddressClass::External
}

fn classify_v4(ip: Ipv4Addr) -> AddressClass {
    let octets = ip.octets();

    if ip.is_loopback() {
        return AddressClass::Loopback;
    }
    if ip.is_link_local() {
        return AddressClass::LinkLocal;
    }
    if ip.is_multicast() {
        return AddressClass::Multicast;
    }
    if ip.is_private() {
        return AddressClass::Rfc1918;
    }
    // 100.64.0.0/10 — carrier-grade NAT.
    if octets[0] == 100 && (octets[1] & 0b1100_0000) == 64 {
        return AddressClass::CarrierGradeNat;
    }
    // 198.18.0.0/15 — RFC 2544 benchmarking.
    if octets[0] == 198 && (octets[1] == 18 || octets[1] == 19) {
        return AddressClass::Rfc2544Benchmark;
    }
    // TEST-NET-1 (192.0.2.0/24), TEST-NET-2 (198.51.100.0/24),
    // TEST-NET-3 (203.0.113.0/24).
    if (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
        || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
        || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
    {
        return AddressClass::TestNet;
    }
    // 192.88.99.0/24 — 6to4 relay anycast.
    if octets[0] == 192 && octets[1] == 88 && octets[2] == 99 {
        return AddressClass::SixToFourRelay;
    }
    if ip.is_broadcast() || ip.is_documentation() || ip.is_unspecified() || octets[0] == 0 {
        return AddressClass::Reserved;
    }

    AddressClass::External
}

fn classify_v6(ip: Ipv6Addr) -> AddressClass {
    if ip.is_loopback() || ip.is_unspecified() {
        return AddressClass::Loopback;
    }
    if ip.is_multicast() {
        return AddressClass::Multicast;
    }
    let segments = ip.segments();
    // fe80::/10 link-local.
    if (segments[0] & 0xffc0) == 0xfe80 {
        return AddressClass::LinkLocal;
    }
    // 2001:db8::/32 — IPv6 documentation range.
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return AddressClass::Ipv6Documentation;
    }
    // 2001:10::/28 — ORCHIDv2.
    if segments[0] == 0x2001 && (segments[1] & 0xfff0) == 0x0010 {
        return AddressClass::OrchidV2;
    }
    // fc00::/7 — unique local addresses, the IPv6 analogue of RFC 1918.
    if (segments[0] & 0xfe00) == 0xfc00 {
        return AddressClass::Rfc1918;
    }

    AddressClass::External
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_loopback_is_never_external() {
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
    }

    #[test]
    fn test_rfc1918_is_never_external() {
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1))));
    }

    #[test]
    fn test_carrier_grade_nat_is_never_external() {
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(100, 127, 255, 255))));
        assert!(is_external(IpAddr::V4(Ipv4Addr::new(100, 128, 0, 1))));
    }

    #[test]
    fn test_rfc2544_benchmark_is_never_external() {
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(198, 18, 0, 1))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(198, 19, 255, 255))));
    }

    #[test]
    fn test_test_net_ranges_are_never_external() {
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1))));
        assert!(!is_external(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1))));
    }

    #[test]
    fn test_public_v4_address_is_external() {
        assert!(is_external(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn test_ipv6_documentation_range_is_never_external() {
        let addr: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(classify(addr), AddressClass::Ipv6Documentation);
        assert!(!is_external(addr));
    }

    #[test]
    fn test_ipv6_unique_local_is_never_external() {
        let addr: IpAddr = "fc00::1".parse().unwrap();
        assert!(!is_external(addr));
    }

    #[test]
    fn test_public_v6_address_is_external() {
        let addr: IpAddr = "2001:4860:4860::8888".parse().unwrap();
        assert!(is_external(addr));
    }
}
