/// How a peer's connection was established.
///
/// Ordered `Multicast < Bluetooth < Remote`, matching the priority link
/// types are listed in for diagnostics and port enumeration — cheaper,
/// typically-local links sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerType {
    Multicast,
    Bluetooth,
    Remote,
}

impl std::fmt::Display for PeerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PeerType::Multicast => "multicast",
            PeerType::Bluetooth => "bluetooth",
            PeerType::Remote => "remote",
        };
        f.write_str(s)
    }
}
